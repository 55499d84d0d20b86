//! Minimal FLAC files for tests: a STREAMINFO block and no audio frames,
//! which is enough for tag writes and duration reads.

use lofty::config::WriteOptions;
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::Tag;
use std::fs;
use std::path::Path;

const SAMPLE_RATE: u64 = 44_100;
const STREAMINFO_LENGTH: u32 = 34;

/// Writes an untagged FLAC file lasting `seconds`.
pub fn write_flac(path: &Path, seconds: u64) {
    let mut bytes = b"fLaC".to_vec();
    // last-metadata-block flag with block type 0 (STREAMINFO)
    bytes.push(0x80);
    bytes.extend_from_slice(&STREAMINFO_LENGTH.to_be_bytes()[1..]);

    bytes.extend_from_slice(&4096u16.to_be_bytes());
    bytes.extend_from_slice(&4096u16.to_be_bytes());
    bytes.extend_from_slice(&[0, 0, 0]);
    bytes.extend_from_slice(&[0, 0, 0]);

    let channels = 2u64;
    let bits_per_sample = 16u64;
    let total_samples = SAMPLE_RATE * seconds;
    let packed = (SAMPLE_RATE << 44)
        | ((channels - 1) << 41)
        | ((bits_per_sample - 1) << 36)
        | (total_samples & 0xF_FFFF_FFFF);
    bytes.extend_from_slice(&packed.to_be_bytes());
    bytes.extend_from_slice(&[0u8; 16]);

    fs::write(path, bytes).unwrap();
}

/// Embeds `cover` as the front cover of the file at `path`.
pub fn embed_cover(path: &Path, cover: &[u8]) {
    let mut tagged_file = Probe::open(path).unwrap().read().unwrap();
    if tagged_file.primary_tag().is_none() {
        let tag_type = tagged_file.primary_tag_type();
        tagged_file.insert_tag(Tag::new(tag_type));
    }
    let tag = tagged_file.primary_tag_mut().unwrap();
    tag.push_picture(
        Picture::unchecked(cover.to_vec())
            .pic_type(PictureType::CoverFront)
            .mime_type(MimeType::Jpeg)
            .build(),
    );
    tagged_file
        .save_to_path(path, WriteOptions::default())
        .unwrap();
}
