//! SQLite schema of the metadata database.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP};

const METADATA_TABLE_V1: Table = Table {
    name: "metadata",
    columns: &[
        sqlite_column!("path", &SqlType::Text, is_primary_key = true),
        sqlite_column!("filename", &SqlType::Text, non_null = true),
        sqlite_column!("artist", &SqlType::Text),
        sqlite_column!("title", &SqlType::Text),
        sqlite_column!("album", &SqlType::Text),
        sqlite_column!("album_artist", &SqlType::Text),
        sqlite_column!("duration", &SqlType::Integer),
        sqlite_column!("size_mb", &SqlType::Real),
        sqlite_column!("bitrate", &SqlType::Integer),
        sqlite_column!("search_text", &SqlType::Text),
        sqlite_column!(
            "updated_at",
            &SqlType::Text,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[
        ("idx_metadata_filename", "filename"),
        ("idx_metadata_artist", "artist"),
        ("idx_metadata_search_text", "search_text"),
    ],
};

pub static METADATA_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[METADATA_TABLE_V1],
    migration: None,
}];
