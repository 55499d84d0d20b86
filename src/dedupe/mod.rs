//! Duplicate detection: fuzzy pre-grouping of scanned tracks and
//! format-quality ranking of same-named files.

mod fuzzy;
mod grouping;
mod quality;

pub use fuzzy::{ratio, token_set_ratio};
pub use grouping::{
    group_candidates, group_normalized, group_tracks, normalize_text, GroupingStrategy,
    DEFAULT_FUZZY_THRESHOLD,
};
pub use quality::{plan_quality_dedupe, quality_score, QualityGroup, QUALITY_EXTENSIONS};
