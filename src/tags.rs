//! Series identity extraction.

use crate::types::SeriesKey;
use crate::wire::RawSeries;

/// Pull name and tag set out of a raw series block.
///
/// A block without `tags` yields an empty tag map, and a block without `name`
/// an empty name; neither is an error.
pub fn extract_identity(raw: &RawSeries) -> SeriesKey {
    SeriesKey {
        name: raw.name.clone().unwrap_or_default(),
        tags: raw.tags.clone().unwrap_or_default(),
    }
}
