use crate::error::Result;
use crate::gpkg::FeatureRow;

use super::row_to_feature;

/// Iterator that yields batches of rows from a feature table.
///
/// Each call to `next()` returns up to `batch_size` rows, so a layer never has
/// to be held in memory at once while it is copied.
pub struct FeatureBatches<'a> {
    pub(super) stmt: rusqlite::Statement<'a>,
    pub(super) property_count: usize,
    pub(super) geometry_column: String,
    pub(super) primary_key_column: String,
    pub(super) batch_size: u32,
    pub(super) offset: u32,
    pub(super) end_or_invalid_state: bool,
}

impl<'a> Iterator for FeatureBatches<'a> {
    type Item = Result<Vec<FeatureRow>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.end_or_invalid_state {
            return None;
        }

        let rows = self
            .stmt
            .query_map([self.offset], |row| {
                row_to_feature(
                    row,
                    self.property_count,
                    &self.geometry_column,
                    &self.primary_key_column,
                )
            })
            .and_then(|mapped| mapped.collect::<rusqlite::Result<Vec<FeatureRow>>>());

        let rows = match rows {
            Ok(rows) => rows,
            Err(e) => {
                // A failed page leaves the offset meaningless.
                self.end_or_invalid_state = true;
                return Some(Err(e.into()));
            }
        };

        // A short page means the end was reached.
        if rows.len() < self.batch_size as usize {
            self.end_or_invalid_state = true;
            if rows.is_empty() {
                return None;
            }
        }

        self.offset += rows.len() as u32;
        Some(Ok(rows))
    }
}
