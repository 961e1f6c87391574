use serde::{Deserialize, Serialize};

/// A user column of a feature table, as declared in SQLite.
///
/// The declared type is carried verbatim so that copies keep `DATE`,
/// `TEXT(20)` and friends exactly as the source declared them.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub declared_type: String,
    pub not_null: bool,
    pub default_value: Option<String>,
}

/// Axis-aligned bounds in the layer's own CRS.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Extent {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// An extent is empty when it does not enclose any area.
    pub fn is_empty(&self) -> bool {
        !(self.max_x > self.min_x && self.max_y > self.min_y)
    }

    pub(crate) fn include(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.max_x = self.max_x.max(x);
        self.min_y = self.min_y.min(y);
        self.max_y = self.max_y.max(y);
    }

    pub(crate) fn merge(&mut self, other: Extent) {
        self.include(other.min_x, other.min_y);
        self.include(other.max_x, other.max_y);
    }
}
