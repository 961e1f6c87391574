//! GeoPackage container surface backed by rusqlite.
//!
//! Source layers are read through it and the packaged container is written
//! through it: feature tables, tile pyramids and embedded project rows.

mod feature;
mod gpkg;
mod layer;
mod tiles;

pub use feature::FeatureRow;
pub use gpkg::{Contents, Gpkg, SpatialRefSys, StoredProject};
pub use layer::{FeatureBatches, GpkgLayer};
pub use tiles::{TileMatrix, TileMatrixSet, TilePyramid};

pub(crate) use feature::{gpkg_geometry_to_wkb, parse_header};
