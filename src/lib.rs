//! Package the layers of a mapping project into a single GeoPackage.
//!
//! ## Overview
//!
//! - `Project` is the mapping project: layers, layer tree, CRS and metadata,
//!   stored as a JSON document.
//! - `Packager` copies every packageable layer into the output GeoPackage
//!   (the *container*) and optionally embeds a copy of the project in it.
//! - `apply_updates` points the live project at the container afterwards.
//! - `Gpkg` is the GeoPackage access layer the rest is built on.
//!
//! Layers backed by remote services (WMS, WFS, vector tiles, ...) cannot be
//! copied. They stay at their original source, both in the live project and
//! in the embedded one.
//!
//! Packaging usually runs on a worker thread while the caller keeps the live
//! project. The worker only ever sees a snapshot; the source updates it
//! computes are applied by the caller once the worker is done:
//!
//! ```no_run
//! use gpkg_packager::{
//!     GpkgProviders, PackageOptions, PackageOutcome, PackagingServices, Project,
//!     apply_updates, worker, LogSink,
//! };
//!
//! struct Stdout;
//! impl LogSink for Stdout {
//!     fn log(&self, line: &str) {
//!         println!("{line}");
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut project = Project::load("city.json", &GpkgProviders)?;
//!     let options = PackageOptions::for_project(&project).validate()?;
//!
//!     let task = worker::spawn(project.clone(), options, PackagingServices::default())?;
//!     let outcome = task.pump(|event| println!("{event:?}"))?;
//!
//!     if let PackageOutcome::Completed { report, updates } = outcome {
//!         apply_updates(&mut project, updates, &GpkgProviders, &Stdout);
//!         println!("{report}");
//!         project.save("city.json")?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Embedded projects can be listed and read back:
//!
//! ```no_run
//! use gpkg_packager::{list_embedded_projects, read_embedded_project};
//! use std::path::Path;
//!
//! let container = Path::new("GPKG-city.gpkg");
//! for name in list_embedded_projects(container)? {
//!     let project = read_embedded_project(container, &name)?;
//!     println!("{name}: {} layers", project.map_layers().len());
//! }
//! # Ok::<(), gpkg_packager::PackError>(())
//! ```
mod error;
mod gpkg;
mod sql_functions;

mod classify;
mod config;
mod conversions;
mod embed;
pub mod naming;
mod ogc_sql;
mod package;
mod project;
mod provider;
mod rewrite;
mod types;
mod writer;

#[cfg(test)]
mod test_support;

pub use classify::{Classification, classify, partition};
pub use config::PackageOptions;
pub use conversions::ContentKind;
pub use embed::{
    EmbeddedProject, GpkgProjectStorage, ProjectEmbedder, ProjectStorage, ProjectStorageUri,
    list_embedded_projects, read_embedded_project, resolve_project_name,
};
pub use error::{PackError, Result};
pub use gpkg::{
    Contents, FeatureBatches, FeatureRow, Gpkg, GpkgLayer, SpatialRefSys, StoredProject,
    TileMatrix, TileMatrixSet, TilePyramid,
};
pub use package::worker::{self, CancelHandle, PackagingTask, WorkerEvent};
pub use package::{
    LayerUpdate, LogSink, PackageOutcome, PackageReport, Packager, PackagingServices,
    ProcessedLayer, ProgressSink,
};
pub use project::{
    CoordinateOperation, Crs, LayerId, LayerStyle, LayerTreeGroup, LayerTreeLayer, LayerTreeNode,
    LayerType, MapLayer, Project, TransformContext,
};
pub use provider::{
    GDAL, GpkgProviders, OGR, ProviderInfo, ProviderOptions, ProviderRegistry, RasterSource,
    VectorSource, parse_raster_source, parse_vector_source, raster_source, vector_source,
};
pub use rewrite::{RewriteReport, apply_updates};
pub use types::{ColumnSpec, Extent};
pub use writer::{GpkgLayerWriter, LayerWriter, write_layer};
