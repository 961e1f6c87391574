use std::path::PathBuf;

use thiserror::Error;

/// Crate error type for packaging and GeoPackage operations.
#[derive(Debug, Error)]
pub enum PackError {
    /// Wraps errors returned by `rusqlite`.
    #[error(transparent)]
    Sql(#[from] rusqlite::Error),
    /// Wraps errors returned by the `wkb` crate.
    #[error(transparent)]
    Wkb(#[from] wkb::error::WkbError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The project document could not be (de)serialized.
    #[error("project document error: {0}")]
    Json(#[from] serde_json::Error),
    /// The project archive could not be read or written.
    #[error("project archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A geometry type in metadata could not be mapped to a supported WKB geometry type.
    #[error("unsupported geometry type: {0}")]
    UnsupportedGeometryType(String),
    /// Invalid or mixed `z` / `m` dimension flags in GeoPackage metadata.
    #[error("invalid or mixed geometry dimension (z={z}, m={m})")]
    InvalidDimension { z: i8, m: i8 },
    /// Invalid GeoPackage geometry flags byte.
    #[error("invalid gpkg geometry flags: {0:#04x}")]
    InvalidGpkgGeometryFlags(u8),
    /// GeoPackage geometry blob is too short for its header and envelope.
    #[error("invalid gpkg geometry length: got {len} bytes, expected at least {minimum}")]
    InvalidGpkgGeometryLength { len: usize, minimum: usize },
    #[error("no primary key column found for table: {table}")]
    MissingPrimaryKeyColumn { table: String },
    #[error("composite primary keys are not supported for table: {table}")]
    CompositePrimaryKeyUnsupported { table: String },
    #[error("no geometry column registered for table: {table}")]
    MissingGeometryColumn { table: String },
    #[error("no tile matrix set registered for table: {table}")]
    MissingTileMatrixSet { table: String },
    /// Referenced `srs_id` does not exist in `gpkg_spatial_ref_sys`.
    #[error("srs_id {srs_id} not found in gpkg_spatial_ref_sys")]
    MissingSpatialRefSysId { srs_id: i32 },
    #[error("table already exists: {table}")]
    TableAlreadyExists { table: String },
    #[error("no table '{table}' in {}", path.display())]
    MissingTable { table: String, path: PathBuf },
    #[error("not a GeoPackage: {}", path.display())]
    NotAGeoPackage { path: PathBuf },
    #[error("GeoPackage file does not exist: {}", path.display())]
    FileNotFound { path: PathBuf },
    #[error("GeoPackage file already exists: {}", path.display())]
    FileAlreadyExists { path: PathBuf },
    #[error("operation not allowed on read-only connection")]
    ReadOnly,

    /// The layer's data source could not be understood by its provider.
    #[error("invalid data source for provider '{provider}': {source_uri}")]
    InvalidDataSource { provider: String, source_uri: String },
    #[error("layer '{layer}' of type {layer_type} cannot be written to a GeoPackage")]
    UnsupportedLayerType { layer: String, layer_type: String },
    #[error("Raster layer has an empty extent/no data.")]
    EmptyRaster,

    #[error("No layers found in the project to package.")]
    NoLayers,
    #[error("GeoPackage file is not writable: {}", path.display())]
    NotWritable { path: PathBuf },
    #[error("Please select an output GeoPackage file.")]
    MissingOutputPath,
    #[error("Please enter a project name for GPKG storage.")]
    MissingProjectName,
    /// The native project storage refused or failed to store the project.
    #[error("project storage failed: {0}")]
    Storage(String),
    #[error("no embedded project named '{name}'")]
    ProjectNotFound { name: String },
    #[error("packaging worker terminated unexpectedly")]
    WorkerPanicked,
}

pub type Result<T> = std::result::Result<T, PackError>;
