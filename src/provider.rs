//! Data providers: which provider kinds can be copied, how sources inside a
//! container are addressed, and how a source is probed for validity.

use crate::error::{PackError, Result};
use crate::gpkg::Gpkg;
use crate::project::{LayerType, TransformContext};
use crate::types::Extent;
use std::path::{Path, PathBuf};

/// File based vector provider.
pub const OGR: &str = "ogr";
/// File based raster provider.
pub const GDAL: &str = "gdal";

/// Provider kinds that stream from a service or need a dedicated format.
/// Matched as case-insensitive substrings of the provider key.
pub const REMOTE_PROVIDER_KINDS: [&str; 9] = [
    "wms",
    "wfs",
    "wcs",
    "wmts",
    "arcgismapserver",
    "arcgisfeatureserver",
    "vectortile",
    "mesh",
    "pointcloud",
];

pub fn is_remote_provider(provider: &str) -> bool {
    let provider = provider.to_ascii_lowercase();
    REMOTE_PROVIDER_KINDS
        .iter()
        .any(|kind| provider.contains(kind))
}

/// Raster providers whose data can be read from a local file.
pub fn is_file_raster_provider(provider: &str) -> bool {
    provider.eq_ignore_ascii_case(GDAL) || provider.eq_ignore_ascii_case(OGR)
}

/// `{container}|layername={table}`
pub fn vector_source(container: &Path, table: &str) -> String {
    format!("{}|layername={table}", container.display())
}

/// `GPKG:{container}:{table}`
pub fn raster_source(container: &Path, table: &str) -> String {
    format!("GPKG:{}:{table}", container.display())
}

/// A parsed vector data source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VectorSource {
    pub path: PathBuf,
    pub layer_name: Option<String>,
}

/// A parsed raster data source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RasterSource {
    pub path: PathBuf,
    pub table: Option<String>,
}

/// Parse `path[|key=value...]`. Only `layername` is interpreted.
pub fn parse_vector_source(source: &str) -> VectorSource {
    let mut parts = source.split('|');
    let path = PathBuf::from(parts.next().unwrap_or_default().trim());
    let layer_name = parts
        .filter_map(|part| part.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("layername"))
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty());
    VectorSource { path, layer_name }
}

/// Parse `GPKG:path:table` (or `GPKG:path`, or a bare path).
pub fn parse_raster_source(source: &str) -> RasterSource {
    let Some(rest) = source
        .get(..5)
        .filter(|prefix| prefix.eq_ignore_ascii_case("GPKG:"))
        .map(|_| &source[5..])
    else {
        return RasterSource {
            path: PathBuf::from(source),
            table: None,
        };
    };

    match rest.rsplit_once(':') {
        // A separator after the last colon means it belongs to the path,
        // e.g. a drive letter.
        Some((path, table)) if !table.is_empty() && !table.contains(['/', '\\']) => {
            RasterSource {
                path: PathBuf::from(path),
                table: Some(table.to_string()),
            }
        }
        _ => RasterSource {
            path: PathBuf::from(rest),
            table: None,
        },
    }
}

/// Options passed along when a provider opens a source.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProviderOptions {
    pub transform_context: TransformContext,
}

/// What a provider reports about a source it opened.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProviderInfo {
    pub valid: bool,
    /// Pixel size of raster sources.
    pub raster_size: Option<(u32, u32)>,
    pub extent: Option<Extent>,
}

impl ProviderInfo {
    pub fn invalid() -> Self {
        Self::default()
    }
}

/// Opens data sources on behalf of map layers.
pub trait ProviderRegistry: Send + Sync {
    fn probe(
        &self,
        provider: &str,
        layer_type: LayerType,
        source: &str,
        options: &ProviderOptions,
    ) -> Result<ProviderInfo>;
}

/// Default registry. Local sources are GeoPackage tables; remote services
/// are never contacted and count as valid when they name a source.
#[derive(Clone, Copy, Debug, Default)]
pub struct GpkgProviders;

impl ProviderRegistry for GpkgProviders {
    fn probe(
        &self,
        provider: &str,
        layer_type: LayerType,
        source: &str,
        _options: &ProviderOptions,
    ) -> Result<ProviderInfo> {
        if is_remote_provider(provider) {
            return Ok(ProviderInfo {
                valid: !source.trim().is_empty(),
                ..ProviderInfo::default()
            });
        }

        match layer_type {
            LayerType::Vector if provider.eq_ignore_ascii_case(OGR) => {
                let parsed = parse_vector_source(source);
                let gpkg = Gpkg::open_read_only(&parsed.path)?;
                let table = resolve_vector_table(&gpkg, &parsed)?;
                gpkg.open_layer(&table)?;
                Ok(ProviderInfo {
                    valid: true,
                    raster_size: None,
                    extent: gpkg.contents(&table)?.extent,
                })
            }
            LayerType::Raster if is_file_raster_provider(provider) => {
                let parsed = parse_raster_source(source);
                let gpkg = Gpkg::open_read_only(&parsed.path)?;
                let table = resolve_raster_table(&gpkg, &parsed)?;
                let pyramid = gpkg.tile_pyramid(&table)?;
                Ok(ProviderInfo {
                    valid: true,
                    raster_size: pyramid.raster_size(),
                    extent: Some(pyramid.extent()),
                })
            }
            _ => Err(PackError::InvalidDataSource {
                provider: provider.to_string(),
                source_uri: source.to_string(),
            }),
        }
    }
}

/// The table a vector source refers to; the first feature table when the
/// source does not name one.
pub(crate) fn resolve_vector_table(gpkg: &Gpkg, source: &VectorSource) -> Result<String> {
    match &source.layer_name {
        Some(name) => Ok(name.clone()),
        None => gpkg
            .list_layers()?
            .into_iter()
            .next()
            .ok_or_else(|| gpkg.missing_table("<first feature table>")),
    }
}

/// The table a raster source refers to; the only tile table when the source
/// does not name one.
pub(crate) fn resolve_raster_table(gpkg: &Gpkg, source: &RasterSource) -> Result<String> {
    if let Some(table) = &source.table {
        return Ok(table.clone());
    }
    let mut tables = gpkg.list_tile_tables()?;
    if tables.len() == 1 {
        Ok(tables.remove(0))
    } else {
        Err(gpkg.missing_table("<single tile table>"))
    }
}
