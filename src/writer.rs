//! Writing one layer into the container.

use crate::error::{PackError, Result};
use crate::gpkg::Gpkg;
use crate::project::{LayerType, MapLayer, TransformContext};
use crate::provider::{
    parse_raster_source, parse_vector_source, resolve_raster_table, resolve_vector_table,
};
use std::path::Path;
use uuid::Uuid;

/// Writes layers into a GeoPackage container.
///
/// Implementations must create or overwrite `table` in `container`, creating
/// the container file when it does not exist yet.
pub trait LayerWriter: Send + Sync {
    fn write_vector(
        &self,
        layer: &MapLayer,
        container: &Path,
        table: &str,
        transform_context: &TransformContext,
    ) -> Result<()>;

    fn write_raster(
        &self,
        layer: &MapLayer,
        container: &Path,
        table: &str,
        transform_context: &TransformContext,
    ) -> Result<()>;
}

/// Dispatch on the layer type.
pub fn write_layer(
    writer: &dyn LayerWriter,
    layer: &MapLayer,
    container: &Path,
    table: &str,
    transform_context: &TransformContext,
) -> Result<()> {
    match layer.layer_type {
        LayerType::Vector => writer.write_vector(layer, container, table, transform_context),
        LayerType::Raster => writer.write_raster(layer, container, table, transform_context),
        other => Err(PackError::UnsupportedLayerType {
            layer: layer.name.clone(),
            layer_type: other.to_string(),
        }),
    }
}

/// Copies GeoPackage feature tables and tile pyramids as they are, without
/// reprojection.
#[derive(Clone, Copy, Debug)]
pub struct GpkgLayerWriter {
    pub batch_size: u32,
}

impl Default for GpkgLayerWriter {
    fn default() -> Self {
        Self { batch_size: 1000 }
    }
}

impl LayerWriter for GpkgLayerWriter {
    fn write_vector(
        &self,
        layer: &MapLayer,
        container: &Path,
        table: &str,
        _transform_context: &TransformContext,
    ) -> Result<()> {
        let source = parse_vector_source(&layer.source);
        let source_gpkg = Gpkg::open_read_only(&source.path)?;
        let source_table = resolve_vector_table(&source_gpkg, &source)?;
        let source_layer = source_gpkg.open_layer(&source_table)?;

        let target = Gpkg::open_or_create(container)?;
        if target.has_table(table)? {
            tracing::debug!(table, "overwriting existing table");
            target.delete_table(table)?;
        }
        let target_layer = target.create_layer_like(table, &source_layer)?;
        let copied = source_layer.copy_into(&target_layer, self.batch_size)?;
        tracing::debug!(layer = %layer.name, table, features = copied, "vector layer copied");
        Ok(())
    }

    fn write_raster(
        &self,
        layer: &MapLayer,
        container: &Path,
        table: &str,
        _transform_context: &TransformContext,
    ) -> Result<()> {
        let source = parse_raster_source(&layer.source);
        let source_gpkg = Gpkg::open_read_only(&source.path)?;
        let source_table = resolve_raster_table(&source_gpkg, &source)?;
        let pyramid = source_gpkg.tile_pyramid(&source_table)?;
        if pyramid.extent().is_empty() || pyramid.matrices.is_empty() {
            return Err(PackError::EmptyRaster);
        }

        // Tiles land in a throwaway table first and are renamed once
        // complete, so a failed copy never leaves a partial `table`.
        let target = Gpkg::open_or_create(container)?;
        let staging = Uuid::new_v4().simple().to_string();
        let written = target
            .copy_tiles_from(&source_gpkg, &source_table, &staging, self.batch_size)
            .and_then(|tiles| {
                target.rename_tile_table(&staging, table)?;
                Ok(tiles)
            });

        match written {
            Ok(tiles) => {
                tracing::debug!(layer = %layer.name, table, tiles, "raster layer copied");
                Ok(())
            }
            Err(err) => {
                if let Err(cleanup) = target.delete_table(&staging) {
                    tracing::warn!(
                        table = %staging,
                        error = %cleanup,
                        "could not remove staging table"
                    );
                }
                Err(err)
            }
        }
    }
}
