//! Tile pyramids (`gpkg_tile_matrix_set` / `gpkg_tile_matrix` plus the tile
//! table itself). Raster layers are carried as tile pyramids and are copied
//! tile by tile without decoding.

use crate::conversions::ContentKind;
use crate::error::{PackError, Result};
use crate::ogc_sql::{
    SQL_INSERT_TILE_MATRIX, SQL_INSERT_TILE_MATRIX_SET, SQL_RENAME_TILE_METADATA,
    SQL_SELECT_TILE_MATRICES, SQL_SELECT_TILE_MATRIX_SET, TILE_COLUMNS, sql_create_tile_table,
    sql_insert_row, sql_rename_table, sql_select_rows,
};
use crate::types::Extent;
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, params, params_from_iter};

use super::{Contents, Gpkg};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileMatrixSet {
    pub srs_id: i32,
    pub extent: Extent,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileMatrix {
    pub zoom_level: i64,
    pub matrix_width: i64,
    pub matrix_height: i64,
    pub tile_width: i64,
    pub tile_height: i64,
    pub pixel_x_size: f64,
    pub pixel_y_size: f64,
}

/// Everything needed to describe (and recreate) a tile table.
#[derive(Clone, Debug, PartialEq)]
pub struct TilePyramid {
    pub contents: Contents,
    pub matrix_set: TileMatrixSet,
    /// Ordered by zoom level, lowest first.
    pub matrices: Vec<TileMatrix>,
}

impl TilePyramid {
    pub fn extent(&self) -> Extent {
        self.matrix_set.extent
    }

    /// Pixel size of the full-resolution raster, i.e. the deepest zoom level.
    pub fn raster_size(&self) -> Option<(u32, u32)> {
        let finest = self.matrices.last()?;
        let width = finest.matrix_width.checked_mul(finest.tile_width)?;
        let height = finest.matrix_height.checked_mul(finest.tile_height)?;
        Some((u32::try_from(width).ok()?, u32::try_from(height).ok()?))
    }
}

impl Gpkg {
    /// List the names of the tile tables.
    pub fn list_tile_tables(&self) -> Result<Vec<String>> {
        self.list_contents(ContentKind::Tiles)
    }

    /// Read the metadata of a tile table.
    pub fn tile_pyramid(&self, table: &str) -> Result<TilePyramid> {
        let contents = self.contents(table)?;
        if contents.kind() != Some(ContentKind::Tiles) {
            return Err(PackError::MissingTileMatrixSet {
                table: table.to_string(),
            });
        }

        let matrix_set = self
            .connection()
            .query_row(SQL_SELECT_TILE_MATRIX_SET, [table], |row| {
                Ok(TileMatrixSet {
                    srs_id: row.get(0)?,
                    extent: Extent::new(row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?),
                })
            })
            .optional()?
            .ok_or_else(|| PackError::MissingTileMatrixSet {
                table: table.to_string(),
            })?;

        let mut stmt = self.connection().prepare(SQL_SELECT_TILE_MATRICES)?;
        let matrices = stmt
            .query_map([table], |row| {
                Ok(TileMatrix {
                    zoom_level: row.get(0)?,
                    matrix_width: row.get(1)?,
                    matrix_height: row.get(2)?,
                    tile_width: row.get(3)?,
                    tile_height: row.get(4)?,
                    pixel_x_size: row.get(5)?,
                    pixel_y_size: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(TilePyramid {
            contents,
            matrix_set,
            matrices,
        })
    }

    /// Create an empty tile table named `table` with the given pyramid layout.
    pub fn create_tile_table(&self, table: &str, pyramid: &TilePyramid) -> Result<()> {
        self.ensure_writable()?;
        if self.has_table(table)? {
            return Err(PackError::TableAlreadyExists {
                table: table.to_string(),
            });
        }

        let tx = self.connection().unchecked_transaction()?;
        tx.execute_batch(&sql_create_tile_table(table))?;
        self.insert_contents(&Contents {
            table_name: table.to_string(),
            data_type: ContentKind::Tiles.as_str().to_string(),
            identifier: Some(table.to_string()),
            description: pyramid.contents.description.clone(),
            extent: pyramid.contents.extent.or(Some(pyramid.extent())),
            srs_id: Some(pyramid.matrix_set.srs_id),
        })?;
        let extent = pyramid.extent();
        tx.execute(
            SQL_INSERT_TILE_MATRIX_SET,
            params![
                table,
                pyramid.matrix_set.srs_id,
                extent.min_x,
                extent.min_y,
                extent.max_x,
                extent.max_y
            ],
        )?;
        for m in &pyramid.matrices {
            tx.execute(
                SQL_INSERT_TILE_MATRIX,
                params![
                    table,
                    m.zoom_level,
                    m.matrix_width,
                    m.matrix_height,
                    m.tile_width,
                    m.tile_height,
                    m.pixel_x_size,
                    m.pixel_y_size
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Copy a whole tile table from `source` into a new table of this package,
    /// `batch_size` tiles per transaction. Returns the number of tiles copied.
    pub fn copy_tiles_from(
        &self,
        source: &Gpkg,
        source_table: &str,
        table: &str,
        batch_size: u32,
    ) -> Result<u64> {
        let batch_size = batch_size.max(1);
        let pyramid = source.tile_pyramid(source_table)?;
        self.ensure_srs_from(source, pyramid.matrix_set.srs_id)?;
        self.create_tile_table(table, &pyramid)?;

        let mut select = source.connection().prepare(&sql_select_rows(
            source_table,
            &TILE_COLUMNS,
            "id",
            Some(batch_size),
        ))?;
        let insert_sql = sql_insert_row(table, &TILE_COLUMNS);

        let mut copied: i64 = 0;
        loop {
            // Each page is read to the end before writing, so the source is
            // never locked while this package commits.
            let page = select
                .query_map([copied], |row| {
                    (0..TILE_COLUMNS.len())
                        .map(|idx| row.get::<_, Value>(idx))
                        .collect::<rusqlite::Result<Vec<Value>>>()
                })?
                .collect::<rusqlite::Result<Vec<Vec<Value>>>>()?;
            if page.is_empty() {
                break;
            }

            let tx = self.connection().unchecked_transaction()?;
            {
                let mut insert = tx.prepare_cached(&insert_sql)?;
                for values in &page {
                    insert.execute(params_from_iter(values))?;
                }
            }
            tx.commit()?;

            copied += page.len() as i64;
            if page.len() < batch_size as usize {
                break;
            }
        }
        Ok(copied as u64)
    }

    /// Rename a tile table and every metadata row that references it.
    pub fn rename_tile_table(&self, old: &str, new: &str) -> Result<()> {
        self.ensure_writable()?;
        if self.has_table(new)? {
            return Err(PackError::TableAlreadyExists {
                table: new.to_string(),
            });
        }
        let tx = self.connection().unchecked_transaction()?;
        tx.execute_batch(&sql_rename_table(old, new))?;
        for sql in SQL_RENAME_TILE_METADATA {
            tx.execute(sql, [old, new])?;
        }
        tx.commit()?;
        Ok(())
    }
}
