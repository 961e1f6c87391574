use crate::error::Result;
use crate::ogc_sql::{quote_ident, sql_insert_row, sql_select_rows};
use crate::types::ColumnSpec;
use rusqlite::params_from_iter;
use rusqlite::types::{Type, Value};

use super::{FeatureRow, Gpkg};

mod batch_iterator;
pub use batch_iterator::FeatureBatches;

/// A GeoPackage feature table with its geometry metadata and column specs.
#[derive(Debug)]
pub struct GpkgLayer<'a> {
    pub(super) gpkg: &'a Gpkg,
    pub layer_name: String,
    pub geometry_column: String,
    /// `geometry_type_name` exactly as registered, e.g. `MULTIPOLYGON`.
    pub geometry_type_name: String,
    pub geometry_type: wkb::reader::GeometryType,
    pub geometry_dimension: wkb::reader::Dimension,
    pub(crate) z: i8,
    pub(crate) m: i8,
    pub srs_id: i32,
    pub primary_key_column: String,
    pub property_columns: Vec<ColumnSpec>,
}

// Selected rows always start with these two columns, followed by the
// property columns in declaration order.
const PRIMARY_INDEX: usize = 0;
const GEOMETRY_INDEX: usize = 1;

impl<'a> GpkgLayer<'a> {
    fn column_names(&self) -> Vec<&str> {
        let mut names = Vec::with_capacity(self.property_columns.len() + 2);
        names.push(self.primary_key_column.as_str());
        names.push(self.geometry_column.as_str());
        names.extend(self.property_columns.iter().map(|spec| spec.name.as_str()));
        names
    }

    /// Number of rows in the table.
    pub fn feature_count(&self) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(&self.layer_name));
        let count: i64 = self
            .gpkg
            .connection()
            .query_row(&sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Iterate over the rows in primary key order, `batch_size` rows at a time.
    /// A `batch_size` of 0 reads one row per batch.
    pub fn features_batch(&self, batch_size: u32) -> Result<FeatureBatches<'a>> {
        let batch_size = batch_size.max(1);
        let sql = sql_select_rows(
            &self.layer_name,
            &self.column_names(),
            &self.primary_key_column,
            Some(batch_size),
        );
        let stmt = self.gpkg.connection().prepare(&sql)?;
        Ok(FeatureBatches {
            stmt,
            property_count: self.property_columns.len(),
            geometry_column: self.geometry_column.clone(),
            primary_key_column: self.primary_key_column.clone(),
            batch_size,
            offset: 0,
            end_or_invalid_state: false,
        })
    }

    /// Insert rows as-is, keeping their ids. Returns the number of rows written.
    ///
    /// Property values must follow `property_columns` order.
    pub fn insert_rows(&self, rows: &[FeatureRow]) -> Result<usize> {
        self.gpkg.ensure_writable()?;
        let sql = sql_insert_row(&self.layer_name, &self.column_names());
        let tx = self.gpkg.connection().unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(&sql)?;
            for row in rows {
                let geometry = match &row.geometry {
                    Some(bytes) => Value::Blob(bytes.clone()),
                    None => Value::Null,
                };
                let params = [Value::Integer(row.id), geometry]
                    .into_iter()
                    .chain(row.properties.iter().cloned());
                stmt.execute(params_from_iter(params))?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    /// Copy every row of this layer into `target`, one batch per transaction.
    pub fn copy_into(&self, target: &GpkgLayer<'_>, batch_size: u32) -> Result<u64> {
        let mut copied = 0;
        for batch in self.features_batch(batch_size)? {
            copied += target.insert_rows(&batch?)? as u64;
        }
        Ok(copied)
    }
}

pub(super) fn row_to_feature(
    row: &rusqlite::Row<'_>,
    property_count: usize,
    geometry_column: &str,
    primary_key_column: &str,
) -> rusqlite::Result<FeatureRow> {
    let id = match row.get_ref(PRIMARY_INDEX)? {
        rusqlite::types::ValueRef::Integer(id) => id,
        other => {
            return Err(rusqlite::Error::InvalidColumnType(
                PRIMARY_INDEX,
                primary_key_column.to_string(),
                other.data_type(),
            ));
        }
    };

    let geometry = match row.get::<_, Value>(GEOMETRY_INDEX)? {
        Value::Blob(bytes) => Some(bytes),
        Value::Null => None,
        _ => {
            return Err(rusqlite::Error::InvalidColumnType(
                GEOMETRY_INDEX,
                geometry_column.to_string(),
                Type::Blob,
            ));
        }
    };

    let properties = (0..property_count)
        .map(|idx| row.get::<_, Value>(idx + 2))
        .collect::<rusqlite::Result<Vec<Value>>>()?;

    Ok(FeatureRow {
        id,
        geometry,
        properties,
    })
}
