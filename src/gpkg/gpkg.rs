use crate::conversions::{ContentKind, dimension_from_zm, geometry_type_from_str};
use crate::error::{PackError, Result};
use crate::ogc_sql::{
    SQL_CREATE_PROJECTS, SQL_DELETE_TABLE_METADATA, SQL_HAS_PROJECTS_TABLE, SQL_INSERT_CONTENTS,
    SQL_INSERT_GEOMETRY_COLUMNS, SQL_INSERT_SRS, SQL_LIST_CONTENTS, SQL_LIST_PROJECTS,
    SQL_LOOKS_LIKE_GPKG, SQL_SELECT_CONTENTS, SQL_SELECT_GEOMETRY_COLUMN_META, SQL_SELECT_PROJECT,
    SQL_SELECT_SRS, SQL_STORED_TABLE_NAME, SQL_UPSERT_PROJECT, execute_rtree_sqls,
    gpkg_rtree_drop_sql, initialize_gpkg, quote_ident, sql_drop_table, sql_table_columns,
};
use crate::sql_functions::register_spatial_functions;
use crate::types::{ColumnSpec, Extent};
use rusqlite::types::ValueRef;
use rusqlite::{OpenFlags, OptionalExtension, params};
use std::path::{Path, PathBuf};

use super::layer::GpkgLayer;

/// GeoPackage connection wrapper used both to read source layers and to
/// write the packaged container.
#[derive(Debug)]
pub struct Gpkg {
    conn: rusqlite::Connection,
    path: Option<PathBuf>,
    read_only: bool,
}

/// A row of `gpkg_contents`.
#[derive(Clone, Debug, PartialEq)]
pub struct Contents {
    pub table_name: String,
    pub data_type: String,
    pub identifier: Option<String>,
    pub description: Option<String>,
    pub extent: Option<Extent>,
    pub srs_id: Option<i32>,
}

impl Contents {
    pub fn kind(&self) -> Option<ContentKind> {
        ContentKind::from_data_type(&self.data_type)
    }
}

/// A row of `gpkg_spatial_ref_sys`.
#[derive(Clone, Debug, PartialEq)]
pub struct SpatialRefSys {
    pub srs_name: String,
    pub srs_id: i32,
    pub organization: String,
    pub organization_coordsys_id: i32,
    pub definition: String,
    pub description: Option<String>,
}

/// A row of the embedded project table.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredProject {
    pub name: String,
    pub metadata: Option<String>,
    pub content: Vec<u8>,
}

impl Gpkg {
    /// Open an existing GeoPackage in read-only mode.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PackError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let conn = rusqlite::Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Self::from_existing(conn, path, true)
    }

    /// Open an existing GeoPackage in read-write mode.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PackError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let conn = rusqlite::Connection::open(path)?;
        Self::from_existing(conn, path, false)
    }

    /// Create and initialize a new GeoPackage. Fails if the file exists.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Err(PackError::FileAlreadyExists {
                path: path.to_path_buf(),
            });
        }

        let conn = rusqlite::Connection::open(path)?;
        initialize_gpkg(&conn)?;
        register_spatial_functions(&conn)?;

        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
            read_only: false,
        })
    }

    /// Open the container for writing, creating it first when missing.
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    /// Create a new GeoPackage in memory.
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()?;
        initialize_gpkg(&conn)?;
        register_spatial_functions(&conn)?;

        Ok(Self {
            conn,
            path: None,
            read_only: false,
        })
    }

    fn from_existing(conn: rusqlite::Connection, path: &Path, read_only: bool) -> Result<Self> {
        let tables: i64 = conn.query_row(SQL_LOOKS_LIKE_GPKG, [], |row| row.get(0))?;
        if tables == 0 {
            return Err(PackError::NotAGeoPackage {
                path: path.to_path_buf(),
            });
        }
        register_spatial_functions(&conn)?;
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
            read_only,
        })
    }

    /// File backing this connection, `None` for in-memory packages.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// List table names registered in `gpkg_contents` for the given kind.
    pub fn list_contents(&self, kind: ContentKind) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(SQL_LIST_CONTENTS)?;
        let names = stmt
            .query_map([kind.as_str()], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// List the names of the feature layers.
    pub fn list_layers(&self) -> Result<Vec<String>> {
        self.list_contents(ContentKind::Features)
    }

    /// Whether a table of that name is registered, ignoring ASCII case.
    pub fn has_table(&self, table: &str) -> Result<bool> {
        Ok(self.stored_table_name(table)?.is_some())
    }

    /// The name a table is registered under, matched ignoring ASCII case.
    pub fn stored_table_name(&self, table: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(SQL_STORED_TABLE_NAME, [table], |row| row.get(0))
            .optional()?)
    }

    /// Read the `gpkg_contents` row of a table.
    pub fn contents(&self, table: &str) -> Result<Contents> {
        let contents = self
            .conn
            .query_row(SQL_SELECT_CONTENTS, [table], |row| {
                let bounds: [Option<f64>; 4] = [row.get(3)?, row.get(4)?, row.get(5)?, row.get(6)?];
                let extent = match bounds {
                    [Some(min_x), Some(min_y), Some(max_x), Some(max_y)] => {
                        Some(Extent::new(min_x, min_y, max_x, max_y))
                    }
                    _ => None,
                };
                Ok(Contents {
                    table_name: table.to_string(),
                    data_type: row.get(0)?,
                    identifier: row.get(1)?,
                    description: row.get(2)?,
                    extent,
                    srs_id: row.get(7)?,
                })
            })
            .optional()?;

        contents.ok_or_else(|| self.missing_table(table))
    }

    pub(crate) fn insert_contents(&self, contents: &Contents) -> Result<()> {
        self.ensure_writable()?;
        let extent = contents.extent;
        self.conn.execute(
            SQL_INSERT_CONTENTS,
            params![
                contents.table_name,
                contents.data_type,
                contents.identifier,
                contents.description,
                extent.map(|e| e.min_x),
                extent.map(|e| e.min_y),
                extent.map(|e| e.max_x),
                extent.map(|e| e.max_y),
                contents.srs_id,
            ],
        )?;
        Ok(())
    }

    /// Look up a spatial reference system by id.
    pub fn spatial_ref_sys(&self, srs_id: i32) -> Result<SpatialRefSys> {
        let srs = self
            .conn
            .query_row(SQL_SELECT_SRS, [srs_id], |row| {
                Ok(SpatialRefSys {
                    srs_name: row.get(0)?,
                    srs_id: row.get(1)?,
                    organization: row.get(2)?,
                    organization_coordsys_id: row.get(3)?,
                    definition: row.get(4)?,
                    description: row.get(5)?,
                })
            })
            .optional()?;
        srs.ok_or(PackError::MissingSpatialRefSysId { srs_id })
    }

    /// Register a spatial reference system. An existing row with the same id
    /// is kept as is.
    pub fn register_srs(&self, srs: &SpatialRefSys) -> Result<()> {
        self.ensure_writable()?;
        self.conn.execute(
            SQL_INSERT_SRS,
            params![
                srs.srs_name,
                srs.srs_id,
                srs.organization,
                srs.organization_coordsys_id,
                srs.definition,
                srs.description,
            ],
        )?;
        Ok(())
    }

    /// Make `srs_id` available in this package, copying it from `source`.
    pub(crate) fn ensure_srs_from(&self, source: &Gpkg, srs_id: i32) -> Result<()> {
        if self.spatial_ref_sys(srs_id).is_ok() {
            return Ok(());
        }
        self.register_srs(&source.spatial_ref_sys(srs_id)?)
    }

    /// Load a feature layer definition and metadata by name.
    pub fn open_layer<'a>(&'a self, layer_name: &str) -> Result<GpkgLayer<'a>> {
        let (geometry_column, geometry_type_name, z, m, srs_id) = self
            .conn
            .query_row(SQL_SELECT_GEOMETRY_COLUMN_META, [layer_name], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i8>(2)?,
                    row.get::<_, i8>(3)?,
                    row.get::<_, i32>(4)?,
                ))
            })
            .optional()?
            .ok_or_else(|| PackError::MissingGeometryColumn {
                table: layer_name.to_string(),
            })?;

        let geometry_type = geometry_type_from_str(&geometry_type_name)?;
        let geometry_dimension = dimension_from_zm(z, m)?;
        let (primary_key_column, columns) = self.get_column_specs(layer_name)?;
        let property_columns = columns
            .into_iter()
            .filter(|spec| spec.name != geometry_column && spec.name != primary_key_column)
            .collect();

        Ok(GpkgLayer {
            gpkg: self,
            layer_name: layer_name.to_string(),
            geometry_column,
            geometry_type_name,
            geometry_type,
            geometry_dimension,
            z,
            m,
            srs_id,
            primary_key_column,
            property_columns,
        })
    }

    /// Create an empty feature table shaped like `source`, named `layer_name`.
    ///
    /// The SRS is copied from the source package when this one lacks it, the
    /// declared column types are carried over verbatim, and the table gets an
    /// R-tree spatial index.
    pub fn create_layer_like<'a>(
        &'a self,
        layer_name: &str,
        source: &GpkgLayer<'_>,
    ) -> Result<GpkgLayer<'a>> {
        self.ensure_writable()?;
        if self.has_table(layer_name)? {
            return Err(PackError::TableAlreadyExists {
                table: layer_name.to_string(),
            });
        }
        self.ensure_srs_from(source.gpkg, source.srs_id)?;

        let mut column_defs = Vec::with_capacity(source.property_columns.len() + 2);
        column_defs.push(format!(
            "{} INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL",
            quote_ident(&source.primary_key_column)
        ));
        column_defs.push(format!(
            "{} {}",
            quote_ident(&source.geometry_column),
            source.geometry_type_name
        ));
        column_defs.extend(source.property_columns.iter().map(column_definition));

        let create_sql = format!(
            "CREATE TABLE {} ({})",
            quote_ident(layer_name),
            column_defs.join(", ")
        );

        let source_contents = source.gpkg.contents(&source.layer_name)?;
        let tx = self.conn.unchecked_transaction()?;
        tx.execute_batch(&create_sql)?;
        self.insert_contents(&Contents {
            table_name: layer_name.to_string(),
            data_type: ContentKind::Features.as_str().to_string(),
            identifier: Some(layer_name.to_string()),
            description: source_contents.description,
            extent: source_contents.extent,
            srs_id: Some(source.srs_id),
        })?;
        tx.execute(
            SQL_INSERT_GEOMETRY_COLUMNS,
            params![
                layer_name,
                source.geometry_column,
                source.geometry_type_name,
                source.srs_id,
                source.z,
                source.m
            ],
        )?;
        execute_rtree_sqls(
            &tx,
            layer_name,
            &source.geometry_column,
            &source.primary_key_column,
        )?;
        tx.commit()?;

        self.open_layer(layer_name)
    }

    /// Drop a table along with its spatial index and metadata rows.
    pub fn delete_table(&self, table: &str) -> Result<()> {
        self.ensure_writable()?;

        let geometry_column: Option<String> = self
            .conn
            .query_row(SQL_SELECT_GEOMETRY_COLUMN_META, [table], |row| row.get(0))
            .optional()?;

        let tx = self.conn.unchecked_transaction()?;
        if let Some(geometry_column) = geometry_column {
            tx.execute_batch(&gpkg_rtree_drop_sql(table, &geometry_column))?;
        }
        tx.execute_batch(&sql_drop_table(table))?;
        for sql in SQL_DELETE_TABLE_METADATA {
            tx.execute(sql, [table])?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Insert or replace an embedded project row, creating the table if absent.
    pub fn upsert_project(&self, name: &str, metadata: &str, content: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        self.conn.execute_batch(SQL_CREATE_PROJECTS)?;
        self.conn
            .execute(SQL_UPSERT_PROJECT, params![name, metadata, content])?;
        Ok(())
    }

    /// Names of the embedded projects. Empty when the table does not exist.
    pub fn project_names(&self) -> Result<Vec<String>> {
        let has_table: bool = self
            .conn
            .query_row(SQL_HAS_PROJECTS_TABLE, [], |row| row.get(0))?;
        if !has_table {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(SQL_LIST_PROJECTS)?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// Read an embedded project row. The content may have been stored as text
    /// by other tools, so both storage classes are accepted.
    pub fn read_project(&self, name: &str) -> Result<Option<StoredProject>> {
        if !self.project_names()?.iter().any(|n| n == name) {
            return Ok(None);
        }
        let project = self.conn.query_row(SQL_SELECT_PROJECT, [name], |row| {
            let content = match row.get_ref(1)? {
                ValueRef::Blob(bytes) | ValueRef::Text(bytes) => bytes.to_vec(),
                ValueRef::Null => Vec::new(),
                other => {
                    return Err(rusqlite::Error::InvalidColumnType(
                        1,
                        "content".to_string(),
                        other.data_type(),
                    ));
                }
            };
            Ok(StoredProject {
                name: name.to_string(),
                metadata: row.get(0)?,
                content,
            })
        })?;
        Ok(Some(project))
    }

    pub(crate) fn connection(&self) -> &rusqlite::Connection {
        &self.conn
    }

    pub(crate) fn ensure_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(PackError::ReadOnly);
        }
        Ok(())
    }

    pub(crate) fn missing_table(&self, table: &str) -> PackError {
        PackError::MissingTable {
            table: table.to_string(),
            path: self
                .path
                .clone()
                .unwrap_or_else(|| PathBuf::from(":memory:")),
        }
    }

    /// Resolve the single primary key column and every column of a table.
    fn get_column_specs(&self, table: &str) -> Result<(String, Vec<ColumnSpec>)> {
        let mut stmt = self.conn.prepare(&sql_table_columns(table))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    ColumnSpec {
                        name: row.get(0)?,
                        declared_type: row.get(1)?,
                        not_null: row.get::<_, i64>(2)? != 0,
                        default_value: row.get(3)?,
                    },
                    row.get::<_, i64>(4)? != 0,
                ))
            })?
            .collect::<std::result::Result<Vec<(ColumnSpec, bool)>, _>>()?;

        if rows.is_empty() {
            return Err(self.missing_table(table));
        }

        let mut primary_key: Option<String> = None;
        let mut columns = Vec::with_capacity(rows.len());
        for (spec, is_primary_key) in rows {
            if is_primary_key {
                if primary_key.is_some() {
                    return Err(PackError::CompositePrimaryKeyUnsupported {
                        table: table.to_string(),
                    });
                }
                primary_key = Some(spec.name.clone());
            }
            columns.push(spec);
        }

        let primary_key = primary_key.ok_or_else(|| PackError::MissingPrimaryKeyColumn {
            table: table.to_string(),
        })?;
        Ok((primary_key, columns))
    }
}

fn column_definition(spec: &ColumnSpec) -> String {
    let mut def = quote_ident(&spec.name);
    if !spec.declared_type.is_empty() {
        def.push(' ');
        def.push_str(&spec.declared_type);
    }
    if spec.not_null {
        def.push_str(" NOT NULL");
    }
    if let Some(default) = &spec.default_value {
        def.push_str(" DEFAULT ");
        def.push_str(default);
    }
    def
}

#[cfg(test)]
mod tests {
    use super::Gpkg;
    use crate::error::PackError;
    use crate::test_support::{point_layer, tile_layer};

    #[test]
    fn create_fails_if_file_exists() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = Gpkg::create(file.path()).expect_err("existing file should fail");
        assert!(matches!(err, PackError::FileAlreadyExists { .. }));
    }

    #[test]
    fn open_fails_if_missing_or_not_a_geopackage() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.gpkg");
        assert!(matches!(
            Gpkg::open(&missing),
            Err(PackError::FileNotFound { .. })
        ));

        let plain = dir.path().join("plain.sqlite");
        rusqlite::Connection::open(&plain)
            .unwrap()
            .execute_batch("CREATE TABLE t (x INTEGER)")
            .unwrap();
        assert!(matches!(
            Gpkg::open_read_only(&plain),
            Err(PackError::NotAGeoPackage { .. })
        ));
    }

    #[test]
    fn has_table_ignores_case() {
        let gpkg = Gpkg::open_in_memory().unwrap();
        point_layer(&gpkg, "Roads", 2);
        assert!(gpkg.has_table("roads").unwrap());
        assert!(gpkg.has_table("ROADS").unwrap());
        assert!(!gpkg.has_table("rivers").unwrap());
        assert_eq!(gpkg.stored_table_name("ROADS").unwrap().as_deref(), Some("Roads"));
        assert_eq!(gpkg.stored_table_name("rivers").unwrap(), None);
    }

    #[test]
    fn create_layer_like_copies_schema_and_srs() {
        let source = Gpkg::open_in_memory().unwrap();
        let layer = point_layer(&source, "roads", 0);

        let target = Gpkg::open_in_memory().unwrap();
        let copy = target.create_layer_like("Roads_A_B", &layer).unwrap();
        assert_eq!(copy.srs_id, layer.srs_id);
        assert_eq!(copy.geometry_column, layer.geometry_column);
        assert_eq!(copy.primary_key_column, layer.primary_key_column);
        assert_eq!(copy.property_columns, layer.property_columns);
        assert_eq!(target.list_layers().unwrap(), vec!["Roads_A_B".to_string()]);
        assert_eq!(target.spatial_ref_sys(3857).unwrap().organization, "EPSG");

        let err = target.create_layer_like("roads_a_b", &layer).unwrap_err();
        assert!(matches!(err, PackError::TableAlreadyExists { .. }));
    }

    #[test]
    fn delete_table_removes_metadata() {
        let gpkg = Gpkg::open_in_memory().unwrap();
        point_layer(&gpkg, "roads", 3);
        tile_layer(&gpkg, "ortho", 2);

        gpkg.delete_table("roads").unwrap();
        gpkg.delete_table("ortho").unwrap();
        assert!(!gpkg.has_table("roads").unwrap());
        assert!(!gpkg.has_table("ortho").unwrap());
        assert!(matches!(
            gpkg.open_layer("roads"),
            Err(PackError::MissingGeometryColumn { .. })
        ));
    }

    #[test]
    fn read_only_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ro.gpkg");
        Gpkg::create(&path).unwrap();

        let gpkg = Gpkg::open_read_only(&path).unwrap();
        assert!(matches!(
            gpkg.upsert_project("p", "", b""),
            Err(PackError::ReadOnly)
        ));
    }

    #[test]
    fn project_rows_upsert_by_name() {
        let gpkg = Gpkg::open_in_memory().unwrap();
        assert!(gpkg.project_names().unwrap().is_empty());
        assert_eq!(gpkg.read_project("MyMap").unwrap(), None);

        gpkg.upsert_project("MyMap", "first", b"one").unwrap();
        gpkg.upsert_project("MyMap", "second", b"two").unwrap();
        gpkg.upsert_project("Other", "x", b"three").unwrap();

        assert_eq!(
            gpkg.project_names().unwrap(),
            vec!["MyMap".to_string(), "Other".to_string()]
        );
        let stored = gpkg.read_project("MyMap").unwrap().unwrap();
        assert_eq!(stored.metadata.as_deref(), Some("second"));
        assert_eq!(stored.content, b"two");
    }
}
