// cf. https://www.geopackage.org/spec140/index.html#table_definition_sql

// "GPKG" in ASCII, and GeoPackage 1.4.0.
pub(crate) const GPKG_APPLICATION_ID: i32 = 0x4750_4B47;
pub(crate) const GPKG_USER_VERSION: i32 = 10400;

pub(crate) const SQL_GPKG_SPATIAL_REF_SYS: &str = "
CREATE TABLE gpkg_spatial_ref_sys (
  srs_name TEXT NOT NULL,
  srs_id INTEGER PRIMARY KEY,
  organization TEXT NOT NULL,
  organization_coordsys_id INTEGER NOT NULL,
  definition  TEXT NOT NULL,
  description TEXT
);
";

pub(crate) const SQL_GPKG_CONTENTS: &str = "
CREATE TABLE gpkg_contents (
  table_name TEXT NOT NULL PRIMARY KEY,
  data_type TEXT NOT NULL,
  identifier TEXT UNIQUE,
  description TEXT DEFAULT '',
  last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
  min_x DOUBLE,
  min_y DOUBLE,
  max_x DOUBLE,
  max_y DOUBLE,
  srs_id INTEGER,
  CONSTRAINT fk_gc_r_srs_id FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
);
";

pub(crate) const SQL_GPKG_GEOMETRY_COLUMNS: &str = "
CREATE TABLE gpkg_geometry_columns (
  table_name TEXT NOT NULL,
  column_name TEXT NOT NULL,
  geometry_type_name TEXT NOT NULL,
  srs_id INTEGER NOT NULL,
  z TINYINT NOT NULL,
  m TINYINT NOT NULL,
  CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name),
  CONSTRAINT uk_gc_table_name UNIQUE (table_name),
  CONSTRAINT fk_gc_tn FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),
  CONSTRAINT fk_gc_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys (srs_id)
);
";

pub(crate) const SQL_GPKG_TILE_MATRIX_SET: &str = "
CREATE TABLE gpkg_tile_matrix_set (
  table_name TEXT NOT NULL PRIMARY KEY,
  srs_id INTEGER NOT NULL,
  min_x DOUBLE NOT NULL,
  min_y DOUBLE NOT NULL,
  max_x DOUBLE NOT NULL,
  max_y DOUBLE NOT NULL,
  CONSTRAINT fk_gtms_table_name FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),
  CONSTRAINT fk_gtms_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys (srs_id)
);
";

pub(crate) const SQL_GPKG_TILE_MATRIX: &str = "
CREATE TABLE gpkg_tile_matrix (
  table_name TEXT NOT NULL,
  zoom_level INTEGER NOT NULL,
  matrix_width INTEGER NOT NULL,
  matrix_height INTEGER NOT NULL,
  tile_width INTEGER NOT NULL,
  tile_height INTEGER NOT NULL,
  pixel_x_size DOUBLE NOT NULL,
  pixel_y_size DOUBLE NOT NULL,
  CONSTRAINT pk_ttm PRIMARY KEY (table_name, zoom_level),
  CONSTRAINT fk_tmm_table_name FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name)
);
";

pub(crate) const SQL_GPKG_EXTENSIONS: &str = "
CREATE TABLE gpkg_extensions (
  table_name TEXT,
  column_name TEXT,
  extension_name TEXT NOT NULL,
  definition TEXT NOT NULL,
  scope TEXT NOT NULL,
  CONSTRAINT ge_tce UNIQUE (table_name, column_name, extension_name)
);
";

pub(crate) const SQL_LOOKS_LIKE_GPKG: &str =
    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'gpkg_contents'";

pub(crate) const SQL_LIST_CONTENTS: &str =
    "SELECT table_name FROM gpkg_contents WHERE data_type = ?1 ORDER BY rowid";

pub(crate) const SQL_STORED_TABLE_NAME: &str =
    "SELECT table_name FROM gpkg_contents WHERE table_name = ?1 COLLATE NOCASE LIMIT 1";

pub(crate) const SQL_SELECT_CONTENTS: &str = "
SELECT data_type, identifier, description, min_x, min_y, max_x, max_y, srs_id
FROM gpkg_contents
WHERE table_name = ?1
";

pub(crate) const SQL_INSERT_CONTENTS: &str = "
INSERT INTO gpkg_contents
  (table_name, data_type, identifier, description, min_x, min_y, max_x, max_y, srs_id)
VALUES
  (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
";

pub(crate) const SQL_SELECT_GEOMETRY_COLUMN_META: &str = "
SELECT column_name, geometry_type_name, z, m, srs_id
FROM gpkg_geometry_columns
WHERE table_name = ?1
";

pub(crate) const SQL_INSERT_GEOMETRY_COLUMNS: &str = "
INSERT INTO gpkg_geometry_columns
  (table_name, column_name, geometry_type_name, srs_id, z, m)
VALUES
  (?1, ?2, ?3, ?4, ?5, ?6)
";

pub(crate) const SQL_SELECT_SRS: &str = "
SELECT srs_name, srs_id, organization, organization_coordsys_id, definition, description
FROM gpkg_spatial_ref_sys
WHERE srs_id = ?1
";

pub(crate) const SQL_INSERT_SRS: &str = "
INSERT OR IGNORE INTO gpkg_spatial_ref_sys
  (srs_name, srs_id, organization, organization_coordsys_id, definition, description)
VALUES
  (?1, ?2, ?3, ?4, ?5, ?6)
";

pub(crate) const SQL_INSERT_RTREE_EXTENSION: &str = "
INSERT OR IGNORE INTO gpkg_extensions
  (table_name, column_name, extension_name, definition, scope)
VALUES
  (?1, ?2, 'gpkg_rtree_index', 'http://www.geopackage.org/spec120/#extension_rtree', 'write-only')
";

pub(crate) const SQL_SELECT_TILE_MATRIX_SET: &str = "
SELECT srs_id, min_x, min_y, max_x, max_y
FROM gpkg_tile_matrix_set
WHERE table_name = ?1
";

pub(crate) const SQL_INSERT_TILE_MATRIX_SET: &str = "
INSERT INTO gpkg_tile_matrix_set (table_name, srs_id, min_x, min_y, max_x, max_y)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
";

pub(crate) const SQL_SELECT_TILE_MATRICES: &str = "
SELECT zoom_level, matrix_width, matrix_height, tile_width, tile_height, pixel_x_size, pixel_y_size
FROM gpkg_tile_matrix
WHERE table_name = ?1
ORDER BY zoom_level
";

pub(crate) const SQL_INSERT_TILE_MATRIX: &str = "
INSERT INTO gpkg_tile_matrix
  (table_name, zoom_level, matrix_width, matrix_height, tile_width, tile_height, pixel_x_size, pixel_y_size)
VALUES
  (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
";

// Embedded projects. The layout matches the table desktop GIS clients read
// projects from: one row per project name, last write wins.
pub(crate) const SQL_CREATE_PROJECTS: &str = "
CREATE TABLE IF NOT EXISTS qgis_projects (
  name TEXT PRIMARY KEY,
  metadata TEXT,
  content BLOB
)
";

pub(crate) const SQL_UPSERT_PROJECT: &str = "
INSERT INTO qgis_projects (name, metadata, content)
VALUES (?1, ?2, ?3)
ON CONFLICT(name) DO UPDATE SET metadata = excluded.metadata, content = excluded.content
";

pub(crate) const SQL_HAS_PROJECTS_TABLE: &str =
    "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'qgis_projects')";

pub(crate) const SQL_LIST_PROJECTS: &str = "SELECT name FROM qgis_projects ORDER BY name";

pub(crate) const SQL_SELECT_PROJECT: &str =
    "SELECT metadata, content FROM qgis_projects WHERE name = ?1";

pub(crate) fn initialize_gpkg(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "application_id", GPKG_APPLICATION_ID)?;
    conn.pragma_update(None, "user_version", GPKG_USER_VERSION)?;
    conn.execute_batch(SQL_GPKG_SPATIAL_REF_SYS)?;
    register_default_srs_ids(conn)?;
    conn.execute_batch(SQL_GPKG_CONTENTS)?;
    conn.execute_batch(SQL_GPKG_GEOMETRY_COLUMNS)?;
    conn.execute_batch(SQL_GPKG_TILE_MATRIX_SET)?;
    conn.execute_batch(SQL_GPKG_TILE_MATRIX)?;
    conn.execute_batch(SQL_GPKG_EXTENSIONS)?;
    Ok(())
}

// The three rows every GeoPackage must carry. Anything else is copied over
// from the source package of the layer that references it.
fn register_default_srs_ids(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    const EPSG4326_WKT: &str = r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AXIS["Latitude",NORTH],AXIS["Longitude",EAST],AUTHORITY["EPSG","4326"]]"#;

    let rows: [(&str, i32, &str, i32, &str, &str); 3] = [
        ("WGS 84", 4326, "EPSG", 4326, EPSG4326_WKT, "WGS 84"),
        (
            "Undefined Cartesian SRS",
            -1,
            "NONE",
            -1,
            "undefined",
            "undefined Cartesian coordinate reference system",
        ),
        (
            "Undefined geographic SRS",
            0,
            "NONE",
            0,
            "undefined",
            "undefined geographic coordinate reference system",
        ),
    ];

    let mut stmt = conn.prepare(SQL_INSERT_SRS)?;
    for (name, id, org, org_id, definition, description) in rows {
        stmt.execute(rusqlite::params![name, id, org, org_id, definition, description])?;
    }
    Ok(())
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!(r#""{}""#, name.replace('"', "\"\""))
}

pub(crate) fn sql_table_columns(table: &str) -> String {
    format!(
        "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info('{}')",
        table.replace('\'', "''")
    )
}

pub(crate) fn sql_drop_table(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_ident(table))
}

pub(crate) fn sql_select_rows(
    table: &str,
    columns: &[&str],
    order_column: &str,
    batch_size: Option<u32>,
) -> String {
    let columns = columns
        .iter()
        .map(|name| quote_ident(name))
        .collect::<Vec<String>>()
        .join(", ");
    let limit_clause = match batch_size {
        Some(n) => format!(" LIMIT {n} OFFSET ?1"),
        None => String::new(),
    };
    format!(
        "SELECT {columns} FROM {} ORDER BY {}{limit_clause}",
        quote_ident(table),
        quote_ident(order_column)
    )
}

pub(crate) fn sql_insert_row(table: &str, columns: &[&str]) -> String {
    let names = columns
        .iter()
        .map(|name| quote_ident(name))
        .collect::<Vec<String>>()
        .join(", ");
    let placeholders = (1..=columns.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<String>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({names}) VALUES ({placeholders})",
        quote_ident(table)
    )
}

// cf. https://www.geopackage.org/spec140/index.html#tiles_user_tables
pub(crate) fn sql_create_tile_table(table: &str) -> String {
    format!(
        "CREATE TABLE {} (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  zoom_level INTEGER NOT NULL,
  tile_column INTEGER NOT NULL,
  tile_row INTEGER NOT NULL,
  tile_data BLOB NOT NULL,
  UNIQUE (zoom_level, tile_column, tile_row)
)",
        quote_ident(table)
    )
}

pub(crate) const TILE_COLUMNS: [&str; 5] =
    ["id", "zoom_level", "tile_column", "tile_row", "tile_data"];

pub(crate) fn sql_rename_table(old: &str, new: &str) -> String {
    format!(
        "ALTER TABLE {} RENAME TO {}",
        quote_ident(old),
        quote_ident(new)
    )
}

// The metadata tables reference a tile table by name, so a rename has to be
// carried through every one of them.
// The new contents row goes in first and the old one out last, so the
// tile matrix foreign keys hold after every statement.
pub(crate) const SQL_RENAME_TILE_METADATA: [&str; 5] = [
    "INSERT INTO gpkg_contents
       (table_name, data_type, identifier, description, last_change, min_x, min_y, max_x, max_y, srs_id)
     SELECT ?2, data_type, ?2, description, last_change, min_x, min_y, max_x, max_y, srs_id
     FROM gpkg_contents WHERE table_name = ?1",
    "UPDATE gpkg_tile_matrix_set SET table_name = ?2 WHERE table_name = ?1",
    "UPDATE gpkg_tile_matrix SET table_name = ?2 WHERE table_name = ?1",
    "UPDATE gpkg_extensions SET table_name = ?2 WHERE table_name = ?1",
    "DELETE FROM gpkg_contents WHERE table_name = ?1",
];

pub(crate) const SQL_DELETE_TABLE_METADATA: [&str; 5] = [
    "DELETE FROM gpkg_geometry_columns WHERE table_name = ?1",
    "DELETE FROM gpkg_tile_matrix WHERE table_name = ?1",
    "DELETE FROM gpkg_tile_matrix_set WHERE table_name = ?1",
    "DELETE FROM gpkg_extensions WHERE table_name = ?1",
    "DELETE FROM gpkg_contents WHERE table_name = ?1",
];

fn rtree_name(table: &str, geom_column: &str) -> String {
    quote_ident(&format!("rtree_{table}_{geom_column}"))
}

// cf. https://www.geopackage.org/spec140/index.html#extension_rtree
pub(crate) fn gpkg_rtree_create_sql(table: &str, geom_column: &str) -> String {
    format!(
        "CREATE VIRTUAL TABLE {} USING rtree(id, minx, maxx, miny, maxy);",
        rtree_name(table, geom_column)
    )
}

pub(crate) fn gpkg_rtree_drop_sql(table: &str, geom_column: &str) -> String {
    let mut sql = format!("DROP TABLE IF EXISTS {};", rtree_name(table, geom_column));
    for suffix in [
        "insert", "update2", "update4", "update5", "update6", "update7", "delete",
    ] {
        sql.push_str(&format!(
            "DROP TRIGGER IF EXISTS {};",
            quote_ident(&format!("rtree_{table}_{geom_column}_{suffix}"))
        ));
    }
    sql
}

pub(crate) fn gpkg_rtree_load_sql(table: &str, geom_column: &str, id_column: &str) -> String {
    format!(
        "INSERT OR REPLACE INTO {r}
  SELECT {i}, ST_MinX({c}), ST_MaxX({c}), ST_MinY({c}), ST_MaxY({c})
  FROM {t} WHERE {c} NOT NULL AND NOT ST_IsEmpty({c});",
        r = rtree_name(table, geom_column),
        t = quote_ident(table),
        c = quote_ident(geom_column),
        i = quote_ident(id_column),
    )
}

pub(crate) fn gpkg_rtree_triggers_sql(table: &str, geom_column: &str, id_column: &str) -> String {
    let trigger = |suffix: &str| quote_ident(&format!("rtree_{table}_{geom_column}_{suffix}"));
    format!(
        "CREATE TRIGGER {insert} AFTER INSERT ON {t}
  WHEN (new.{c} NOT NULL AND NOT ST_IsEmpty(NEW.{c}))
BEGIN
  INSERT OR REPLACE INTO {r} VALUES (
    NEW.{i},
    ST_MinX(NEW.{c}), ST_MaxX(NEW.{c}),
    ST_MinY(NEW.{c}), ST_MaxY(NEW.{c})
  );
END;

CREATE TRIGGER {update2} AFTER UPDATE OF {c} ON {t}
  WHEN OLD.{i} = NEW.{i} AND
       (NEW.{c} ISNULL OR ST_IsEmpty(NEW.{c}))
BEGIN
  DELETE FROM {r} WHERE id = OLD.{i};
END;

CREATE TRIGGER {update4} AFTER UPDATE ON {t}
  WHEN OLD.{i} != NEW.{i} AND
       (NEW.{c} ISNULL OR ST_IsEmpty(NEW.{c}))
BEGIN
  DELETE FROM {r} WHERE id IN (OLD.{i}, NEW.{i});
END;

CREATE TRIGGER {update5} AFTER UPDATE ON {t}
  WHEN OLD.{i} != NEW.{i} AND
       (NEW.{c} NOTNULL AND NOT ST_IsEmpty(NEW.{c}))
BEGIN
  DELETE FROM {r} WHERE id = OLD.{i};
  INSERT OR REPLACE INTO {r} VALUES (
    NEW.{i},
    ST_MinX(NEW.{c}), ST_MaxX(NEW.{c}),
    ST_MinY(NEW.{c}), ST_MaxY(NEW.{c})
  );
END;

CREATE TRIGGER {update6} AFTER UPDATE OF {c} ON {t}
  WHEN OLD.{i} = NEW.{i} AND
       (NEW.{c} NOTNULL AND NOT ST_IsEmpty(NEW.{c})) AND
       (OLD.{c} NOTNULL AND NOT ST_IsEmpty(OLD.{c}))
BEGIN
  UPDATE {r} SET
    minx = ST_MinX(NEW.{c}),
    maxx = ST_MaxX(NEW.{c}),
    miny = ST_MinY(NEW.{c}),
    maxy = ST_MaxY(NEW.{c})
  WHERE id = NEW.{i};
END;

CREATE TRIGGER {update7} AFTER UPDATE OF {c} ON {t}
  WHEN OLD.{i} = NEW.{i} AND
       (NEW.{c} NOTNULL AND NOT ST_IsEmpty(NEW.{c})) AND
       (OLD.{c} ISNULL OR ST_IsEmpty(OLD.{c}))
BEGIN
  INSERT INTO {r} VALUES (
    NEW.{i},
    ST_MinX(NEW.{c}), ST_MaxX(NEW.{c}),
    ST_MinY(NEW.{c}), ST_MaxY(NEW.{c})
  );
END;

CREATE TRIGGER {delete} AFTER DELETE ON {t}
  WHEN old.{c} NOT NULL
BEGIN
  DELETE FROM {r} WHERE id = OLD.{i};
END;",
        insert = trigger("insert"),
        update2 = trigger("update2"),
        update4 = trigger("update4"),
        update5 = trigger("update5"),
        update6 = trigger("update6"),
        update7 = trigger("update7"),
        delete = trigger("delete"),
        r = rtree_name(table, geom_column),
        t = quote_ident(table),
        c = quote_ident(geom_column),
        i = quote_ident(id_column),
    )
}

pub(crate) fn execute_rtree_sqls(
    conn: &rusqlite::Connection,
    table: &str,
    geom_column: &str,
    id_column: &str,
) -> rusqlite::Result<()> {
    conn.execute_batch(&gpkg_rtree_create_sql(table, geom_column))?;
    conn.execute_batch(&gpkg_rtree_load_sql(table, geom_column, id_column))?;
    conn.execute_batch(&gpkg_rtree_triggers_sql(table, geom_column, id_column))?;
    conn.execute(
        SQL_INSERT_RTREE_EXTENSION,
        rusqlite::params![table, geom_column],
    )?;
    Ok(())
}
