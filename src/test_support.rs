//! Fixture GeoPackages shared by the unit tests.

use crate::gpkg::{
    Contents, FeatureRow, Gpkg, GpkgLayer, SpatialRefSys, TileMatrix, TileMatrixSet, TilePyramid,
};
use crate::package::{LogSink, ProgressSink};
use crate::ogc_sql::{SQL_INSERT_GEOMETRY_COLUMNS, execute_rtree_sqls, quote_ident};
use crate::types::Extent;
use geo_types::Point;
use rusqlite::params;
use rusqlite::types::Value;
use std::sync::Mutex;

fn web_mercator() -> SpatialRefSys {
    SpatialRefSys {
        srs_name: "WGS 84 / Pseudo-Mercator".to_string(),
        srs_id: 3857,
        organization: "EPSG".to_string(),
        organization_coordsys_id: 3857,
        definition: r#"PROJCS["WGS 84 / Pseudo-Mercator",GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563]],PRIMEM["Greenwich",0],UNIT["degree",0.0174532925199433]],PROJECTION["Mercator_1SP"],PARAMETER["central_meridian",0],PARAMETER["scale_factor",1],PARAMETER["false_easting",0],PARAMETER["false_northing",0],UNIT["metre",1],AUTHORITY["EPSG","3857"]]"#.to_string(),
        description: None,
    }
}

/// A point table with `count` rows: `fid` 1..=count at (i, 2i), plus
/// `name`, `lanes` and `opened` properties.
pub(crate) fn point_layer<'a>(gpkg: &'a Gpkg, name: &str, count: usize) -> GpkgLayer<'a> {
    gpkg.register_srs(&web_mercator()).unwrap();
    let conn = gpkg.connection();
    conn.execute_batch(&format!(
        "CREATE TABLE {} (
          fid INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
          geom POINT,
          name TEXT NOT NULL DEFAULT 'unnamed',
          lanes INTEGER,
          opened DATE
        )",
        quote_ident(name)
    ))
    .unwrap();
    gpkg.insert_contents(&Contents {
        table_name: name.to_string(),
        data_type: "features".to_string(),
        identifier: Some(name.to_string()),
        description: Some("test points".to_string()),
        extent: Some(Extent::new(0.0, 0.0, count as f64, 2.0 * count as f64)),
        srs_id: Some(3857),
    })
    .unwrap();
    conn.execute(
        SQL_INSERT_GEOMETRY_COLUMNS,
        params![name, "geom", "POINT", 3857, 0, 0],
    )
    .unwrap();
    execute_rtree_sqls(conn, name, "geom", "fid").unwrap();

    let layer = gpkg.open_layer(name).unwrap();
    let rows = (0..count)
        .map(|i| {
            FeatureRow::from_geometry(
                i as i64 + 1,
                Point::new(i as f64, 2.0 * i as f64),
                3857,
                [
                    Value::Text(format!("road {i}")),
                    Value::Integer(i as i64),
                    Value::Text("2020-01-01".to_string()),
                ],
            )
            .unwrap()
        })
        .collect::<Vec<_>>();
    layer.insert_rows(&rows).unwrap();
    layer
}

fn pyramid(name: &str, extent: Extent, matrices: Vec<TileMatrix>) -> TilePyramid {
    TilePyramid {
        contents: Contents {
            table_name: name.to_string(),
            data_type: "tiles".to_string(),
            identifier: Some(name.to_string()),
            description: None,
            extent: Some(extent),
            srs_id: Some(3857),
        },
        matrix_set: TileMatrixSet {
            srs_id: 3857,
            extent,
        },
        matrices,
    }
}

fn matrix(zoom_level: i64, matrix_width: i64, matrix_height: i64, pixel_size: f64) -> TileMatrix {
    TileMatrix {
        zoom_level,
        matrix_width,
        matrix_height,
        tile_width: 256,
        tile_height: 256,
        pixel_x_size: pixel_size,
        pixel_y_size: pixel_size,
    }
}

/// A two level tile pyramid (2x1 then 4x2 tiles of 256px) with `tiles` tiles
/// at the finest level.
pub(crate) fn tile_layer(gpkg: &Gpkg, name: &str, tiles: usize) {
    gpkg.register_srs(&web_mercator()).unwrap();
    let extent = Extent::new(0.0, 0.0, 512.0, 256.0);
    gpkg.create_tile_table(
        name,
        &pyramid(name, extent, vec![matrix(0, 2, 1, 1.0), matrix(1, 4, 2, 0.5)]),
    )
    .unwrap();

    let sql = format!(
        "INSERT INTO {} (zoom_level, tile_column, tile_row, tile_data) VALUES (1, ?1, ?2, ?3)",
        quote_ident(name)
    );
    for i in 0..tiles as i64 {
        gpkg.connection()
            .execute(&sql, params![i % 4, i / 4, vec![0x89_u8, b'P', b'N', b'G']])
            .unwrap();
    }
}

/// A tile table whose extent encloses no area.
pub(crate) fn empty_tile_layer(gpkg: &Gpkg, name: &str) {
    gpkg.register_srs(&web_mercator()).unwrap();
    gpkg.create_tile_table(
        name,
        &pyramid(name, Extent::new(0.0, 0.0, 0.0, 0.0), vec![matrix(0, 1, 1, 1.0)]),
    )
    .unwrap();
}

/// Collects everything a packaging run reports.
#[derive(Default)]
pub(crate) struct RecordingSink {
    lines: Mutex<Vec<String>>,
    progress: Mutex<Vec<u8>>,
}

impl RecordingSink {
    pub(crate) fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub(crate) fn percentages(&self) -> Vec<u8> {
        self.progress.lock().unwrap().clone()
    }
}

impl LogSink for RecordingSink {
    fn log(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }
}

impl ProgressSink for RecordingSink {
    fn progress(&self, percent: u8) {
        self.progress.lock().unwrap().push(percent);
    }
}
