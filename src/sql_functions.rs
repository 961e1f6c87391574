//! Spatial SQL functions needed by the GeoPackage R-tree triggers.
//!
//! Every package this crate writes carries the R-tree extension, whose
//! triggers call `ST_MinX`, `ST_MaxX`, `ST_MinY`, `ST_MaxY` and `ST_IsEmpty`.
//! SQLite does not ship them, so each connection registers its own.

use crate::error::Result;
use crate::gpkg::{gpkg_geometry_to_wkb, parse_header};
use crate::types::Extent;
use geo_traits::{
    CoordTrait, GeometryCollectionTrait, GeometryTrait, LineStringTrait, MultiLineStringTrait,
    MultiPointTrait, MultiPolygonTrait, PointTrait, PolygonTrait,
};
use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::{Type, ValueRef};
use rusqlite::{Connection, Error};

/// Register all spatial SQL helper functions in the provided connection.
pub fn register_spatial_functions(conn: &Connection) -> Result<()> {
    register_extent_component(conn, "ST_MinX", |e| e.min_x)?;
    register_extent_component(conn, "ST_MaxX", |e| e.max_x)?;
    register_extent_component(conn, "ST_MinY", |e| e.min_y)?;
    register_extent_component(conn, "ST_MaxY", |e| e.max_y)?;

    conn.create_scalar_function(
        "ST_IsEmpty",
        1,
        FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let Some(blob) = blob_arg(ctx)? else {
                return Ok(None);
            };
            Ok(Some(i64::from(geometry_extent(blob)?.is_none())))
        },
    )?;
    Ok(())
}

fn register_extent_component<F>(conn: &Connection, name: &str, component: F) -> Result<()>
where
    F: Fn(Extent) -> f64 + Copy + Send + Sync + 'static,
{
    conn.create_scalar_function(name, 1, FunctionFlags::SQLITE_DETERMINISTIC, move |ctx| {
        let Some(blob) = blob_arg(ctx)? else {
            return Ok(None);
        };
        Ok(geometry_extent(blob)?.map(component))
    })?;
    Ok(())
}

fn blob_arg<'a>(ctx: &'a Context<'_>) -> std::result::Result<Option<&'a [u8]>, Error> {
    match ctx.get_raw(0) {
        ValueRef::Null => Ok(None),
        ValueRef::Blob(blob) => Ok(Some(blob)),
        _ => Err(Error::InvalidFunctionParameterType(0, Type::Blob)),
    }
}

/// Extent of an encoded geometry, `None` when it is empty.
///
/// The header envelope is trusted when present; otherwise the WKB is walked.
pub(crate) fn geometry_extent(blob: &[u8]) -> std::result::Result<Option<Extent>, Error> {
    let to_sql_err = |err| Error::UserFunctionError(Box::new(err));

    let header = parse_header(blob).map_err(to_sql_err)?;
    if header.empty {
        return Ok(None);
    }
    if let Some(envelope) = header.envelope {
        return Ok(Some(envelope));
    }
    let wkb = gpkg_geometry_to_wkb(blob).map_err(to_sql_err)?;
    Ok(extent_of(&wkb))
}

fn extent_of<G: GeometryTrait<T = f64>>(geom: &G) -> Option<Extent> {
    use geo_traits::GeometryType as GeoType;

    let mut acc = ExtentAcc::default();
    match geom.as_type() {
        GeoType::Point(point) => acc.point(point),
        GeoType::LineString(line) => acc.line(line),
        GeoType::Polygon(poly) => acc.polygon(poly),
        GeoType::MultiPoint(multi) => multi.points().for_each(|p| acc.point(&p)),
        GeoType::MultiLineString(multi) => multi.line_strings().for_each(|l| acc.line(&l)),
        GeoType::MultiPolygon(multi) => multi.polygons().for_each(|p| acc.polygon(&p)),
        GeoType::GeometryCollection(collection) => {
            for member in collection.geometries() {
                if let Some(extent) = extent_of(&member) {
                    acc.extent(extent);
                }
            }
        }
        // Not representable in a GeoPackage geometry column.
        GeoType::Rect(_) | GeoType::Triangle(_) | GeoType::Line(_) => {}
    }
    acc.0
}

#[derive(Default)]
struct ExtentAcc(Option<Extent>);

impl ExtentAcc {
    fn coord<C: CoordTrait<T = f64>>(&mut self, coord: &C) {
        let (x, y) = coord.x_y();
        match &mut self.0 {
            Some(extent) => extent.include(x, y),
            None => self.0 = Some(Extent::new(x, y, x, y)),
        }
    }

    fn point<P: PointTrait<T = f64>>(&mut self, point: &P) {
        if let Some(coord) = point.coord() {
            self.coord(&coord);
        }
    }

    fn line<L: LineStringTrait<T = f64>>(&mut self, line: &L) {
        line.coords().for_each(|c| self.coord(&c));
    }

    fn polygon<P: PolygonTrait<T = f64>>(&mut self, poly: &P) {
        if let Some(ring) = poly.exterior() {
            self.line(&ring);
        }
        poly.interiors().for_each(|ring| self.line(&ring));
    }

    fn extent(&mut self, other: Extent) {
        match &mut self.0 {
            Some(extent) => extent.merge(other),
            None => self.0 = Some(other),
        }
    }
}
