use crate::error::PackError;

/// `gpkg_contents.data_type` values this crate knows how to copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentKind {
    Features,
    Tiles,
}

impl ContentKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            ContentKind::Features => "features",
            ContentKind::Tiles => "tiles",
        }
    }

    pub(crate) fn from_data_type(data_type: &str) -> Option<Self> {
        if data_type.eq_ignore_ascii_case("features") {
            Some(ContentKind::Features)
        } else if data_type.eq_ignore_ascii_case("tiles") {
            Some(ContentKind::Tiles)
        } else {
            None
        }
    }
}

/// Validate a `gpkg_geometry_columns.geometry_type_name` and map it to WKB.
///
/// `GEOMETRY` is the generic type; it is reported as a collection since any
/// geometry may appear in the column.
pub(crate) fn geometry_type_from_str(
    geometry_type_str: &str,
) -> Result<wkb::reader::GeometryType, PackError> {
    use wkb::reader::GeometryType;

    match geometry_type_str.to_ascii_uppercase().as_str() {
        "GEOMETRY" | "GEOMETRYCOLLECTION" => Ok(GeometryType::GeometryCollection),
        "POINT" => Ok(GeometryType::Point),
        "LINESTRING" => Ok(GeometryType::LineString),
        "POLYGON" => Ok(GeometryType::Polygon),
        "MULTIPOINT" => Ok(GeometryType::MultiPoint),
        "MULTILINESTRING" => Ok(GeometryType::MultiLineString),
        "MULTIPOLYGON" => Ok(GeometryType::MultiPolygon),
        _ => Err(PackError::UnsupportedGeometryType(
            geometry_type_str.to_string(),
        )),
    }
}

pub(crate) fn dimension_from_zm(z: i8, m: i8) -> Result<wkb::reader::Dimension, PackError> {
    use wkb::reader::Dimension;

    // 2 means "optional" in the GeoPackage spec. Copies keep the flag as-is,
    // so treat it like "present" for validation purposes.
    let has_z = match z {
        0 => false,
        1 | 2 => true,
        _ => return Err(PackError::InvalidDimension { z, m }),
    };
    let has_m = match m {
        0 => false,
        1 | 2 => true,
        _ => return Err(PackError::InvalidDimension { z, m }),
    };

    Ok(match (has_z, has_m) {
        (false, false) => Dimension::Xy,
        (true, false) => Dimension::Xyz,
        (false, true) => Dimension::Xym,
        (true, true) => Dimension::Xyzm,
    })
}

#[cfg(test)]
mod tests {
    use super::{ContentKind, dimension_from_zm, geometry_type_from_str};
    use crate::error::PackError;
    use wkb::reader::{Dimension, GeometryType};

    #[test]
    fn parses_geometry_type_names_case_insensitively() {
        assert_eq!(
            geometry_type_from_str("multipolygon").unwrap(),
            GeometryType::MultiPolygon
        );
        assert_eq!(
            geometry_type_from_str("GEOMETRY").unwrap(),
            GeometryType::GeometryCollection
        );
        assert!(matches!(
            geometry_type_from_str("CIRCULARSTRING"),
            Err(PackError::UnsupportedGeometryType(name)) if name == "CIRCULARSTRING"
        ));
    }

    #[test]
    fn maps_zm_flags_including_optional() {
        assert_eq!(dimension_from_zm(0, 0).unwrap(), Dimension::Xy);
        assert_eq!(dimension_from_zm(2, 0).unwrap(), Dimension::Xyz);
        assert_eq!(dimension_from_zm(1, 1).unwrap(), Dimension::Xyzm);
        assert!(matches!(
            dimension_from_zm(3, 0),
            Err(PackError::InvalidDimension { z: 3, m: 0 })
        ));
    }

    #[test]
    fn content_kind_roundtrips_data_type() {
        assert_eq!(
            ContentKind::from_data_type("Tiles"),
            Some(ContentKind::Tiles)
        );
        assert_eq!(ContentKind::Features.as_str(), "features");
        assert_eq!(ContentKind::from_data_type("attributes"), None);
    }
}
