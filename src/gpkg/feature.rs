use crate::error::{PackError, Result};
use crate::types::Extent;
use geo_traits::GeometryTrait;
use rusqlite::types::Value;
use wkb::reader::Wkb;

/// One row of a feature table, copied verbatim between packages.
///
/// The geometry is kept as the encoded GeoPackage blob so a copy never has
/// to decode and re-encode coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureRow {
    pub id: i64,
    pub geometry: Option<Vec<u8>>,
    pub properties: Vec<Value>,
}

impl FeatureRow {
    /// Build a row from any `geo_traits` geometry, encoding it for `srs_id`.
    pub fn from_geometry<G, I>(id: i64, geometry: G, srs_id: i32, properties: I) -> Result<Self>
    where
        G: GeometryTrait<T = f64>,
        I: IntoIterator<Item = Value>,
    {
        let mut wkb = Vec::new();
        wkb::writer::write_geometry(&mut wkb, &geometry, &Default::default())?;
        Ok(Self {
            id,
            geometry: Some(wkb_to_gpkg_geometry(&wkb, srs_id)),
            properties: properties.into_iter().collect(),
        })
    }

    /// Decode the geometry column into WKB, if any.
    pub fn geometry(&self) -> Result<Option<Wkb<'_>>> {
        self.geometry
            .as_deref()
            .map(gpkg_geometry_to_wkb)
            .transpose()
    }
}

/// Decoded fixed part of a GeoPackage geometry blob.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct GeometryHeader {
    pub srs_id: i32,
    pub envelope: Option<Extent>,
    pub empty: bool,
    pub wkb_offset: usize,
}

const HEADER_LEN: usize = 8;

// cf. https://www.geopackage.org/spec140/index.html#gpb_format
pub(crate) fn parse_header(b: &[u8]) -> Result<GeometryHeader> {
    if b.len() < HEADER_LEN || b[0] != b'G' || b[1] != b'P' {
        return Err(PackError::InvalidGpkgGeometryLength {
            len: b.len(),
            minimum: HEADER_LEN,
        });
    }

    let flags = b[3];
    let little_endian = flags & 0b0000_0001 != 0;
    let envelope_len: usize = match (flags & 0b0000_1110) >> 1 {
        0 => 0,
        1 => 32,
        2 | 3 => 48,
        4 => 64,
        _ => return Err(PackError::InvalidGpkgGeometryFlags(flags)),
    };
    let wkb_offset = HEADER_LEN + envelope_len;
    if b.len() < wkb_offset {
        return Err(PackError::InvalidGpkgGeometryLength {
            len: b.len(),
            minimum: wkb_offset,
        });
    }

    let read_i32 = |bytes: [u8; 4]| {
        if little_endian {
            i32::from_le_bytes(bytes)
        } else {
            i32::from_be_bytes(bytes)
        }
    };
    let read_f64 = |at: usize| {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&b[at..at + 8]);
        if little_endian {
            f64::from_le_bytes(bytes)
        } else {
            f64::from_be_bytes(bytes)
        }
    };

    let srs_id = read_i32([b[4], b[5], b[6], b[7]]);
    // Envelope order is [minx, maxx, miny, maxy, ...].
    let envelope = (envelope_len > 0).then(|| {
        Extent::new(
            read_f64(HEADER_LEN),
            read_f64(HEADER_LEN + 16),
            read_f64(HEADER_LEN + 8),
            read_f64(HEADER_LEN + 24),
        )
    });

    Ok(GeometryHeader {
        srs_id,
        envelope,
        empty: flags & 0b0001_0000 != 0,
        wkb_offset,
    })
}

/// Strip GeoPackage header and envelope bytes to access raw WKB.
pub(crate) fn gpkg_geometry_to_wkb(b: &[u8]) -> Result<Wkb<'_>> {
    let header = parse_header(b)?;
    Ok(Wkb::try_new(&b[header.wkb_offset..])?)
}

pub(crate) fn wkb_to_gpkg_geometry(wkb: &[u8], srs_id: i32) -> Vec<u8> {
    let mut geom = Vec::with_capacity(wkb.len() + HEADER_LEN);
    geom.extend_from_slice(&[
        b'G', b'P', 0x00, // magic, version
        0x01, // flags (little endian SRS ID, no envelope)
    ]);
    geom.extend_from_slice(&srs_id.to_le_bytes());
    geom.extend_from_slice(wkb);
    geom
}
