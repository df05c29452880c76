//! # Geometry and Coordinate Order
//!
//! Field clients exchange coordinates as `(latitude, longitude)` pairs while
//! spatial storage (PostGIS, WKT, GeoJSON) uses `(longitude, latitude)`.
//! The two orders are distinct types:
//!
//! - [`LatLng`] — client-facing wire order.
//! - [`LngLat`] — storage order (`x = longitude`, `y = latitude`).
//!
//! [`Geometry::from_wire`] and [`Geometry::to_wire`] are the only conversion
//! points. Everything below the boundary handles [`LngLat`] exclusively.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GeometryError;

/// Mean Earth radius in kilometres (IUGG).
const EARTH_RADIUS_KM: f64 = 6371.0088;

/// The shape of an observation's geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum GeometryKind {
    /// A single position.
    #[serde(rename = "POINT")]
    Point,
    /// An open path of two or more positions.
    #[serde(rename = "LINESTRING")]
    LineString,
    /// A closed ring of four or more positions (first == last).
    #[serde(rename = "POLYGON")]
    Polygon,
}

impl GeometryKind {
    /// Return the canonical upper-case name stored in the `geom_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Point => "POINT",
            Self::LineString => "LINESTRING",
            Self::Polygon => "POLYGON",
        }
    }
}

impl Default for GeometryKind {
    fn default() -> Self {
        Self::Point
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GeometryKind {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "POINT" => Ok(Self::Point),
            "LINESTRING" => Ok(Self::LineString),
            "POLYGON" => Ok(Self::Polygon),
            _ => Err(GeometryError::UnknownKind(s.to_string())),
        }
    }
}

/// A client-facing coordinate in `(latitude, longitude)` order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LatLng {
    /// Latitude in decimal degrees, [-90, 90].
    pub latitude: f64,
    /// Longitude in decimal degrees, [-180, 180].
    pub longitude: f64,
}

impl LatLng {
    /// Create a wire coordinate.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A storage coordinate in `(longitude, latitude)` order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LngLat {
    /// Longitude (x).
    pub lng: f64,
    /// Latitude (y).
    pub lat: f64,
}

impl LngLat {
    /// Create a storage coordinate.
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    fn check(self) -> Result<Self, GeometryError> {
        if !self.lng.is_finite() || !self.lat.is_finite() {
            return Err(GeometryError::NonFinite);
        }
        if !(-90.0..=90.0).contains(&self.lat) || !(-180.0..=180.0).contains(&self.lng) {
            return Err(GeometryError::OutOfRange {
                latitude: self.lat,
                longitude: self.lng,
            });
        }
        Ok(self)
    }
}

/// What to do with a polygon ring whose first and last positions differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingClosure {
    /// Append the first position to close the ring.
    Auto,
    /// Reject the ring.
    Strict,
}

/// A validated geometry in storage order.
///
/// Fields are private: the only constructors validate coordinate count,
/// ring closure, and coordinate range.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    kind: GeometryKind,
    coords: Vec<LngLat>,
}

impl Geometry {
    /// Build a geometry from client-supplied `(lat, lng)` coordinates.
    ///
    /// This is the inbound half of the coordinate-order boundary.
    pub fn from_wire(
        kind: GeometryKind,
        points: &[LatLng],
        closure: RingClosure,
    ) -> Result<Self, GeometryError> {
        let coords = points
            .iter()
            .map(|p| LngLat::new(p.longitude, p.latitude))
            .collect();
        Self::build(kind, coords, closure)
    }

    /// Build a geometry from storage-order coordinates, strictly.
    pub fn from_storage(kind: GeometryKind, coords: Vec<LngLat>) -> Result<Self, GeometryError> {
        Self::build(kind, coords, RingClosure::Strict)
    }

    fn build(
        kind: GeometryKind,
        mut coords: Vec<LngLat>,
        closure: RingClosure,
    ) -> Result<Self, GeometryError> {
        for c in &coords {
            c.check()?;
        }

        match kind {
            GeometryKind::Point => {
                if coords.len() != 1 {
                    return Err(GeometryError::WrongPointCount {
                        kind,
                        expected: "exactly 1",
                        actual: coords.len(),
                    });
                }
            }
            GeometryKind::LineString => {
                if coords.len() < 2 {
                    return Err(GeometryError::WrongPointCount {
                        kind,
                        expected: "at least 2",
                        actual: coords.len(),
                    });
                }
            }
            GeometryKind::Polygon => {
                let (first, last) = match (coords.first(), coords.last()) {
                    (Some(f), Some(l)) => (*f, *l),
                    _ => return Err(GeometryError::TooFewRingPoints { actual: 0 }),
                };
                if first != last {
                    match closure {
                        RingClosure::Auto => coords.push(first),
                        RingClosure::Strict => return Err(GeometryError::UnclosedRing),
                    }
                }
                if coords.len() < 4 {
                    return Err(GeometryError::TooFewRingPoints {
                        actual: coords.len(),
                    });
                }
            }
        }

        Ok(Self { kind, coords })
    }

    /// The geometry kind.
    pub fn kind(&self) -> GeometryKind {
        self.kind
    }

    /// Storage-order coordinates.
    pub fn coords(&self) -> &[LngLat] {
        &self.coords
    }

    /// Client-facing `(lat, lng)` coordinates.
    ///
    /// This is the outbound half of the coordinate-order boundary.
    pub fn to_wire(&self) -> Vec<LatLng> {
        self.coords
            .iter()
            .map(|c| LatLng::new(c.lat, c.lng))
            .collect()
    }

    /// Representative position used for radius filtering (the first vertex).
    pub fn anchor(&self) -> LngLat {
        // Non-empty by construction.
        self.coords[0]
    }

    /// Render as OGC Well-Known Text for `ST_GeomFromText`.
    pub fn to_wkt(&self) -> String {
        let body = self
            .coords
            .iter()
            .map(|c| format!("{} {}", c.lng, c.lat))
            .collect::<Vec<_>>()
            .join(", ");
        match self.kind {
            GeometryKind::Point => format!("POINT({body})"),
            GeometryKind::LineString => format!("LINESTRING({body})"),
            GeometryKind::Polygon => format!("POLYGON(({body}))"),
        }
    }

    /// Decode the `coordinates` member of a GeoJSON geometry (`ST_AsGeoJSON`).
    ///
    /// Only the outer ring of a polygon is kept; holes are not modelled.
    pub fn from_geojson_coordinates(
        kind: GeometryKind,
        value: &serde_json::Value,
    ) -> Result<Self, GeometryError> {
        let coords = match kind {
            GeometryKind::Point => vec![position(value)?],
            GeometryKind::LineString => positions(value)?,
            GeometryKind::Polygon => {
                let outer = value
                    .as_array()
                    .and_then(|rings| rings.first())
                    .ok_or_else(|| GeometryError::MalformedStorage("polygon without ring".into()))?;
                positions(outer)?
            }
        };
        Self::from_storage(kind, coords)
    }
}

fn position(value: &serde_json::Value) -> Result<LngLat, GeometryError> {
    let arr = value
        .as_array()
        .ok_or_else(|| GeometryError::MalformedStorage(format!("expected position, got {value}")))?;
    match (arr.first().and_then(|v| v.as_f64()), arr.get(1).and_then(|v| v.as_f64())) {
        (Some(lng), Some(lat)) => Ok(LngLat::new(lng, lat)),
        _ => Err(GeometryError::MalformedStorage(format!(
            "expected [lng, lat], got {value}"
        ))),
    }
}

fn positions(value: &serde_json::Value) -> Result<Vec<LngLat>, GeometryError> {
    value
        .as_array()
        .ok_or_else(|| GeometryError::MalformedStorage(format!("expected positions, got {value}")))?
        .iter()
        .map(position)
        .collect()
}

/// Great-circle distance between two storage coordinates, in kilometres.
pub fn haversine_km(a: LngLat, b: LngLat) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ll(lat: f64, lng: f64) -> LatLng {
        LatLng::new(lat, lng)
    }

    #[test]
    fn point_requires_exactly_one_coordinate() {
        assert!(Geometry::from_wire(GeometryKind::Point, &[ll(45.0, 5.0)], RingClosure::Auto).is_ok());
        let err = Geometry::from_wire(
            GeometryKind::Point,
            &[ll(45.0, 5.0), ll(45.1, 5.1)],
            RingClosure::Auto,
        )
        .unwrap_err();
        assert!(matches!(err, GeometryError::WrongPointCount { actual: 2, .. }));
        assert!(Geometry::from_wire(GeometryKind::Point, &[], RingClosure::Auto).is_err());
    }

    #[test]
    fn linestring_requires_two_coordinates() {
        let err =
            Geometry::from_wire(GeometryKind::LineString, &[ll(45.0, 5.0)], RingClosure::Auto)
                .unwrap_err();
        assert!(matches!(err, GeometryError::WrongPointCount { .. }));
    }

    #[test]
    fn polygon_with_three_points_is_rejected_even_when_auto_closed() {
        // Two distinct points close to three positions: still too few.
        let err = Geometry::from_wire(
            GeometryKind::Polygon,
            &[ll(45.0, 5.0), ll(45.1, 5.0)],
            RingClosure::Auto,
        )
        .unwrap_err();
        assert_eq!(err, GeometryError::TooFewRingPoints { actual: 3 });
    }

    #[test]
    fn closed_triangle_with_three_positions_is_rejected() {
        let err = Geometry::from_wire(
            GeometryKind::Polygon,
            &[ll(45.0, 5.0), ll(45.1, 5.0), ll(45.0, 5.0)],
            RingClosure::Strict,
        )
        .unwrap_err();
        assert_eq!(err, GeometryError::TooFewRingPoints { actual: 3 });
    }

    #[test]
    fn unclosed_polygon_rejected_in_strict_mode() {
        let err = Geometry::from_wire(
            GeometryKind::Polygon,
            &[ll(45.0, 5.0), ll(45.1, 5.0), ll(45.1, 5.1), ll(45.0, 5.1)],
            RingClosure::Strict,
        )
        .unwrap_err();
        assert_eq!(err, GeometryError::UnclosedRing);
    }

    #[test]
    fn unclosed_polygon_auto_closed() {
        let g = Geometry::from_wire(
            GeometryKind::Polygon,
            &[ll(45.0, 5.0), ll(45.1, 5.0), ll(45.1, 5.1)],
            RingClosure::Auto,
        )
        .unwrap();
        assert_eq!(g.coords().len(), 4);
        assert_eq!(g.coords().first(), g.coords().last());
    }

    #[test]
    fn closed_polygon_accepted_in_strict_mode() {
        let g = Geometry::from_wire(
            GeometryKind::Polygon,
            &[ll(45.0, 5.0), ll(45.1, 5.0), ll(45.1, 5.1), ll(45.0, 5.0)],
            RingClosure::Strict,
        )
        .unwrap();
        assert_eq!(g.kind(), GeometryKind::Polygon);
        assert_eq!(g.coords().len(), 4);
    }

    #[test]
    fn out_of_range_latitude_rejected() {
        let err = Geometry::from_wire(GeometryKind::Point, &[ll(91.0, 5.0)], RingClosure::Auto)
            .unwrap_err();
        assert!(matches!(err, GeometryError::OutOfRange { .. }));
    }

    #[test]
    fn nan_rejected() {
        let err =
            Geometry::from_wire(GeometryKind::Point, &[ll(f64::NAN, 5.0)], RingClosure::Auto)
                .unwrap_err();
        assert_eq!(err, GeometryError::NonFinite);
    }

    #[test]
    fn wire_to_storage_swaps_order_once() {
        let g = Geometry::from_wire(GeometryKind::Point, &[ll(48.85, 2.35)], RingClosure::Auto)
            .unwrap();
        assert_eq!(g.coords()[0], LngLat::new(2.35, 48.85));
        assert_eq!(g.to_wire(), vec![ll(48.85, 2.35)]);
    }

    #[test]
    fn wkt_uses_storage_order() {
        let g = Geometry::from_wire(GeometryKind::Point, &[ll(48.85, 2.35)], RingClosure::Auto)
            .unwrap();
        assert_eq!(g.to_wkt(), "POINT(2.35 48.85)");

        let poly = Geometry::from_wire(
            GeometryKind::Polygon,
            &[ll(1.0, 2.0), ll(1.0, 3.0), ll(2.0, 3.0)],
            RingClosure::Auto,
        )
        .unwrap();
        assert_eq!(poly.to_wkt(), "POLYGON((2 1, 3 1, 3 2, 2 1))");
    }

    #[test]
    fn geojson_polygon_keeps_outer_ring() {
        let value = serde_json::json!([
            [[2.0, 1.0], [3.0, 1.0], [3.0, 2.0], [2.0, 1.0]],
            [[2.1, 1.1], [2.2, 1.1], [2.2, 1.2], [2.1, 1.1]]
        ]);
        let g = Geometry::from_geojson_coordinates(GeometryKind::Polygon, &value).unwrap();
        assert_eq!(g.coords().len(), 4);
        assert_eq!(g.to_wire()[0], ll(1.0, 2.0));
    }

    #[test]
    fn geojson_point_decodes() {
        let value = serde_json::json!([2.35, 48.85]);
        let g = Geometry::from_geojson_coordinates(GeometryKind::Point, &value).unwrap();
        assert_eq!(g.anchor(), LngLat::new(2.35, 48.85));
    }

    #[test]
    fn geojson_garbage_is_malformed_storage() {
        let value = serde_json::json!({"not": "coords"});
        let err = Geometry::from_geojson_coordinates(GeometryKind::Point, &value).unwrap_err();
        assert!(matches!(err, GeometryError::MalformedStorage(_)));
    }

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("linestring".parse::<GeometryKind>().unwrap(), GeometryKind::LineString);
        assert!("CIRCLE".parse::<GeometryKind>().is_err());
    }

    #[test]
    fn kind_serializes_upper_case() {
        let json = serde_json::to_string(&GeometryKind::LineString).unwrap();
        assert_eq!(json, "\"LINESTRING\"");
    }

    #[test]
    fn haversine_paris_lyon() {
        let paris = LngLat::new(2.3522, 48.8566);
        let lyon = LngLat::new(4.8357, 45.7640);
        let d = haversine_km(paris, lyon);
        assert!((d - 392.0).abs() < 5.0, "got {d}");
    }

    proptest! {
        #[test]
        fn wire_round_trip_preserves_points(lat in -90.0f64..=90.0, lng in -180.0f64..=180.0) {
            let g = Geometry::from_wire(GeometryKind::Point, &[ll(lat, lng)], RingClosure::Strict).unwrap();
            prop_assert_eq!(g.to_wire(), vec![ll(lat, lng)]);
            prop_assert_eq!(g.anchor(), LngLat::new(lng, lat));
        }

        #[test]
        fn auto_closed_rings_are_always_closed(
            pts in proptest::collection::vec((-89.0f64..89.0, -179.0f64..179.0), 3..12)
        ) {
            let wire: Vec<LatLng> = pts.iter().map(|(a, b)| ll(*a, *b)).collect();
            if let Ok(g) = Geometry::from_wire(GeometryKind::Polygon, &wire, RingClosure::Auto) {
                prop_assert!(g.coords().len() >= 4);
                prop_assert_eq!(g.coords().first(), g.coords().last());
            }
        }
    }
}
