//! Geometry validation for incident locations and search areas.
//!
//! Everything here runs before any storage call: a request that reaches the
//! repository carries coordinates that are finite, inside WGS84 bounds, and
//! polygons that are closed, non-degenerate and simple.

use geo::line_intersection::{LineIntersection, line_intersection};
use geo::{Area, Coord, Distance, Haversine, Intersects, Line, LineString, Point, Polygon};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{IncidentError, IncidentResult};

/// Half the Earth's equatorial circumference; no two points are farther apart
pub const MAX_RADIUS_METERS: f64 = 20_037_509.0;

pub fn check_longitude(longitude: f64) -> IncidentResult<()> {
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(IncidentError::Validation(format!(
            "longitude must be a finite number between -180 and 180, got {}",
            longitude
        )));
    }
    Ok(())
}

pub fn check_latitude(latitude: f64) -> IncidentResult<()> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(IncidentError::Validation(format!(
            "latitude must be a finite number between -90 and 90, got {}",
            latitude
        )));
    }
    Ok(())
}

/// A validated WGS84 (SRID 4326) position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> IncidentResult<Self> {
        check_longitude(longitude)?;
        check_latitude(latitude)?;
        Ok(Self {
            longitude,
            latitude,
        })
    }

    /// Great-circle distance in meters
    pub fn distance_meters(&self, other: &GeoPoint) -> f64 {
        Haversine.distance(Point::from(*self), Point::from(*other))
    }
}

impl From<GeoPoint> for Point<f64> {
    fn from(p: GeoPoint) -> Self {
        Point::new(p.longitude, p.latitude)
    }
}

/// Center and radius for proximity search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchCircle {
    pub center: GeoPoint,
    pub radius_meters: f64,
}

impl SearchCircle {
    pub fn new(center: GeoPoint, radius_meters: f64) -> IncidentResult<Self> {
        if !radius_meters.is_finite() || !(0.0..=MAX_RADIUS_METERS).contains(&radius_meters) {
            return Err(IncidentError::Validation(format!(
                "radius must be between 0 and {} meters, got {}",
                MAX_RADIUS_METERS, radius_meters
            )));
        }
        Ok(Self {
            center,
            radius_meters,
        })
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        self.center.distance_meters(point) <= self.radius_meters
    }
}

/// A simple polygon (optionally with holes) for area search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPolygon {
    polygon: Polygon<f64>,
}

impl SearchPolygon {
    /// Validate a GeoJSON geometry. Only `Polygon` is accepted.
    pub fn from_geojson(geometry: &geojson::Geometry) -> IncidentResult<Self> {
        match &geometry.value {
            geojson::Value::Polygon(rings) => Self::from_rings(rings),
            other => Err(IncidentError::Validation(format!(
                "area must be a GeoJSON Polygon, got {}",
                geometry_type(other)
            ))),
        }
    }

    /// Build from `[west, south, east, north]`
    pub fn from_bbox(bbox: [f64; 4]) -> IncidentResult<Self> {
        let [west, south, east, north] = bbox;
        check_longitude(west)?;
        check_longitude(east)?;
        check_latitude(south)?;
        check_latitude(north)?;

        if west >= east || south >= north {
            return Err(IncidentError::Validation(
                "bbox must be [west, south, east, north] with west < east and south < north"
                    .to_string(),
            ));
        }

        let exterior = LineString::from(vec![
            (west, south),
            (east, south),
            (east, north),
            (west, north),
            (west, south),
        ]);
        Ok(Self {
            polygon: Polygon::new(exterior, vec![]),
        })
    }

    fn from_rings(rings: &[Vec<Vec<f64>>]) -> IncidentResult<Self> {
        let Some((exterior, holes)) = rings.split_first() else {
            return Err(IncidentError::Validation(
                "polygon must have an exterior ring".to_string(),
            ));
        };

        let exterior = parse_ring(exterior, "exterior ring")?;
        let holes = holes
            .iter()
            .enumerate()
            .map(|(i, ring)| parse_ring(ring, &format!("hole {}", i + 1)))
            .collect::<IncidentResult<Vec<_>>>()?;

        // A bowtie has zero net area, so crossings must be reported first.
        let all_rings: Vec<&LineString<f64>> = std::iter::once(&exterior).chain(holes.iter()).collect();
        check_simple(&all_rings)?;

        let shell = Polygon::new(exterior.clone(), vec![]);
        if shell.unsigned_area() == 0.0 {
            return Err(IncidentError::Validation(
                "polygon exterior ring has zero area".to_string(),
            ));
        }

        for (i, hole) in holes.iter().enumerate() {
            if Polygon::new(hole.clone(), vec![]).unsigned_area() == 0.0 {
                return Err(IncidentError::Validation(format!("hole {} has zero area", i + 1)));
            }
            // Rings do not cross, so one vertex decides containment.
            let inside = hole
                .0
                .first()
                .is_some_and(|c| shell.intersects(&Point::from(*c)));
            if !inside {
                return Err(IncidentError::Validation(format!(
                    "hole {} lies outside the exterior ring",
                    i + 1
                )));
            }
        }

        Ok(Self {
            polygon: Polygon::new(exterior, holes),
        })
    }

    /// Inside or on the boundary; ring orientation is irrelevant
    pub fn covers(&self, point: &GeoPoint) -> bool {
        self.polygon.intersects(&Point::from(*point))
    }

    /// GeoJSON text for `ST_GeomFromGeoJSON`
    pub fn to_geojson_string(&self) -> IncidentResult<String> {
        let geometry = geojson::Geometry::new(geojson::Value::from(&self.polygon));
        serde_json::to_string(&geometry)
            .map_err(|e| IncidentError::Internal(format!("Failed to encode polygon: {}", e)))
    }

    pub fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }
}

/// A validated search region
#[derive(Debug, Clone, PartialEq)]
pub enum SearchArea {
    Circle(SearchCircle),
    Polygon(SearchPolygon),
}

impl SearchArea {
    pub fn contains(&self, point: &GeoPoint) -> bool {
        match self {
            SearchArea::Circle(circle) => circle.contains(point),
            SearchArea::Polygon(polygon) => polygon.covers(point),
        }
    }
}

fn geometry_type(value: &geojson::Value) -> &'static str {
    match value {
        geojson::Value::Point(_) => "Point",
        geojson::Value::MultiPoint(_) => "MultiPoint",
        geojson::Value::LineString(_) => "LineString",
        geojson::Value::MultiLineString(_) => "MultiLineString",
        geojson::Value::Polygon(_) => "Polygon",
        geojson::Value::MultiPolygon(_) => "MultiPolygon",
        geojson::Value::GeometryCollection(_) => "GeometryCollection",
    }
}

fn parse_ring(positions: &[Vec<f64>], label: &str) -> IncidentResult<LineString<f64>> {
    if positions.len() < 4 {
        return Err(IncidentError::Validation(format!(
            "{} must have at least 4 positions, got {}",
            label,
            positions.len()
        )));
    }

    let coords = positions
        .iter()
        .map(|p| match p.as_slice() {
            [lon, lat] | [lon, lat, _] => {
                check_longitude(*lon)?;
                check_latitude(*lat)?;
                Ok(Coord { x: *lon, y: *lat })
            }
            _ => Err(IncidentError::Validation(format!(
                "{} has a position with {} values, expected [longitude, latitude]",
                label,
                p.len()
            ))),
        })
        .collect::<IncidentResult<Vec<_>>>()?;

    if coords.first() != coords.last() {
        return Err(IncidentError::Validation(format!(
            "{} is not closed: first and last positions differ",
            label
        )));
    }

    let mut distinct: Vec<Coord<f64>> = Vec::with_capacity(coords.len());
    for c in &coords[..coords.len() - 1] {
        if !distinct.contains(c) {
            distinct.push(*c);
        }
    }
    if distinct.len() < 3 {
        return Err(IncidentError::Validation(format!(
            "{} must have at least 3 distinct vertices",
            label
        )));
    }

    Ok(LineString::new(coords))
}

/// Reject rings that cross or touch themselves or each other.
///
/// Consecutive segments of one ring may only share their common vertex;
/// all other segment pairs must be disjoint.
fn check_simple(rings: &[&LineString<f64>]) -> IncidentResult<()> {
    let segments: Vec<(usize, usize, Line<f64>)> = rings
        .iter()
        .enumerate()
        .flat_map(|(r, ring)| {
            ring.lines()
                .filter(|l| l.start != l.end)
                .enumerate()
                .map(move |(i, l)| (r, i, l))
        })
        .collect();

    let ring_len = |r: usize| segments.iter().filter(|(ring, _, _)| *ring == r).count();

    for (a, (ring_a, idx_a, line_a)) in segments.iter().enumerate() {
        for (ring_b, idx_b, line_b) in segments.iter().skip(a + 1) {
            let Some(hit) = line_intersection(*line_a, *line_b) else {
                continue;
            };

            let adjacent = ring_a == ring_b && {
                let n = ring_len(*ring_a);
                idx_b - idx_a == 1 || (*idx_a == 0 && *idx_b == n - 1)
            };

            let touches_only_at_shared_vertex = match hit {
                LineIntersection::SinglePoint { intersection, .. } => {
                    adjacent && shares_vertex(line_a, line_b, intersection)
                }
                LineIntersection::Collinear { .. } => false,
            };

            if !touches_only_at_shared_vertex {
                let what = if ring_a == ring_b {
                    "polygon ring intersects itself"
                } else {
                    "polygon rings intersect each other"
                };
                return Err(IncidentError::Validation(format!(
                    "{} near ({}, {})",
                    what, line_a.start.x, line_a.start.y
                )));
            }
        }
    }

    Ok(())
}

fn shares_vertex(a: &Line<f64>, b: &Line<f64>, at: Coord<f64>) -> bool {
    (a.end == b.start && a.end == at) || (a.start == b.end && a.start == at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn polygon(rings: serde_json::Value) -> IncidentResult<SearchPolygon> {
        let geometry: geojson::Geometry =
            serde_json::from_value(json!({"type": "Polygon", "coordinates": rings})).unwrap();
        SearchPolygon::from_geojson(&geometry)
    }

    fn pt(lon: f64, lat: f64) -> GeoPoint {
        GeoPoint::new(lon, lat).unwrap()
    }

    #[test]
    fn test_geo_point_bounds() {
        assert!(GeoPoint::new(180.0, 90.0).is_ok());
        assert!(GeoPoint::new(-180.0, -90.0).is_ok());
        assert!(GeoPoint::new(180.1, 0.0).is_err());
        assert!(GeoPoint::new(0.0, -90.5).is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
        assert!(GeoPoint::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_circle_radius_bounds() {
        let center = pt(0.0, 0.0);
        assert!(SearchCircle::new(center, 0.0).is_ok());
        assert!(SearchCircle::new(center, MAX_RADIUS_METERS).is_ok());
        assert!(SearchCircle::new(center, -1.0).is_err());
        assert!(SearchCircle::new(center, MAX_RADIUS_METERS + 1.0).is_err());
        assert!(SearchCircle::new(center, f64::NAN).is_err());
    }

    #[test]
    fn test_zero_radius_matches_exact_point_only() {
        let circle = SearchCircle::new(pt(13.4, 52.5), 0.0).unwrap();
        assert!(circle.contains(&pt(13.4, 52.5)));
        assert!(!circle.contains(&pt(13.4001, 52.5)));
    }

    #[test]
    fn test_distance_roughly_one_degree_of_latitude() {
        let d = pt(0.0, 0.0).distance_meters(&pt(0.0, 1.0));
        assert!((d - 111_195.0).abs() < 500.0, "distance was {}", d);
    }

    #[test]
    fn test_square_covers_inside_and_boundary() {
        let square = polygon(json!([[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]]])).unwrap();
        assert!(square.covers(&pt(0.5, 0.5)));
        assert!(square.covers(&pt(1.0, 0.5)));
        assert!(square.covers(&pt(0.0, 0.0)));
        assert!(!square.covers(&pt(1.5, 0.5)));
    }

    #[test]
    fn test_winding_does_not_matter() {
        let ccw = polygon(json!([[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]]])).unwrap();
        let cw = polygon(json!([[[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]]])).unwrap();

        for p in [pt(0.5, 0.5), pt(1.0, 1.0), pt(2.0, 2.0)] {
            assert_eq!(ccw.covers(&p), cw.covers(&p));
        }
    }

    #[test]
    fn test_hole_excludes_interior_but_keeps_its_boundary() {
        let donut = polygon(json!([
            [[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0], [0.0, 0.0]],
            [[1.0, 1.0], [3.0, 1.0], [3.0, 3.0], [1.0, 3.0], [1.0, 1.0]]
        ]))
        .unwrap();

        assert!(donut.covers(&pt(0.5, 0.5)));
        assert!(!donut.covers(&pt(2.0, 2.0)));
        assert!(donut.covers(&pt(1.0, 2.0)));
    }

    #[test]
    fn test_bowtie_is_rejected() {
        let err = polygon(json!([[[0.0, 0.0], [1.0, 1.0], [1.0, 0.0], [0.0, 1.0], [0.0, 0.0]]])).unwrap_err();
        assert!(matches!(err, IncidentError::Validation(ref m) if m.contains("intersects itself")));
    }

    #[test]
    fn test_spike_is_rejected() {
        // Goes out to (2,0) and straight back along the same edge
        let err = polygon(json!([[[0.0, 0.0], [2.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]])).unwrap_err();
        assert!(matches!(err, IncidentError::Validation(_)));
    }

    #[test]
    fn test_unclosed_ring_is_rejected() {
        let err = polygon(json!([[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]])).unwrap_err();
        assert!(matches!(err, IncidentError::Validation(_)));

        let err = polygon(json!([[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.5, 0.5]]])).unwrap_err();
        assert!(matches!(err, IncidentError::Validation(ref m) if m.contains("not closed")));
    }

    #[test]
    fn test_degenerate_rings_are_rejected() {
        // Too few positions
        assert!(polygon(json!([[[0.0, 0.0], [1.0, 0.0], [0.0, 0.0]]])).is_err());
        // Only two distinct vertices
        assert!(polygon(json!([[[0.0, 0.0], [1.0, 0.0], [1.0, 0.0], [0.0, 0.0]]])).is_err());
        // Collinear vertices, zero area
        assert!(polygon(json!([[[0.0, 0.0], [1.0, 0.0], [2.0, 0.0], [0.0, 0.0]]])).is_err());
        // Empty polygon
        assert!(polygon(json!([])).is_err());
    }

    #[test]
    fn test_out_of_range_vertex_is_rejected() {
        let err = polygon(json!([[[0.0, 0.0], [200.0, 0.0], [1.0, 1.0], [0.0, 0.0]]])).unwrap_err();
        assert!(matches!(err, IncidentError::Validation(ref m) if m.contains("longitude")));
    }

    #[test]
    fn test_hole_outside_shell_is_rejected() {
        let err = polygon(json!([
            [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]],
            [[5.0, 5.0], [6.0, 5.0], [6.0, 6.0], [5.0, 5.0]]
        ]))
        .unwrap_err();
        assert!(matches!(err, IncidentError::Validation(ref m) if m.contains("outside")));
    }

    #[test]
    fn test_non_polygon_geometry_is_rejected() {
        let geometry: geojson::Geometry =
            serde_json::from_value(json!({"type": "Point", "coordinates": [0.0, 0.0]})).unwrap();
        let err = SearchPolygon::from_geojson(&geometry).unwrap_err();
        assert!(matches!(err, IncidentError::Validation(ref m) if m.contains("Polygon")));
    }

    #[test]
    fn test_bbox() {
        let bbox = SearchPolygon::from_bbox([-1.0, -1.0, 1.0, 1.0]).unwrap();
        assert!(bbox.covers(&pt(0.0, 0.0)));
        assert!(bbox.covers(&pt(1.0, 1.0)));
        assert!(!bbox.covers(&pt(1.1, 0.0)));

        assert!(SearchPolygon::from_bbox([1.0, -1.0, -1.0, 1.0]).is_err());
        assert!(SearchPolygon::from_bbox([-1.0, 1.0, 1.0, 1.0]).is_err());
        assert!(SearchPolygon::from_bbox([-181.0, -1.0, 1.0, 1.0]).is_err());
    }

    #[test]
    fn test_geojson_output_round_trips_through_geojson_parser() {
        let square = SearchPolygon::from_bbox([0.0, 0.0, 1.0, 1.0]).unwrap();
        let text = square.to_geojson_string().unwrap();
        let parsed: geojson::Geometry = serde_json::from_str(&text).unwrap();
        assert_eq!(SearchPolygon::from_geojson(&parsed).unwrap(), square);
    }
}
