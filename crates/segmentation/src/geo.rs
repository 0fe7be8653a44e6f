//! Geographic primitives: points, geohash decoding, and the areas a segment
//! can test containment against.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SegmentationError, SegmentationResult};

const BASE32_CODES: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";
const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub lat: f64,
    pub lon: f64,
}

impl GeoLocation {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Reads a point stored in a record: either `{"lat": …, "lon": …}` or a
    /// geohash string (its cell center).
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(hash) => Geohash::parse(hash).ok().map(|g| g.to_geo_location()),
            Value::Object(map) => {
                let lat = map.get("lat")?.as_f64()?;
                let lon = map.get("lon")?.as_f64()?;
                Some(Self::new(lat, lon))
            }
            _ => None,
        }
    }

    /// Great-circle distance in meters (haversine formula).
    pub fn distance_meters(&self, other: &GeoLocation) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lat = lat2 - lat1;
        let d_lon = (other.lon - self.lon).to_radians();
        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_METERS * a.sqrt().min(1.0).asin()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBox {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl GeoBox {
    pub fn from_top_right_bottom_left(top: f64, right: f64, bottom: f64, left: f64) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }

    pub fn from_top_right_and_bottom_left(top_right: GeoLocation, bottom_left: GeoLocation) -> Self {
        Self::from_top_right_bottom_left(top_right.lat, top_right.lon, bottom_left.lat, bottom_left.lon)
    }

    pub fn from_top_left_and_bottom_right(top_left: GeoLocation, bottom_right: GeoLocation) -> Self {
        Self::from_top_right_bottom_left(top_left.lat, bottom_right.lon, bottom_right.lat, top_left.lon)
    }

    pub fn center(&self) -> GeoLocation {
        GeoLocation::new((self.top + self.bottom) / 2.0, (self.left + self.right) / 2.0)
    }

    /// Boxes whose left edge lies east of their right edge wrap across the
    /// antimeridian.
    pub fn contains(&self, point: &GeoLocation) -> bool {
        if point.lat < self.bottom || point.lat > self.top {
            return false;
        }
        if self.left <= self.right {
            point.lon >= self.left && point.lon <= self.right
        } else {
            point.lon >= self.left || point.lon <= self.right
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCircle {
    pub center: GeoLocation,
    pub radius_meters: f64,
}

impl GeoCircle {
    pub fn new(center: GeoLocation, radius_meters: f64) -> Self {
        Self {
            center,
            radius_meters,
        }
    }

    pub fn contains(&self, point: &GeoLocation) -> bool {
        self.center.distance_meters(point) <= self.radius_meters
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPolygon {
    pub points: Vec<GeoLocation>,
}

impl GeoPolygon {
    pub fn new(points: Vec<GeoLocation>) -> Self {
        Self { points }
    }

    /// Even-odd ray casting, longitude as x and latitude as y.
    pub fn contains(&self, point: &GeoLocation) -> bool {
        let n = self.points.len();
        if n < 3 {
            return false;
        }
        let (x, y) = (point.lon, point.lat);
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = (self.points[i].lon, self.points[i].lat);
            let (xj, yj) = (self.points[j].lon, self.points[j].lat);
            if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

/// The shapes accepted by the `inside` criterion.
#[derive(Debug, Clone, PartialEq)]
pub enum GeoArea {
    Box(GeoBox),
    Circle(GeoCircle),
    Polygon(GeoPolygon),
}

impl GeoArea {
    pub fn contains(&self, point: &GeoLocation) -> bool {
        match self {
            GeoArea::Box(b) => b.contains(point),
            GeoArea::Circle(c) => c.contains(point),
            GeoArea::Polygon(p) => p.contains(point),
        }
    }
}

/// A decoded geohash cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Geohash {
    pub geohash: String,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Geohash {
    /// Decodes a base-32 geohash by bisecting the longitude and latitude
    /// ranges, 5 bits per character, starting with longitude.
    pub fn parse(geohash: &str) -> SegmentationResult<Self> {
        let geohash = geohash.to_lowercase();
        let (mut min_lat, mut max_lat) = (-90.0_f64, 90.0_f64);
        let (mut min_lon, mut max_lon) = (-180.0_f64, 180.0_f64);
        let mut is_lon = true;
        for c in geohash.chars() {
            let value = BASE32_CODES
                .iter()
                .position(|&code| char::from(code) == c)
                .ok_or_else(|| {
                    SegmentationError::bad_input(format!("character \"{c}\" is not valid in a geohash"))
                })?;
            for bit in (0..5).rev() {
                let on = (value >> bit) & 1 == 1;
                if is_lon {
                    let mid = (max_lon + min_lon) / 2.0;
                    if on {
                        min_lon = mid;
                    } else {
                        max_lon = mid;
                    }
                } else {
                    let mid = (max_lat + min_lat) / 2.0;
                    if on {
                        min_lat = mid;
                    } else {
                        max_lat = mid;
                    }
                }
                is_lon = !is_lon;
            }
        }
        Ok(Self {
            geohash,
            top: max_lat,
            right: max_lon,
            bottom: min_lat,
            left: min_lon,
        })
    }

    /// Encodes `location` into the cell of `precision` characters that
    /// contains it.
    pub fn encode(location: &GeoLocation, precision: usize) -> Self {
        let (mut min_lat, mut max_lat) = (-90.0_f64, 90.0_f64);
        let (mut min_lon, mut max_lon) = (-180.0_f64, 180.0_f64);
        let mut geohash = String::with_capacity(precision);
        let mut is_lon = true;
        for _ in 0..precision {
            let mut value = 0_usize;
            for _ in 0..5 {
                value <<= 1;
                if is_lon {
                    let mid = (max_lon + min_lon) / 2.0;
                    if location.lon >= mid {
                        value |= 1;
                        min_lon = mid;
                    } else {
                        max_lon = mid;
                    }
                } else {
                    let mid = (max_lat + min_lat) / 2.0;
                    if location.lat >= mid {
                        value |= 1;
                        min_lat = mid;
                    } else {
                        max_lat = mid;
                    }
                }
                is_lon = !is_lon;
            }
            geohash.push(char::from(BASE32_CODES[value]));
        }
        Self {
            geohash,
            top: max_lat,
            right: max_lon,
            bottom: min_lat,
            left: min_lon,
        }
    }

    pub fn top_left(&self) -> GeoLocation {
        GeoLocation::new(self.top, self.left)
    }

    pub fn bottom_right(&self) -> GeoLocation {
        GeoLocation::new(self.bottom, self.right)
    }

    pub fn to_geo_location(&self) -> GeoLocation {
        GeoLocation::new((self.top + self.bottom) / 2.0, (self.left + self.right) / 2.0)
    }

    pub fn to_geo_box(&self) -> GeoBox {
        GeoBox::from_top_right_bottom_left(self.top, self.right, self.bottom, self.left)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(actual: f64, expected: f64) -> bool {
        (actual - expected).abs() < 1e-3
    }

    #[test]
    fn test_geohash_decodes_wikipedia_example() {
        let hash = Geohash::parse("ezs42").unwrap();
        assert!(close(hash.top, 42.627));
        assert!(close(hash.right, -5.581));
        assert!(close(hash.bottom, 42.583));
        assert!(close(hash.left, -5.625));
        let center = hash.to_geo_location();
        assert!(close(center.lat, 42.605));
        assert!(close(center.lon, -5.603));
        assert!(hash.to_geo_box().contains(&center));
    }

    #[test]
    fn test_geohash_encode() {
        let hash = Geohash::encode(&GeoLocation::new(42.605, -5.603), 5);
        assert_eq!(hash.geohash, "ezs42");
        assert_eq!(hash, Geohash::parse("ezs42").unwrap());
        assert!(Geohash::encode(&GeoLocation::new(48.8566, 2.3522), 9).to_geo_box().contains(&GeoLocation::new(48.8566, 2.3522)));
        assert_eq!(Geohash::encode(&GeoLocation::new(0.0, 0.0), 0).geohash, "");
    }

    #[test]
    fn test_geohash_is_case_insensitive() {
        assert_eq!(Geohash::parse("EZS42").unwrap(), Geohash::parse("ezs42").unwrap());
    }

    #[test]
    fn test_geohash_rejects_invalid_characters() {
        assert!(Geohash::parse("u09#").unwrap_err().is_bad_input());
        assert!(Geohash::parse("a").is_err());
    }

    #[test]
    fn test_geohash_center_inside_own_box() {
        for hash in ["u", "t", "v", "0", "zzzz", "u09tvw", "9q8yyk8yuv"] {
            let decoded = Geohash::parse(hash).unwrap();
            assert!(decoded.to_geo_box().contains(&decoded.to_geo_location()), "{hash}");
        }
    }

    #[test]
    fn test_box_constructors_agree() {
        let top_left = GeoLocation::new(10.0, -5.0);
        let bottom_right = GeoLocation::new(-10.0, 5.0);
        let a = GeoBox::from_top_left_and_bottom_right(top_left, bottom_right);
        let b = GeoBox::from_top_right_and_bottom_left(GeoLocation::new(10.0, 5.0), GeoLocation::new(-10.0, -5.0));
        assert_eq!(a, b);
        assert_eq!(a, GeoBox::from_top_right_bottom_left(10.0, 5.0, -10.0, -5.0));
    }

    #[test]
    fn test_box_across_antimeridian() {
        let b = GeoBox::from_top_right_bottom_left(10.0, -170.0, -10.0, 170.0);
        assert!(b.contains(&GeoLocation::new(0.0, 179.0)));
        assert!(b.contains(&GeoLocation::new(0.0, -175.0)));
        assert!(!b.contains(&GeoLocation::new(0.0, 0.0)));
    }

    #[test]
    fn test_circle_uses_great_circle_distance() {
        let paris = GeoLocation::new(48.8566, 2.3522);
        let london = GeoLocation::new(51.5074, -0.1278);
        let distance = paris.distance_meters(&london);
        assert!(distance > 340_000.0 && distance < 345_000.0);
        assert!(GeoCircle::new(paris, 350_000.0).contains(&london));
        assert!(!GeoCircle::new(paris, 300_000.0).contains(&london));
    }

    #[test]
    fn test_polygon_ray_casting() {
        let square = GeoPolygon::new(vec![
            GeoLocation::new(0.0, 0.0),
            GeoLocation::new(0.0, 10.0),
            GeoLocation::new(10.0, 10.0),
            GeoLocation::new(10.0, 0.0),
        ]);
        assert!(square.contains(&GeoLocation::new(5.0, 5.0)));
        assert!(!square.contains(&GeoLocation::new(15.0, 5.0)));
        assert!(!square.contains(&GeoLocation::new(5.0, -1.0)));
    }

    #[test]
    fn test_location_from_json() {
        let point = GeoLocation::from_json(&serde_json::json!({"lat": 1, "lon": 2.5})).unwrap();
        assert_eq!(point, GeoLocation::new(1.0, 2.5));
        assert!(GeoLocation::from_json(&serde_json::json!("ezs42")).is_some());
        assert!(GeoLocation::from_json(&serde_json::json!({"lat": 1})).is_none());
        assert!(GeoLocation::from_json(&serde_json::json!(42)).is_none());
    }
}
