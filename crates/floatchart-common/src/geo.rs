//! Geographic primitives for gazetteer entries.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Latitude/longitude rectangle. `min_lon > max_lon` means the box crosses the date line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn crosses_antimeridian(&self) -> bool {
        self.min_lon > self.max_lon
    }

    pub fn center(&self) -> GeoPoint {
        let lat = (self.min_lat + self.max_lat) / 2.0;
        let lon = if self.crosses_antimeridian() {
            let mid = (self.min_lon + self.max_lon + 360.0) / 2.0;
            if mid > 180.0 { mid - 360.0 } else { mid }
        } else {
            (self.min_lon + self.max_lon) / 2.0
        };
        GeoPoint { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.min_lat)
            && (-90.0..=90.0).contains(&self.max_lat)
            && (-180.0..=180.0).contains(&self.min_lon)
            && (-180.0..=180.0).contains(&self.max_lon)
            && self.min_lat <= self.max_lat
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeoExtent {
    BoundingBox(BoundingBox),
    Point { point: GeoPoint, radius_km: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    /// Named sea or ocean area.
    Region,
    /// City or other point location.
    City,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoRegion {
    pub name: String,
    pub kind: RegionKind,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub extent: GeoExtent,
}

impl GeoRegion {
    pub fn center(&self) -> GeoPoint {
        match &self.extent {
            GeoExtent::BoundingBox(bbox) => bbox.center(),
            GeoExtent::Point { point, .. } => *point,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_of_plain_box() {
        let bbox = BoundingBox { min_lat: 5.0, max_lat: 22.0, min_lon: 80.0, max_lon: 95.0 };
        let c = bbox.center();
        assert!((c.lat - 13.5).abs() < 1e-9);
        assert!((c.lon - 87.5).abs() < 1e-9);
    }

    #[test]
    fn test_center_across_date_line() {
        let bbox = BoundingBox { min_lat: -10.0, max_lat: 10.0, min_lon: 170.0, max_lon: -170.0 };
        assert!(bbox.crosses_antimeridian());
        let c = bbox.center();
        assert!((c.lon.abs() - 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_latitudes() {
        let bbox = BoundingBox { min_lat: 30.0, max_lat: 10.0, min_lon: 0.0, max_lon: 10.0 };
        assert!(!bbox.is_valid());
    }
}
