//! Result and geography types shared across the search pipeline.

use serde::{Deserialize, Serialize};

/// A geographic point in WGS84 coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Rectangular geographic bounds. Containment is inclusive on all edges.
#[derive(Debug, Clone, Copy)]
pub struct GeoBounds {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl GeoBounds {
    pub fn contains(&self, point: GeoPoint) -> bool {
        point.latitude <= self.north
            && point.latitude >= self.south
            && point.longitude <= self.east
            && point.longitude >= self.west
    }
}

/// Approximate Sacramento County coverage area.
pub const SACRAMENTO_BOUNDS: GeoBounds = GeoBounds {
    north: 38.7719,
    south: 38.3616,
    east: -120.7583,
    west: -121.5583,
};

/// Sacramento city center. Used as the search location whenever the caller's
/// coordinates fall outside the county and as the tool bridge default.
pub const SACRAMENTO_CENTER: GeoPoint = GeoPoint {
    latitude: 38.5816,
    longitude: -121.4944,
};

/// One business in a search result set.
///
/// Directory and Places hits both normalize into this shape. `similarity`
/// is carried internally for directory hits but never serialized; missing
/// phone and website serialize as null.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessHit {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub source: String,
    #[serde(skip_serializing, default)]
    pub similarity: Option<f64>,
}

/// The search endpoint response: result list plus one narrated sentence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<BusinessHit>,
    #[serde(rename = "voiceResponse")]
    pub voice_response: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(latitude: f64, longitude: f64) -> GeoPoint {
        GeoPoint {
            latitude,
            longitude,
        }
    }

    #[test]
    fn test_bounds_contains_center() {
        assert!(SACRAMENTO_BOUNDS.contains(SACRAMENTO_CENTER));
    }

    #[test]
    fn test_bounds_edges_are_inclusive() {
        assert!(SACRAMENTO_BOUNDS.contains(point(38.7719, -121.0)));
        assert!(SACRAMENTO_BOUNDS.contains(point(38.3616, -121.0)));
        assert!(SACRAMENTO_BOUNDS.contains(point(38.5, -120.7583)));
        assert!(SACRAMENTO_BOUNDS.contains(point(38.5, -121.5583)));
    }

    #[test]
    fn test_bounds_rejects_outside_points() {
        // San Francisco
        assert!(!SACRAMENTO_BOUNDS.contains(point(37.7749, -122.4194)));
        // Just north of the county line
        assert!(!SACRAMENTO_BOUNDS.contains(point(38.7720, -121.0)));
    }

    #[test]
    fn test_business_hit_serialization_drops_similarity() {
        let hit = BusinessHit {
            id: "abc".to_string(),
            name: "Test Cafe".to_string(),
            description: "coffee".to_string(),
            address: "123 Main St, Sacramento, CA 95814".to_string(),
            city: "Sacramento".to_string(),
            latitude: 38.58,
            longitude: -121.49,
            phone: None,
            website: None,
            source: "supabase".to_string(),
            similarity: Some(0.91),
        };

        let json = serde_json::to_value(&hit).unwrap();
        assert!(json.get("similarity").is_none());
        assert_eq!(json["phone"], serde_json::Value::Null);
        assert_eq!(json["website"], serde_json::Value::Null);
        assert_eq!(json["source"], "supabase");
    }

    #[test]
    fn test_business_hit_deserializes_without_similarity() {
        let hit: BusinessHit = serde_json::from_value(serde_json::json!({
            "id": "p1",
            "name": "Places Result",
            "description": "",
            "address": "",
            "city": "Sacramento",
            "latitude": 38.6,
            "longitude": -121.4,
            "phone": null,
            "website": null,
            "source": "google_places"
        }))
        .unwrap();
        assert_eq!(hit.similarity, None);
    }

    #[test]
    fn test_search_response_uses_camel_case_voice_field() {
        let response = SearchResponse {
            results: Vec::new(),
            voice_response: "I found nothing.".to_string(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("voiceResponse").is_some());
        assert!(json.get("voice_response").is_none());
    }
}
