//! Google Places text search fallback, restricted to Sacramento County.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{error, warn};

use super::types::{BusinessHit, GeoPoint, SACRAMENTO_BOUNDS, SACRAMENTO_CENTER};
use super::SearchError;

pub const DEFAULT_PLACES_BASE_URL: &str = "https://maps.googleapis.com";

/// Strips a ZIP code and everything after it from an address fragment.
static ZIP_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{5}.*").expect("valid regex"));

/// Client for the Places Text Search API.
#[derive(Clone)]
pub struct PlacesClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    radius_m: u32,
}

#[derive(Debug, Deserialize)]
struct TextSearchResponse {
    status: String,
    #[serde(default)]
    results: Vec<PlaceResult>,
}

#[derive(Debug, Deserialize)]
struct PlaceResult {
    place_id: String,
    name: String,
    #[serde(default)]
    types: Vec<String>,
    formatted_address: Option<String>,
    geometry: PlaceGeometry,
    formatted_phone_number: Option<String>,
    website: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaceGeometry {
    location: PlaceLocation,
}

#[derive(Debug, Deserialize)]
struct PlaceLocation {
    lat: f64,
    lng: f64,
}

impl PlacesClient {
    pub fn new(
        http: reqwest::Client,
        base_url: String,
        api_key: Option<String>,
        radius_m: u32,
    ) -> Self {
        Self {
            http,
            base_url,
            api_key,
            radius_m,
        }
    }

    /// Text search near the user, formatted to the directory schema.
    ///
    /// The search recenters on downtown Sacramento when the user location is
    /// outside the county, and results outside the county are dropped. At
    /// most `limit` hits are returned.
    pub async fn text_search(
        &self,
        query: &str,
        user_location: GeoPoint,
        limit: usize,
    ) -> Result<Vec<BusinessHit>, SearchError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            SearchError::Places("Google Places API key not configured".to_string())
        })?;

        let center = if SACRAMENTO_BOUNDS.contains(user_location) {
            user_location
        } else {
            warn!(
                "location {}, {} outside Sacramento County, recentering",
                user_location.latitude, user_location.longitude
            );
            SACRAMENTO_CENTER
        };

        let location = format!("{},{}", center.latitude, center.longitude);
        let radius = self.radius_m.to_string();
        let response = self
            .http
            .get(format!("{}/maps/api/place/textsearch/json", self.base_url))
            .query(&[
                ("query", query),
                ("location", location.as_str()),
                ("radius", radius.as_str()),
                ("key", api_key),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Places(format!(
                "text search returned {status}: {body}"
            )));
        }

        let parsed: TextSearchResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Places(format!("invalid text search response: {e}")))?;

        if parsed.status != "OK" && parsed.status != "ZERO_RESULTS" {
            error!("Google Places API error: {}", parsed.status);
            return Ok(Vec::new());
        }

        Ok(parsed
            .results
            .into_iter()
            .filter(|place| {
                SACRAMENTO_BOUNDS.contains(GeoPoint {
                    latitude: place.geometry.location.lat,
                    longitude: place.geometry.location.lng,
                })
            })
            .take(limit)
            .map(|place| {
                let address = place.formatted_address.unwrap_or_default();
                BusinessHit {
                    id: place.place_id,
                    name: place.name,
                    description: place.types.join(", "),
                    city: extract_city(&address),
                    address,
                    latitude: place.geometry.location.lat,
                    longitude: place.geometry.location.lng,
                    phone: place.formatted_phone_number,
                    website: place.website,
                    source: "google_places".to_string(),
                    similarity: None,
                }
            })
            .collect())
    }
}

/// Extract a city name from a formatted address.
///
/// Takes the second-to-last comma-separated part with any ZIP code and
/// trailing text stripped, matching the "Street, City, State ZIP" layout.
pub(crate) fn extract_city(address: &str) -> String {
    if address.is_empty() {
        return "Sacramento".to_string();
    }

    let parts: Vec<&str> = address.split(',').collect();
    if parts.len() >= 2 {
        let fragment = parts[parts.len() - 2].trim();
        return ZIP_SUFFIX.replace(fragment, "").trim().to_string();
    }

    "Sacramento".to_string()
}
