//! Curated business directory search over Supabase PostgREST.
//!
//! Matching is a two-step flow: a stored RPC ranks business ids by cosine
//! similarity against the query embedding, then the matched rows are fetched
//! and the similarity scores merged back on.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::BusinessHit;
use super::SearchError;

const BUSINESS_COLUMNS: &str = "id,name,description,address,city,latitude,longitude,phone,website";

/// Client for the business directory vector search.
#[derive(Clone)]
pub struct VectorStore {
    http: reqwest::Client,
    base_url: Option<String>,
    service_key: Option<String>,
    match_threshold: f64,
}

#[derive(Serialize)]
struct MatchRequest<'a> {
    query_embedding: &'a [f32],
    match_threshold: f64,
    match_count: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingMatch {
    business_id: String,
    similarity: f64,
}

#[derive(Debug, Deserialize)]
struct BusinessRow {
    id: String,
    name: String,
    description: Option<String>,
    address: Option<String>,
    city: Option<String>,
    latitude: f64,
    longitude: f64,
    phone: Option<String>,
    website: Option<String>,
}

impl VectorStore {
    pub fn new(
        http: reqwest::Client,
        base_url: Option<String>,
        service_key: Option<String>,
        match_threshold: f64,
    ) -> Self {
        Self {
            http,
            base_url,
            service_key,
            match_threshold,
        }
    }

    fn credentials(&self) -> Result<(&str, &str), SearchError> {
        let base_url = self.base_url.as_deref().ok_or_else(|| {
            SearchError::VectorStore("Supabase URL not configured".to_string())
        })?;
        let service_key = self.service_key.as_deref().ok_or_else(|| {
            SearchError::VectorStore("Supabase service key not configured".to_string())
        })?;
        Ok((base_url, service_key))
    }

    /// Search the directory by embedding similarity.
    ///
    /// Returns at most `limit` businesses with their similarity scores. Rows
    /// come back in fetch order; scores below the match threshold never
    /// appear because the RPC filters them.
    pub async fn search(
        &self,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<BusinessHit>, SearchError> {
        let matches = self.match_embeddings(embedding, limit).await?;
        debug!("embedding match returned {} ids", matches.len());
        if matches.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<&str> = matches.iter().map(|m| m.business_id.as_str()).collect();
        let rows = self.fetch_details(&ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let similarity = matches
                    .iter()
                    .find(|m| m.business_id == row.id)
                    .map(|m| m.similarity)
                    .unwrap_or(0.0);
                BusinessHit {
                    id: row.id,
                    name: row.name,
                    description: row.description.unwrap_or_default(),
                    address: row.address.unwrap_or_default(),
                    city: row.city.unwrap_or_default(),
                    latitude: row.latitude,
                    longitude: row.longitude,
                    phone: row.phone,
                    website: row.website,
                    source: "supabase".to_string(),
                    similarity: Some(similarity),
                }
            })
            .collect())
    }

    async fn match_embeddings(
        &self,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<EmbeddingMatch>, SearchError> {
        let (base_url, service_key) = self.credentials()?;

        let response = self
            .http
            .post(format!("{base_url}/rest/v1/rpc/match_business_embeddings"))
            .header("apikey", service_key)
            .bearer_auth(service_key)
            .json(&MatchRequest {
                query_embedding: embedding,
                match_threshold: self.match_threshold,
                match_count: limit,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::VectorStore(format!(
                "embedding match returned {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| SearchError::VectorStore(format!("invalid match response: {e}")))
    }

    async fn fetch_details(&self, ids: &[&str]) -> Result<Vec<BusinessRow>, SearchError> {
        let (base_url, service_key) = self.credentials()?;

        let response = self
            .http
            .get(format!("{base_url}/rest/v1/businesses"))
            .header("apikey", service_key)
            .bearer_auth(service_key)
            .query(&[
                ("select", BUSINESS_COLUMNS),
                ("id", &format!("in.({})", ids.join(","))),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::VectorStore(format!(
                "business fetch returned {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| SearchError::VectorStore(format!("invalid business rows: {e}")))
    }
}
