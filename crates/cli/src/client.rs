//! API client for the sentinel agent

use anyhow::{anyhow, Context, Result};
use reqwest::{Client, Response};
use sentinel_lib::{
    anomaly::AlertmanagerPayload, monitor::CheckStatus, Discord, EntitySnapshot,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// API client for the sentinel agent
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Invalid API URL: {}", base_url);
        }

        Ok(Self { client, base_url })
    }

    /// Build a URL from path segments; each segment is percent-encoded, so
    /// entity ids such as `host1/cpu` stay a single segment
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("Invalid API URL: {}", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            anyhow::bail!("API error ({}): {}", status, message);
        }

        response.json().await.context("Failed to parse response")
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let url = self.url(segments)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse(response).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T> {
        let url = self.url(segments)?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse(response).await
    }

    pub async fn entities(&self) -> Result<EntitiesResponse> {
        self.get(&["v1", "entities"]).await
    }

    pub async fn status(&self, entity: &str) -> Result<EntitySnapshot> {
        self.get(&["v1", "entities", entity]).await
    }

    pub async fn discords(&self, entity: &str, k: usize) -> Result<DiscordsResponse> {
        let mut url = self.url(&["v1", "entities", entity, "discords"])?;
        url.query_pairs_mut().append_pair("k", &k.to_string());

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse(response).await
    }

    pub async fn push(&self, entity: &str, row: &SampleRow) -> Result<IngestResponse> {
        self.post(&["v1", "entities", entity, "samples"], row).await
    }
}

// API request and response types

/// One row of channel values, as pushed to the agent and read from files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRow {
    pub timestamp: i64,
    pub values: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitiesResponse {
    pub entities: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordsResponse {
    pub entity: String,
    pub discords: Vec<Discord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub entity: String,
    pub anomaly_status: CheckStatus,
    pub prediction_status: CheckStatus,
    pub alerts: AlertmanagerPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_entity_ids_are_single_segments() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/entities/host1%2Fcpu")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"entity_id":"host1/cpu","channels":["free_ratio","used_ratio"],
                "samples":12,"window_size":4,"profile_len":9,"last_joint_distance":0.5,
                "last_timestamp":1011,"last_anomaly_check":null,"last_prediction_check":null}"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let snapshot = client.status("host1/cpu").await.unwrap();

        mock.assert_async().await;
        assert_eq!(snapshot.entity_id, "host1/cpu");
        assert_eq!(snapshot.profile_len, Some(9));
    }

    #[tokio::test]
    async fn test_discords_query_and_api_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/entities/db-1/discords")
            .match_query(mockito::Matcher::UrlEncoded("k".into(), "2".into()))
            .with_status(409)
            .with_body(r#"{"error":"insufficient history: have 3 samples, need 80"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client.discords("db-1", 2).await.unwrap_err();

        let message = err.to_string();
        assert!(message.contains("409"), "{message}");
        assert!(message.contains("insufficient history"), "{message}");
    }

    #[tokio::test]
    async fn test_push_posts_row() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/entities/db-1/samples")
            .match_body(mockito::Matcher::Json(serde_json::json!({
                "timestamp": 5,
                "values": {"load": 1.5}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"entity":"db-1","anomaly_status":{"status":"warming_up","have":1,"need":80},
                "prediction_status":{"status":"clear"},"alerts":{"alerts":[]}}"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let row = SampleRow {
            timestamp: 5,
            values: BTreeMap::from([("load".to_string(), 1.5)]),
        };
        let response = client.push("db-1", &row).await.unwrap();

        mock.assert_async().await;
        assert_eq!(
            response.anomaly_status,
            CheckStatus::WarmingUp { have: 1, need: 80 }
        );
        assert!(response.alerts.is_empty());
    }
}
