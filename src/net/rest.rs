// REST client for the dashboard API
// Three snapshot endpoints plus the on-demand vegetation index point query.
// Each fetch stands alone: a failure here is reported per source and never
// blocks the other sources.

use thiserror::Error;
use tracing::debug;

use super::messages::{DetectionDto, FieldDto, StressAlertDto, VegetationIndexDto};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
}

/// Thin typed client over the dashboard REST API.
#[derive(Clone)]
pub struct ApiClient {
    base: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        ApiClient {
            base: base.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base, path);
        debug!(%url, "fetching");
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }
        Ok(response.json().await?)
    }

    /// Current detection/alert rows (drone + manual).
    pub async fn fetch_detections(&self) -> Result<Vec<DetectionDto>, FetchError> {
        self.get_json("/detections/map_data").await
    }

    /// Active vegetation-stress alerts. Full snapshot semantics.
    pub async fn fetch_stress_alerts(&self) -> Result<Vec<StressAlertDto>, FetchError> {
        self.get_json("/api/ndvi/stress").await
    }

    /// Registered field boundaries.
    pub async fn fetch_fields(&self) -> Result<Vec<FieldDto>, FetchError> {
        self.get_json("/fields").await
    }

    /// Point query for the vegetation index at a location. Coordinates are
    /// validated by the caller before they get here.
    pub async fn vegetation_index_at(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<VegetationIndexDto, FetchError> {
        self.get_json(&format!("/api/sentinel_ndvi_value?lat={}&lon={}", lat, lon))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal one-shot HTTP server: answers every request with the given
    /// JSON body.
    async fn serve_json(listener: TcpListener, body: &'static str) {
        loop {
            let (mut sock, _) = match listener.accept().await {
                Ok(s) => s,
                Err(_) => return,
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = sock.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = sock.write_all(response.as_bytes()).await;
            });
        }
    }

    #[tokio::test]
    async fn test_fetch_detections_decodes_rows() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve_json(
            listener,
            r#"[{"id": 1, "disease": "Blight", "severity": "High", "lat": 28.6, "lon": 77.2, "confidence": 0.8}]"#,
        ));

        let client = ApiClient::new(format!("http://{}", addr));
        let rows = client.fetch_detections().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].disease, "Blight");
    }

    #[tokio::test]
    async fn test_fetch_failure_is_an_error_not_a_panic() {
        // Nothing listening: the error surfaces to the caller.
        let client = ApiClient::new("http://127.0.0.1:1");
        assert!(client.fetch_stress_alerts().await.is_err());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ApiClient::new("http://example.test/");
        assert_eq!(client.base, "http://example.test");
    }
}
