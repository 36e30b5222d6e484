use crate::config::{AppConfig, FetchConfig};
use crate::error::LoadError;
use crate::topology::Topology;
use crate::types::{AttainmentRecord, MapViewModel};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fetches both payloads concurrently and builds the view model. Nothing is
/// returned unless both sources arrive and decode.
///
/// The education payload must be a JSON array, but a row that does not fit
/// [`AttainmentRecord`] is dropped with a warning instead of failing the load.
/// Its county then renders unfilled.
pub async fn load_model(config: &AppConfig) -> Result<MapViewModel, LoadError> {
    info!("Loading data...");
    let client = build_client(&config.fetch)?;

    let (rows, topology) = tokio::try_join!(
        fetch_json::<Vec<JsonValue>>(&client, "education", &config.sources.education, &config.fetch),
        fetch_json::<Topology>(&client, "topology", &config.sources.topology, &config.fetch),
    )?;
    topology.validate()?;
    let records = decode_records(rows);

    info!(
        records = records.len(),
        arcs = topology.arcs.len(),
        "Loaded education records and topology"
    );
    Ok(MapViewModel::new(records, topology))
}

fn decode_records(rows: Vec<JsonValue>) -> Vec<AttainmentRecord> {
    let total = rows.len();
    let records: Vec<AttainmentRecord> = rows
        .into_iter()
        .enumerate()
        .filter_map(|(row, value)| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(error) => {
                debug!(row, error = %error, "Skipping education row");
                None
            }
        })
        .collect();
    let skipped = total - records.len();
    if skipped > 0 {
        warn!(skipped, total, "Dropped education rows that did not decode");
    }
    records
}

fn build_client(fetch: &FetchConfig) -> Result<reqwest::Client, LoadError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(fetch.timeout_secs))
        .build()
        .map_err(|error| LoadError::Network { source_name: "client".into(), error })
}

fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Reads one JSON document, retrying transient failures with exponential backoff.
pub async fn fetch_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    source_name: &str,
    location: &str,
    fetch: &FetchConfig,
) -> Result<T, LoadError> {
    let attempts = fetch.max_retries.max(1);
    let mut attempt = 0;
    loop {
        match fetch_once(client, source_name, location, fetch).await {
            Ok(body) => {
                return serde_json::from_slice(&body).map_err(|error| LoadError::Json {
                    source_name: source_name.to_string(),
                    error,
                })
            }
            Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                let backoff = Duration::from_secs(2u64.pow(attempt));
                debug!(
                    source = source_name,
                    attempt = attempt,
                    backoff_secs = backoff.as_secs(),
                    error = %e,
                    "Retrying fetch"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => {
                warn!(source = source_name, error = %e, "Fetch failed");
                return Err(e);
            }
        }
    }
}

async fn fetch_once(
    client: &reqwest::Client,
    source_name: &str,
    location: &str,
    fetch: &FetchConfig,
) -> Result<Vec<u8>, LoadError> {
    if !is_remote(location) {
        debug!(source = source_name, path = location, "Reading local file");
        return tokio::fs::read(location).await.map_err(|error| LoadError::Io {
            path: location.to_string(),
            error,
        });
    }

    debug!(source = source_name, url = location, "GET");
    let network = |error: reqwest::Error| {
        if error.is_timeout() {
            LoadError::Timeout {
                source_name: source_name.to_string(),
                timeout: Duration::from_secs(fetch.timeout_secs),
            }
        } else {
            LoadError::Network { source_name: source_name.to_string(), error }
        }
    };

    let response = client.get(location).send().await.map_err(network)?;
    let status = response.status();
    if !status.is_success() {
        return Err(LoadError::Status {
            source_name: source_name.to_string(),
            status: status.as_u16(),
        });
    }
    let bytes = response.bytes().await.map_err(network)?;
    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceConfig;
    use axum::{http::StatusCode, routing::get, Router};
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    const RECORDS: &str = r#"[
        {"fips":1001,"state":"AL","area_name":"Autauga County","bachelorsOrHigher":21.4},
        {"fips":1003,"state":"AL","area_name":"Baldwin County","bachelorsOrHigher":28.6}
    ]"#;

    const TOPOLOGY: &str = r#"{
        "type": "Topology",
        "objects": {
            "counties": {"type": "GeometryCollection", "geometries": [{"type": "Polygon", "id": 1001, "arcs": [[0]]}]},
            "states": {"type": "GeometryCollection", "geometries": [{"type": "Polygon", "id": "01", "arcs": [[0]]}]}
        },
        "arcs": [[[0, 0], [1, 0], [1, 1], [0, 0]]]
    }"#;

    fn config_for(dir: &TempDir, records: &str, topology: &str) -> AppConfig {
        let education = dir.path().join("education.json");
        let counties = dir.path().join("counties.json");
        fs::write(&education, records).unwrap();
        fs::write(&counties, topology).unwrap();
        AppConfig {
            sources: SourceConfig {
                education: education.to_string_lossy().into_owned(),
                topology: counties.to_string_lossy().into_owned(),
            },
            ..AppConfig::default()
        }
    }

    #[tokio::test]
    async fn test_load_model_from_local_files() {
        let dir = TempDir::new().unwrap();
        let config = config_for(&dir, RECORDS, TOPOLOGY);

        let model = load_model(&config).await.unwrap();
        assert_eq!(model.records.len(), 2);
        assert_eq!(model.records[0].area_name, "Autauga County");
        assert!(model.topology.objects.contains_key("counties"));
    }

    #[tokio::test]
    async fn test_malformed_json_is_reported() {
        let dir = TempDir::new().unwrap();
        let config = config_for(&dir, "[{\"fips\": ", TOPOLOGY);

        let err = load_model(&config).await.unwrap_err();
        assert!(matches!(err, LoadError::Json { ref source_name, .. } if source_name == "education"));
    }

    #[tokio::test]
    async fn test_topology_without_states_is_rejected() {
        let dir = TempDir::new().unwrap();
        let topology = r#"{"type": "Topology", "objects": {"counties": {"type": "GeometryCollection", "geometries": []}}, "arcs": []}"#;
        let config = config_for(&dir, RECORDS, topology);

        let err = load_model(&config).await.unwrap_err();
        assert!(matches!(err, LoadError::Topology(_)));
    }

    #[tokio::test]
    async fn test_missing_file_is_not_retried() {
        let dir = TempDir::new().unwrap();
        let mut config = config_for(&dir, RECORDS, TOPOLOGY);
        config.sources.topology = dir.path().join("absent.json").to_string_lossy().into_owned();
        config.fetch.max_retries = 5;

        let started = std::time::Instant::now();
        let err = load_model(&config).await.unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_bad_row_is_skipped() {
        let dir = TempDir::new().unwrap();
        let records = r#"[
            {"fips":1001,"state":"AL","area_name":"Autauga County","bachelorsOrHigher":21.4},
            {"fips":1003,"state":"AL","area_name":"Baldwin County","bachelorsOrHigher":null},
            {"fips":1005,"state":"AL","area_name":"Barbour County","bachelorsOrHigher":10.9}
        ]"#;
        let config = config_for(&dir, records, TOPOLOGY);

        let model = load_model(&config).await.unwrap();
        let fips: Vec<_> = model.records.iter().map(|r| r.fips).collect();
        assert_eq!(fips, vec![1001, 1005]);
    }

    #[tokio::test]
    async fn test_records_must_be_an_array() {
        let dir = TempDir::new().unwrap();
        let config = config_for(&dir, r#"{"fips": 1001}"#, TOPOLOGY);

        let err = load_model(&config).await.unwrap_err();
        assert!(matches!(err, LoadError::Json { ref source_name, .. } if source_name == "education"));
    }

    /// Serves `body` at `/data.json`, answering `failure` for the first
    /// `failures` requests. Returns the URL and the request counter.
    async fn serve_json(
        failures: usize,
        failure: StatusCode,
        body: &'static str,
    ) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/data.json",
            get(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < failures {
                        (failure, String::new())
                    } else {
                        (StatusCode::OK, body.to_string())
                    }
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/data.json"), hits)
    }

    fn http_fetch() -> FetchConfig {
        FetchConfig { timeout_secs: 5, max_retries: 3 }
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let (url, hits) = serve_json(1, StatusCode::SERVICE_UNAVAILABLE, "[]").await;
        let fetch = http_fetch();
        let client = build_client(&fetch).unwrap();

        let rows: Vec<JsonValue> = fetch_json(&client, "education", &url, &fetch).await.unwrap();
        assert!(rows.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_not_found_fails_without_retry() {
        let (url, hits) = serve_json(usize::MAX, StatusCode::NOT_FOUND, "[]").await;
        let fetch = http_fetch();
        let client = build_client(&fetch).unwrap();

        let err = fetch_json::<Vec<JsonValue>>(&client, "education", &url, &fetch)
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Status { status: 404, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_garbage_body_is_a_decode_error() {
        let (url, hits) = serve_json(0, StatusCode::OK, "not json").await;
        let fetch = http_fetch();
        let client = build_client(&fetch).unwrap();

        let err = fetch_json::<Topology>(&client, "topology", &url, &fetch)
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Json { ref source_name, .. } if source_name == "topology"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remote_detection() {
        assert!(is_remote("https://example.com/counties.json"));
        assert!(is_remote("http://localhost:8000/x.json"));
        assert!(!is_remote("data/counties.json"));
    }
}
