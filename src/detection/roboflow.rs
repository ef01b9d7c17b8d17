use crate::config::{DetectionConfig, TransportConfig};
use crate::detection::gateway::{DetectionGateway, RawDetection};
use crate::error::Error;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{debug, info, warn};
use reqwest::{header, Client, StatusCode};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Roboflow-hosted pothole detector, reached through either a workflow or a
/// hosted model endpoint.
pub struct RoboflowGateway {
    client: Client,
    api_url: Url,
    api_key: String,
    transport: TransportConfig,
    source_label: String,
    max_retries: u32,
    retry_backoff: Duration,
}

/// Outcome of a single HTTP attempt that did not produce a usable body
enum AttemptError {
    /// Worth retrying: connection problems, timeouts, 5xx and 429
    Transient(String),
    Fatal(String),
}

impl AttemptError {
    fn into_message(self) -> String {
        match self {
            AttemptError::Transient(message) | AttemptError::Fatal(message) => message,
        }
    }
}

impl RoboflowGateway {
    pub fn new(config: &DetectionConfig) -> Result<Self, Error> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                Error::ConfigurationMissing(format!(
                    "detection provider API key not set; export {}",
                    config.api_key_env
                ))
            })?;

        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
            transport: config.transport.clone(),
            source_label: config.source_label.clone(),
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff(),
        })
    }

    fn endpoint(&self) -> Result<Url, Error> {
        let relative = match &self.transport {
            TransportConfig::Workflow {
                workspace,
                workflow_id,
                ..
            } => format!("{}/workflows/{}", workspace, workflow_id),
            TransportConfig::Model {
                model_id, version, ..
            } => format!("{}/{}", model_id, version),
        };

        ensure_slash(&self.api_url)
            .join(&relative)
            .map_err(|e| Error::ConfigurationMissing(format!("Invalid detection endpoint: {}", e)))
    }

    async fn send_once(&self, url: &Url, encoded_image: &str) -> Result<Value, AttemptError> {
        let request = match &self.transport {
            TransportConfig::Workflow { use_cache, .. } => self.client.post(url.clone()).json(&json!({
                "api_key": self.api_key,
                "inputs": {
                    "image": { "type": "base64", "value": encoded_image }
                },
                "use_cache": use_cache,
            })),
            TransportConfig::Model { confidence, .. } => {
                let mut url = url.clone();
                {
                    let mut query = url.query_pairs_mut();
                    query.append_pair("api_key", &self.api_key);
                    if let Some(confidence) = confidence {
                        query.append_pair("confidence", &confidence.to_string());
                    }
                }
                self.client
                    .post(url)
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(encoded_image.to_string())
            }
        };

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AttemptError::Transient(format!("request timed out: {}", e))
            } else {
                AttemptError::Transient(format!("request failed: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("provider returned {}: {}", status, body.trim());
            return if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                Err(AttemptError::Transient(message))
            } else {
                Err(AttemptError::Fatal(message))
            };
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| AttemptError::Fatal(format!("provider returned invalid JSON: {}", e)))
    }

    async fn call_with_retry(&self, url: &Url, encoded_image: &str) -> Result<Value, Error> {
        let mut delay = self.retry_backoff;
        let mut attempt = 0;

        loop {
            match self.send_once(url, encoded_image).await {
                Ok(body) => return Ok(body),
                Err(AttemptError::Transient(message)) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "Detection attempt {} of {} failed: {}; retrying in {:?}",
                        attempt,
                        self.max_retries + 1,
                        message,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(err) => return Err(Error::DetectionUnavailable(err.into_message())),
            }
        }
    }

    fn normalize(&self, body: Value) -> Result<Vec<RawDetection>, Error> {
        match self.transport {
            TransportConfig::Workflow { .. } => predictions_from_workflow(body),
            TransportConfig::Model { .. } => predictions_from_model(body),
        }
    }
}

#[async_trait]
impl DetectionGateway for RoboflowGateway {
    async fn detect(&self, image: &Path) -> Result<Vec<RawDetection>, Error> {
        let bytes = tokio::fs::read(image).await.map_err(|e| {
            Error::DetectionUnavailable(format!("Failed to read image {:?}: {}", image, e))
        })?;
        let encoded = STANDARD.encode(&bytes);
        let url = self.endpoint()?;

        debug!("Sending {} byte image to {}", bytes.len(), url);
        let body = self.call_with_retry(&url, &encoded).await?;
        let detections = self.normalize(body)?;

        info!("Detection provider returned {} predictions", detections.len());
        Ok(detections)
    }

    fn source_label(&self) -> &str {
        &self.source_label
    }
}

/// Makes sure a url has a trailing slash so that `join` appends instead of
/// replacing the last path segment.
fn ensure_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        url.clone()
    } else {
        let mut new_url = url.clone();
        let mut path = new_url.path().to_string();
        path.push('/');
        new_url.set_path(&path);
        new_url
    }
}

/// Workflow responses carry predictions under `outputs[0].predictions`, either
/// as the list itself or wrapped in an object-detection block.
fn predictions_from_workflow(body: Value) -> Result<Vec<RawDetection>, Error> {
    let first_output = body
        .get("outputs")
        .and_then(Value::as_array)
        .and_then(|outputs| outputs.first())
        .ok_or_else(|| Error::DetectionUnavailable("No outputs from detection workflow".to_string()))?;

    let predictions = match first_output.get("predictions") {
        Some(Value::Array(list)) => list,
        Some(Value::Object(block)) => block
            .get("predictions")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                Error::DetectionUnavailable(
                    "Workflow predictions block has no predictions list".to_string(),
                )
            })?,
        _ => {
            return Err(Error::DetectionUnavailable(
                "Workflow output has no predictions".to_string(),
            ))
        }
    };

    Ok(predictions.iter().cloned().map(RawDetection::new).collect())
}

fn predictions_from_model(body: Value) -> Result<Vec<RawDetection>, Error> {
    let predictions = body
        .get("predictions")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            Error::DetectionUnavailable("Model response has no predictions list".to_string())
        })?;

    Ok(predictions.iter().cloned().map(RawDetection::new).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn image_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"\xFF\xD8\xFFfake-jpeg").unwrap();
        file
    }

    fn workflow_config(uri: &str) -> DetectionConfig {
        DetectionConfig {
            api_url: Url::parse(uri).unwrap(),
            api_key: Some("test-key".to_string()),
            request_timeout_secs: 1,
            max_retries: 0,
            retry_backoff_ms: 10,
            ..DetectionConfig::default()
        }
    }

    fn model_config(uri: &str) -> DetectionConfig {
        DetectionConfig {
            transport: TransportConfig::Model {
                model_id: "pothole-detection".to_string(),
                version: 3,
                confidence: Some(40),
            },
            ..workflow_config(uri)
        }
    }

    const WORKFLOW_PATH: &str = "/adi-work/workflows/detect-count-and-visualize";

    #[tokio::test]
    async fn workflow_predictions_are_normalized() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(WORKFLOW_PATH))
            .and(body_partial_json(json!({
                "api_key": "test-key",
                "inputs": { "image": { "type": "base64" } }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "outputs": [{
                    "predictions": [
                        { "width": 40, "height": 50, "confidence": 0.91 },
                        { "width": 100, "height": 90, "confidence": 0.66 }
                    ]
                }]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let gateway = RoboflowGateway::new(&workflow_config(&mock_server.uri())).unwrap();
        let image = image_file();
        let detections = gateway.detect(image.path()).await.unwrap();

        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].number("width"), Some(40.0));
        assert_eq!(detections[1].number("confidence"), Some(0.66));
        assert_eq!(gateway.source_label(), "Roboflow API");
    }

    #[tokio::test]
    async fn workflow_object_detection_block_is_unwrapped() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(WORKFLOW_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "outputs": [{
                    "count_objects": 1,
                    "predictions": {
                        "image": { "width": 640, "height": 480 },
                        "predictions": [
                            { "width": 12.5, "height": 20.0, "confidence": 0.8, "class": "pothole" }
                        ]
                    }
                }]
            })))
            .mount(&mock_server)
            .await;

        let gateway = RoboflowGateway::new(&workflow_config(&mock_server.uri())).unwrap();
        let image = image_file();
        let detections = gateway.detect(image.path()).await.unwrap();

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].label(), Some("pothole"));
    }

    #[tokio::test]
    async fn empty_predictions_are_not_an_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "outputs": [{ "predictions": [] }] })),
            )
            .mount(&mock_server)
            .await;

        let gateway = RoboflowGateway::new(&workflow_config(&mock_server.uri())).unwrap();
        let image = image_file();
        assert!(gateway.detect(image.path()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_outputs_is_unavailable() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "outputs": [] })))
            .mount(&mock_server)
            .await;

        let gateway = RoboflowGateway::new(&workflow_config(&mock_server.uri())).unwrap();
        let image = image_file();
        let err = gateway.detect(image.path()).await.unwrap_err();
        assert!(matches!(err, Error::DetectionUnavailable(_)));
    }

    #[tokio::test]
    async fn model_transport_posts_base64_with_key_in_query() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pothole-detection/3"))
            .and(query_param("api_key", "test-key"))
            .and(query_param("confidence", "40"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "time": 0.04,
                "predictions": [
                    { "x": 10, "y": 10, "width": 60, "height": 50, "confidence": 0.7, "class": "pothole" }
                ]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let gateway = RoboflowGateway::new(&model_config(&mock_server.uri())).unwrap();
        let image = image_file();
        let detections = gateway.detect(image.path()).await.unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].number("height"), Some(50.0));

        let requests = mock_server.received_requests().await.unwrap();
        let body = String::from_utf8(requests[0].body.clone()).unwrap();
        assert_eq!(body, STANDARD.encode(b"\xFF\xD8\xFFfake-jpeg"));
    }

    #[tokio::test]
    async fn model_response_without_predictions_is_unavailable() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "error": "nope" })))
            .mount(&mock_server)
            .await;

        let gateway = RoboflowGateway::new(&model_config(&mock_server.uri())).unwrap();
        let image = image_file();
        let err = gateway.detect(image.path()).await.unwrap_err();
        assert!(matches!(err, Error::DetectionUnavailable(_)));
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "outputs": [{ "predictions": [] }] })),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let config = DetectionConfig {
            max_retries: 2,
            ..workflow_config(&mock_server.uri())
        };
        let gateway = RoboflowGateway::new(&config).unwrap();
        let image = image_file();
        assert!(gateway.detect(image.path()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn retries_give_up_after_the_limit() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(3)
            .mount(&mock_server)
            .await;

        let config = DetectionConfig {
            max_retries: 2,
            ..workflow_config(&mock_server.uri())
        };
        let gateway = RoboflowGateway::new(&config).unwrap();
        let image = image_file();
        let err = gateway.detect(image.path()).await.unwrap_err();
        assert!(matches!(err, Error::DetectionUnavailable(ref m) if m.contains("boom")));
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let config = DetectionConfig {
            max_retries: 3,
            ..workflow_config(&mock_server.uri())
        };
        let gateway = RoboflowGateway::new(&config).unwrap();
        let image = image_file();
        let err = gateway.detect(image.path()).await.unwrap_err();
        assert!(matches!(err, Error::DetectionUnavailable(_)));
    }

    #[tokio::test]
    async fn invalid_json_is_unavailable() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&mock_server)
            .await;

        let gateway = RoboflowGateway::new(&workflow_config(&mock_server.uri())).unwrap();
        let image = image_file();
        let err = gateway.detect(image.path()).await.unwrap_err();
        assert!(matches!(err, Error::DetectionUnavailable(_)));
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "outputs": [{ "predictions": [] }] }))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&mock_server)
            .await;

        let gateway = RoboflowGateway::new(&workflow_config(&mock_server.uri())).unwrap();
        let image = image_file();
        let err = gateway.detect(image.path()).await.unwrap_err();
        assert!(matches!(err, Error::DetectionUnavailable(ref m) if m.contains("timed out")));
    }

    #[tokio::test]
    async fn unreadable_image_is_unavailable() {
        let gateway = RoboflowGateway::new(&workflow_config("http://127.0.0.1:9")).unwrap();
        let err = gateway
            .detect(Path::new("/nonexistent/capture.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DetectionUnavailable(_)));
    }

    #[test]
    fn gateway_requires_an_api_key() {
        let config = DetectionConfig::default();
        assert!(matches!(
            RoboflowGateway::new(&config),
            Err(Error::ConfigurationMissing(_))
        ));
    }

    #[test]
    fn endpoint_keeps_base_path() {
        let config = DetectionConfig {
            api_url: Url::parse("https://example.com/proxy").unwrap(),
            ..workflow_config("http://localhost")
        };
        let gateway = RoboflowGateway::new(&config).unwrap();
        assert_eq!(
            gateway.endpoint().unwrap().as_str(),
            "https://example.com/proxy/adi-work/workflows/detect-count-and-visualize"
        );
    }
}
