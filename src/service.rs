//! Job service and scenario catalog clients
//!
//! The monitor talks to the remote analysis service through two traits so that
//! tests (and alternative transports) can stand in for HTTP. [`HttpJobService`]
//! implements both against the service's JSON API:
//!
//! - `POST /workflow/run`: submit a scenario
//! - `GET /workflow/{id}`: job status
//! - `GET /scenarios`: scenario catalog
//! - `GET /workflows`, `DELETE /workflow/{id}`, `GET /health`: housekeeping

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::ServiceConfig;
use crate::job::{JobStatus, Scenario, StatusUpdate};
use crate::{Error, Result};

/// Remote executor of workflows
#[async_trait]
pub trait JobService: Send + Sync {
    /// Submit a scenario, returning the new job id
    async fn submit(&self, scenario_id: &str) -> Result<String>;

    /// Query the full state of a job
    async fn status(&self, job_id: &str) -> Result<StatusUpdate>;
}

/// Source of available scenarios
#[async_trait]
pub trait ScenarioCatalog: Send + Sync {
    async fn list(&self) -> Result<Vec<Scenario>>;
}

/// Submit request body
#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    scenario_type: &'a str,
}

/// Submit response body
#[derive(Debug, Deserialize)]
struct SubmitResponse {
    workflow_id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Status response body, as sent by the service
#[derive(Debug, Deserialize)]
pub struct StatusPayload {
    #[serde(default)]
    pub workflow_id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub current_stage: Option<String>,
    #[serde(default)]
    pub results: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub scenario_type: Option<String>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
}

impl TryFrom<StatusPayload> for StatusUpdate {
    type Error = Error;

    fn try_from(payload: StatusPayload) -> Result<Self> {
        let status: JobStatus = payload
            .status
            .parse()
            .map_err(|_| Error::Polling(format!("Unknown job status: {}", payload.status)))?;

        Ok(StatusUpdate {
            status,
            progress: payload.progress.map(clamp_progress),
            current_stage_label: payload.current_stage,
            results: payload.results,
            error: payload.error,
            started_at: payload.started_at,
            completed_at: payload.completed_at,
            scenario_id: payload.scenario_type,
        })
    }
}

fn clamp_progress(progress: f64) -> u8 {
    progress.clamp(0.0, 100.0).round() as u8
}

/// Decode a status response body for `job_id`
pub fn decode_status(job_id: &str, body: &str) -> Result<StatusUpdate> {
    let payload: StatusPayload = serde_json::from_str(body)
        .map_err(|e| Error::Polling(format!("Malformed status payload: {}", e)))?;

    if let Some(id) = &payload.workflow_id {
        if id != job_id {
            return Err(Error::Polling(format!(
                "Status payload is for job {}, expected {}",
                id, job_id
            )));
        }
    }

    payload.try_into()
}

#[derive(Debug, Deserialize)]
struct ScenarioList {
    scenarios: Vec<Scenario>,
}

/// Entry of the service's job listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub workflow_id: String,
    pub status: String,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub current_stage: Option<String>,
    #[serde(default)]
    pub scenario_type: Option<String>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
}

/// The service's job listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobListing {
    pub workflows: Vec<JobSummary>,
    #[serde(default)]
    pub total: usize,
}

/// Service health report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub llm_provider: Option<String>,
    #[serde(default)]
    pub configuration: Option<String>,
}

/// HTTP client for the analysis service
pub struct HttpJobService {
    /// Base URL without trailing slash
    base_url: String,
    /// HTTP client
    client: reqwest::Client,
}

impl HttpJobService {
    /// Create a client from service configuration
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        reqwest::Url::parse(&base_url)
            .map_err(|e| Error::Config(format!("Invalid service URL {}: {}", base_url, e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// List every job the service knows about
    pub async fn list_jobs(&self) -> Result<JobListing> {
        let response = self.client.get(self.url("/workflows")).send().await?;
        let body = error_for_status(response).await.map_err(Error::Service)?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Delete a job from the service
    pub async fn delete_job(&self, job_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/workflow/{}", job_id)))
            .send()
            .await?;
        error_for_status(response).await.map_err(Error::Service)?;
        info!("Deleted job {}", job_id);
        Ok(())
    }

    /// Query service health
    pub async fn health(&self) -> Result<HealthStatus> {
        let response = self.client.get(self.url("/health")).send().await?;
        let body = error_for_status(response).await.map_err(Error::Service)?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Body of a successful response, or a message describing the failure
async fn error_for_status(response: reqwest::Response) -> std::result::Result<String, String> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| format!("Failed to read response body: {}", e))?;

    if status.is_success() {
        return Ok(body);
    }

    // The service reports errors as {"detail": "..."}
    let detail = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("detail").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(body);
    Err(format!("{} {}", status, detail))
}

#[async_trait]
impl JobService for HttpJobService {
    async fn submit(&self, scenario_id: &str) -> Result<String> {
        let response = self
            .client
            .post(self.url("/workflow/run"))
            .json(&SubmitRequest {
                scenario_type: scenario_id,
            })
            .send()
            .await
            .map_err(|e| Error::Submission(format!("Request failed: {}", e)))?;

        let body = error_for_status(response).await.map_err(Error::Submission)?;
        let submitted: SubmitResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Submission(format!("Malformed submit response: {}", e)))?;

        debug!(
            "Submit accepted: status={:?} message={:?}",
            submitted.status, submitted.message
        );
        Ok(submitted.workflow_id)
    }

    async fn status(&self, job_id: &str) -> Result<StatusUpdate> {
        let response = self
            .client
            .get(self.url(&format!("/workflow/{}", job_id)))
            .send()
            .await
            .map_err(|e| Error::Polling(format!("Request failed: {}", e)))?;

        let body = error_for_status(response).await.map_err(Error::Polling)?;
        decode_status(job_id, &body)
    }
}

#[async_trait]
impl ScenarioCatalog for HttpJobService {
    async fn list(&self) -> Result<Vec<Scenario>> {
        let response = self
            .client
            .get(self.url("/scenarios"))
            .send()
            .await
            .map_err(|e| Error::Catalog(format!("Request failed: {}", e)))?;

        let body = error_for_status(response).await.map_err(Error::Catalog)?;
        let list: ScenarioList = serde_json::from_str(&body)
            .map_err(|e| Error::Catalog(format!("Malformed scenario list: {}", e)))?;
        Ok(list.scenarios)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_decode_running_status() {
        let body = r#"{
            "workflow_id": "abc",
            "status": "running",
            "started_at": "2025-01-10T09:00:00",
            "scenario_type": "emergency",
            "progress": 10,
            "current_stage": "Data Ingestion"
        }"#;
        let update = decode_status("abc", body).unwrap();

        assert_eq!(update.status, JobStatus::Running);
        assert_eq!(update.progress, Some(10));
        assert_eq!(update.current_stage_label.as_deref(), Some("Data Ingestion"));
        assert_eq!(update.started_at.as_deref(), Some("2025-01-10T09:00:00"));
        assert_eq!(update.scenario_id.as_deref(), Some("emergency"));
        assert!(update.results.is_none());
    }

    #[test]
    fn test_decode_failed_status() {
        let body = r#"{"workflow_id":"abc","status":"failed","error":"timeout","current_stage":"Failed"}"#;
        let update = decode_status("abc", body).unwrap();
        assert_eq!(update.status, JobStatus::Failed);
        assert_eq!(update.error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_decode_rejects_malformed_payloads() {
        for body in [
            "not json",
            "{}",
            r#"{"status": 3}"#,
            r#"{"status": "exploded"}"#,
            r#"{"workflow_id": "other", "status": "running"}"#,
        ] {
            match decode_status("abc", body) {
                Err(Error::Polling(_)) => {}
                other => panic!("expected polling error for {}: {:?}", body, other),
            }
        }
    }

    #[test]
    fn test_progress_clamping() {
        assert_eq!(clamp_progress(-5.0), 0);
        assert_eq!(clamp_progress(42.4), 42);
        assert_eq!(clamp_progress(180.0), 100);
    }

    #[test]
    fn test_scenario_list_decoding() {
        let body = r#"{"scenarios": [
            {"id": "emergency", "name": "Emergency Resource Allocation",
             "description": "Hurricane disaster response across multiple regions",
             "category": "Emergency Management"},
            {"id": "infrastructure", "name": "Infrastructure Investment Planning"}
        ]}"#;
        let list: ScenarioList = serde_json::from_str(body).unwrap();
        assert_eq!(list.scenarios.len(), 2);
        assert_eq!(list.scenarios[0].category, "Emergency Management");
        assert_eq!(list.scenarios[1].description, "");
    }

    /// Serve one canned response; resolves to the request line that was received
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (HttpJobService, tokio::sync::oneshot::Receiver<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            // Read the whole request so closing does not reset the connection
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);

                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
            }
            let text = String::from_utf8_lossy(&request).to_string();
            let _ = tx.send(text.lines().next().unwrap_or_default().to_string());

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });

        let service = HttpJobService::new(&ServiceConfig {
            base_url: format!("http://{}", addr),
            request_timeout: Duration::from_secs(5),
        })
        .unwrap();
        (service, rx)
    }

    #[tokio::test]
    async fn test_submit_accepted() {
        let (service, request) =
            serve_once("200 OK", r#"{"workflow_id":"abc","status":"started"}"#).await;

        assert_eq!(service.submit("emergency").await.unwrap(), "abc");
        assert!(request.await.unwrap().starts_with("POST /workflow/run "));
    }

    #[tokio::test]
    async fn test_submit_rejection_is_submission_error() {
        let (service, request) =
            serve_once("400 Bad Request", r#"{"detail":"Invalid scenario type"}"#).await;

        match service.submit("nonsense").await {
            Err(Error::Submission(message)) => {
                assert!(message.contains("400"), "message = {}", message);
                assert!(message.contains("Invalid scenario type"), "message = {}", message);
            }
            other => panic!("expected submission error, got {:?}", other),
        }
        assert!(request.await.unwrap().starts_with("POST /workflow/run "));
    }

    #[tokio::test]
    async fn test_status_not_found_is_polling_error() {
        let (service, request) =
            serve_once("404 Not Found", r#"{"detail":"Workflow not found"}"#).await;

        match service.status("abc").await {
            Err(Error::Polling(message)) => {
                assert!(message.contains("404"), "message = {}", message);
                assert!(message.contains("Workflow not found"), "message = {}", message);
            }
            other => panic!("expected polling error, got {:?}", other),
        }
        assert!(request.await.unwrap().starts_with("GET /workflow/abc "));
    }

    #[tokio::test]
    async fn test_error_without_detail_keeps_body() {
        let (service, _request) = serve_once("500 Internal Server Error", "upstream crashed").await;

        match service.status("abc").await {
            Err(Error::Polling(message)) => assert!(message.contains("upstream crashed")),
            other => panic!("expected polling error, got {:?}", other),
        }
    }

    #[test]
    fn test_new_rejects_invalid_url() {
        let config = ServiceConfig {
            base_url: "not a url".to_string(),
            request_timeout: Duration::from_secs(5),
        };
        assert!(matches!(HttpJobService::new(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_new_trims_trailing_slash() {
        let config = ServiceConfig {
            base_url: "http://localhost:8000/".to_string(),
            request_timeout: Duration::from_secs(5),
        };
        let service = HttpJobService::new(&config).unwrap();
        assert_eq!(service.base_url(), "http://localhost:8000");
        assert_eq!(service.url("/scenarios"), "http://localhost:8000/scenarios");
    }
}
