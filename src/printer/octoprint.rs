use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::json;
use std::time::Duration;

use crate::config::PrinterConfig;
use crate::outbox::OrderApproved;
use crate::utils::{CircuitBreaker, CircuitBreakerError, CircuitState};
use super::{PrintDispatcher, PrinterError};

const API_KEY_HEADER: &str = "X-Api-Key";

/// OctoPrint REST client: selects the configured file on local storage,
/// then starts the job.
pub struct OctoPrintClient {
    base_url: Url,
    api_key: String,
    job_file: String,
    client: Client,
    circuit_breaker: CircuitBreaker,
}

impl OctoPrintClient {
    pub fn new(config: &PrinterConfig) -> Result<Self, PrinterError> {
        // Url::join drops the last path segment unless it ends with '/'
        let mut base = config.base_url.trim_end_matches('/').to_string();
        base.push('/');
        let base_url = Url::parse(&base).map_err(|e| PrinterError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            base_url,
            api_key: config.api_key.clone(),
            job_file: config.job_file.clone(),
            client,
            circuit_breaker: CircuitBreaker::new("printer", config.circuit_breaker.clone()),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, PrinterError> {
        self.base_url
            .join(path)
            .map_err(|e| PrinterError::InvalidUrl(format!("{}{}: {}", self.base_url, path, e)))
    }

    async fn post_command(&self, path: &str, body: serde_json::Value) -> Result<(), PrinterError> {
        let url = self.endpoint(path)?;

        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(PrinterError::Rejected { status: status.as_u16(), body })
    }

    /// Load the job file without printing it
    pub async fn select_file(&self) -> Result<(), PrinterError> {
        self.post_command(
            &format!("api/files/local/{}", self.job_file),
            json!({ "command": "select", "print": false }),
        )
        .await
    }

    /// Start printing whatever file is selected
    pub async fn start_job(&self) -> Result<(), PrinterError> {
        self.post_command("api/job", json!({ "command": "start" })).await
    }
}

#[async_trait]
impl PrintDispatcher for OctoPrintClient {
    async fn start_print(&self, order: &OrderApproved) -> Result<(), PrinterError> {
        tracing::info!(
            order_id = order.order_id,
            design = %order.design,
            color = %order.color,
            file = %self.job_file,
            "🖨️ Initiating print job"
        );

        let result = self
            .circuit_breaker
            .call(async {
                self.select_file().await?;
                self.start_job().await
            })
            .await;

        match result {
            Ok(()) => {
                tracing::info!(order_id = order.order_id, "Print job started");
                Ok(())
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::error!(order_id = order.order_id, "Circuit breaker open - printer unavailable");
                Err(PrinterError::CircuitOpen)
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::error!(order_id = order.order_id, error = %e, "Failed to start print job");
                Err(e)
            }
        }
    }

    async fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.get_state().await
    }

    async fn reset_circuit(&self) {
        self.circuit_breaker.reset().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Vec<(String, serde_json::Value)>>>;

    struct FakeOctoPrint {
        seen: Seen,
        base_url: String,
    }

    /// Answers like OctoPrint; `job_status` is returned from POST /api/job.
    async fn start_fake(job_status: u16) -> FakeOctoPrint {
        let seen: Seen = Arc::default();
        let recorded = seen.clone();

        let server = HttpServer::new(move || {
            let recorded = recorded.clone();
            App::new().default_service(web::to(move |req: HttpRequest, body: web::Json<serde_json::Value>| {
                let recorded = recorded.clone();
                async move {
                    if req.headers().get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) != Some("secret") {
                        return HttpResponse::Forbidden().finish();
                    }
                    let path = req.path().to_string();
                    recorded.lock().unwrap().push((path.clone(), body.into_inner()));

                    if path == "/api/job" {
                        let status = actix_web::http::StatusCode::from_u16(job_status).unwrap();
                        return HttpResponse::build(status).body("job response");
                    }
                    HttpResponse::NoContent().finish()
                }
            }))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();

        let addr = server.addrs()[0];
        actix_web::rt::spawn(server.run());

        FakeOctoPrint { seen, base_url: format!("http://{}/", addr) }
    }

    fn client_for(base_url: &str, api_key: &str) -> OctoPrintClient {
        OctoPrintClient::new(&PrinterConfig {
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            ..PrinterConfig::default()
        })
        .unwrap()
    }

    fn approved() -> OrderApproved {
        OrderApproved { order_id: 12, product_id: 3, design: "logo".into(), color: "red".into() }
    }

    #[actix_web::test]
    async fn test_selects_file_then_starts_job() {
        let fake = start_fake(204).await;
        let client = client_for(&fake.base_url, "secret");

        client.start_print(&approved()).await.unwrap();

        let seen = fake.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "/api/files/local/red.gcode");
        assert_eq!(seen[0].1, serde_json::json!({ "command": "select", "print": false }));
        assert_eq!(seen[1].0, "/api/job");
        assert_eq!(seen[1].1, serde_json::json!({ "command": "start" }));
    }

    #[actix_web::test]
    async fn test_busy_printer_is_transient() {
        let fake = start_fake(409).await;
        let client = client_for(&fake.base_url, "secret");

        let err = client.start_print(&approved()).await.unwrap_err();

        assert!(matches!(err, PrinterError::Rejected { status: 409, .. }));
        assert!(crate::utils::IsTransient::is_transient(&err));
    }

    #[actix_web::test]
    async fn test_wrong_api_key_is_permanent() {
        let fake = start_fake(204).await;
        let client = client_for(&fake.base_url, "wrong");

        let err = client.start_print(&approved()).await.unwrap_err();

        assert!(matches!(err, PrinterError::Rejected { status: 403, .. }));
        assert!(!crate::utils::IsTransient::is_transient(&err));
        assert!(fake.seen.lock().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn test_unreachable_printer_opens_circuit_until_reset() {
        // nothing listens on port 1
        let client = OctoPrintClient::new(&PrinterConfig {
            base_url: "http://127.0.0.1:1/".into(),
            circuit_breaker: crate::utils::CircuitBreakerConfig { failure_threshold: 1, ..Default::default() },
            ..PrinterConfig::default()
        })
        .unwrap();

        let err = client.start_print(&approved()).await.unwrap_err();
        assert!(matches!(err, PrinterError::Transport(_)));
        assert_eq!(client.circuit_state().await, CircuitState::Open);
        assert!(matches!(client.start_print(&approved()).await, Err(PrinterError::CircuitOpen)));

        client.reset_circuit().await;
        assert_eq!(client.circuit_state().await, CircuitState::Closed);
    }

    #[test]
    fn test_invalid_base_url() {
        let result = OctoPrintClient::new(&PrinterConfig { base_url: "not a url".into(), ..PrinterConfig::default() });
        assert!(matches!(result, Err(PrinterError::InvalidUrl(_))));
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client = client_for("http://octopi.local/octoprint", "");
        let url = client.endpoint("api/job").unwrap();
        assert_eq!(url.as_str(), "http://octopi.local/octoprint/api/job");
    }
}
