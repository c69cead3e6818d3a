//! HTTP management endpoint
//!
//! Serves:
//! - `/metrics`: Prometheus text, gauges refreshed from a fresh snapshot
//! - `/modules`: JSON list of module instances
//! - `/flows`: JSON list of active flows and history
//! - `/health`: liveness, 503 once the manager is shut down

use crate::config::DEFAULT_LISTEN_ADDR;
use crate::manager::ModuleManager;
use anyhow::{Context, Result};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

const TEXT: &str = "text/plain; charset=utf-8";
const METRICS_TEXT: &str = "text/plain; version=0.0.4";
const JSON: &str = "application/json";

#[derive(Debug, Clone)]
pub struct ManagementServerConfig {
    pub listen_addr: SocketAddr,
}

impl ManagementServerConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self { listen_addr }
    }

    /// Parse `addr`, e.g. from [`MetricsConfig::listen_addr`](crate::config::MetricsConfig)
    pub fn from_addr(addr: &str) -> Result<Self> {
        let listen_addr = addr
            .parse()
            .with_context(|| format!("Invalid listen address '{addr}'"))?;
        Ok(Self { listen_addr })
    }
}

impl Default for ManagementServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 9464)),
        }
    }
}

/// Rendered response, independent of the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: String,
}

impl Rendered {
    fn new(status: StatusCode, content_type: &'static str, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
        }
    }

    fn json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_string_pretty(value) {
            Ok(body) => Self::new(StatusCode::OK, JSON, body),
            Err(e) => {
                error!("Failed to serialize response: {}", e);
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, TEXT, format!("Error: {e}"))
            }
        }
    }

    fn into_response(self) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(Bytes::from(self.body)));
        *response.status_mut() = self.status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(self.content_type));
        response
    }
}

pub struct ManagementServer {
    config: ManagementServerConfig,
    manager: Arc<ModuleManager>,
}

impl ManagementServer {
    pub fn new(config: ManagementServerConfig, manager: Arc<ModuleManager>) -> Self {
        Self { config, manager }
    }

    /// Answer one request path
    pub fn route(&self, path: &str) -> Rendered {
        match path {
            "/health" | "/healthz" => {
                if self.manager.is_shut_down() {
                    Rendered::new(StatusCode::SERVICE_UNAVAILABLE, TEXT, "SHUT DOWN")
                } else {
                    Rendered::new(StatusCode::OK, TEXT, "OK")
                }
            }
            "/metrics" => self.render_metrics(),
            "/modules" => Rendered::json(&self.manager.snapshot().modules),
            "/flows" => {
                let snapshot = self.manager.snapshot();
                Rendered::json(&serde_json::json!({
                    "active": snapshot.flows,
                    "history": snapshot.history,
                }))
            }
            "/" => Rendered::new(
                StatusCode::OK,
                TEXT,
                format!(
                    "modflow runtime\n\nEndpoints:\n  /metrics - Prometheus metrics\n  /modules - module instances\n  /flows - data flows\n  /health - Health check\n\nDefault listen address: {DEFAULT_LISTEN_ADDR}\n"
                ),
            ),
            _ => {
                warn!("Unknown management endpoint requested: {}", path);
                Rendered::new(StatusCode::NOT_FOUND, TEXT, "Not Found")
            }
        }
    }

    fn render_metrics(&self) -> Rendered {
        let Some(metrics) = self.manager.metrics() else {
            return Rendered::new(
                StatusCode::SERVICE_UNAVAILABLE,
                TEXT,
                "metrics are not enabled",
            );
        };

        metrics.observe(&self.manager.snapshot());
        match metrics.encode() {
            Ok(text) => Rendered::new(StatusCode::OK, METRICS_TEXT, text),
            Err(e) => {
                error!("Failed to encode metrics: {}", e);
                Rendered::new(StatusCode::INTERNAL_SERVER_ERROR, TEXT, format!("Error: {e}"))
            }
        }
    }

    /// Run until the task is dropped; spawn it on a tokio runtime
    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr)
            .await
            .context("Failed to bind management server")?;

        info!(
            "Management server listening on http://{}",
            self.config.listen_addr
        );

        let server = Arc::new(self);
        loop {
            let (stream, remote_addr) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            let server = Arc::clone(&server);
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                    let server = Arc::clone(&server);
                    async move {
                        debug!("Management request: {} {}", req.method(), req.uri().path());
                        Ok::<_, Infallible>(server.route(req.uri().path()).into_response())
                    }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("Connection error from {}: {}", remote_addr, err);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::RuntimeMetrics;

    fn server(with_metrics: bool) -> ManagementServer {
        let mut builder = ModuleManager::builder();
        if with_metrics {
            builder = builder.metrics(Arc::new(RuntimeMetrics::new().unwrap()));
        }
        ManagementServer::new(
            ManagementServerConfig::default(),
            builder.build().unwrap(),
        )
    }

    #[test]
    fn test_config_from_addr() {
        let config = ManagementServerConfig::from_addr("0.0.0.0:8080").unwrap();
        assert_eq!(config.listen_addr.port(), 8080);
        assert!(ManagementServerConfig::from_addr("nowhere").is_err());
        assert_eq!(ManagementServerConfig::default().listen_addr.port(), 9464);
    }

    #[test]
    fn test_metrics_reflect_snapshot() {
        let server = server(true);
        let rendered = server.route("/metrics");

        assert_eq!(rendered.status, StatusCode::OK);
        assert_eq!(rendered.content_type, METRICS_TEXT);
        // The system sink is auto-instantiated and started
        assert!(rendered
            .body
            .contains("modflow_modules{state=\"started\"} 1"));
    }

    #[test]
    fn test_metrics_disabled() {
        let rendered = server(false).route("/metrics");
        assert_eq!(rendered.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_json_views() {
        let server = server(false);

        let modules = server.route("/modules");
        assert_eq!(modules.content_type, JSON);
        let parsed: serde_json::Value = serde_json::from_str(&modules.body).unwrap();
        assert_eq!(parsed[0]["urn"], "modflow:sink:single");

        let flows: serde_json::Value = serde_json::from_str(&server.route("/flows").body).unwrap();
        assert!(flows["active"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_health_and_unknown_paths() {
        let server = server(false);
        assert_eq!(server.route("/health").status, StatusCode::OK);
        assert_eq!(server.route("/nope").status, StatusCode::NOT_FOUND);

        server.manager.shutdown();
        assert_eq!(server.route("/health").status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
