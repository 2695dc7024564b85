//! HTTP pull endpoints: `/metrics` and `/health`.
//!
//! One blocking `tiny_http` server per port, each on its own thread. When
//! both endpoints share a port they are served by the same server.

use crate::error::TelemetryError;
use crate::health::HealthChecker;
use crate::metrics::Metrics;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;
use tiny_http::{Header, Response, Server};
use tracing::{debug, info, warn};

pub const METRICS_PATH: &str = "/metrics";
pub const HEALTH_PATH: &str = "/health";

/// Status, content type, and body of one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

impl Reply {
    fn new(status: u16, content_type: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    fn not_found() -> Self {
        Self::new(404, "text/plain; charset=utf-8", "not found\n")
    }
}

/// Which endpoints a server answers.
#[derive(Clone, Default)]
pub struct Routes {
    metrics: Option<Arc<Metrics>>,
    health: Option<HealthChecker>,
}

impl Routes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_health(mut self, health: HealthChecker) -> Self {
        self.health = Some(health);
        self
    }

    /// Answer a request for `url` (query string ignored).
    pub fn handle(&self, url: &str) -> Reply {
        let path = url.split('?').next().unwrap_or(url);
        match path {
            METRICS_PATH => match &self.metrics {
                Some(metrics) => match metrics.encode() {
                    Ok(text) => Reply::new(200, metrics.content_type(), text),
                    Err(e) => Reply::new(500, "text/plain; charset=utf-8", e.to_string()),
                },
                None => Reply::not_found(),
            },
            HEALTH_PATH => match &self.health {
                Some(health) => {
                    let report = health.status();
                    let status = if report.is_healthy() { 200 } else { 503 };
                    match serde_json::to_string(&report) {
                        Ok(body) => Reply::new(status, "application/json", body),
                        Err(e) => Reply::new(500, "text/plain; charset=utf-8", e.to_string()),
                    }
                }
                None => Reply::not_found(),
            },
            _ => Reply::not_found(),
        }
    }
}

/// A running endpoint server. Dropping it stops the server.
pub struct EndpointServer {
    server: Arc<Server>,
    addr: SocketAddr,
    worker: Option<JoinHandle<()>>,
}

impl EndpointServer {
    /// Bind `addr` and serve `routes` on a background thread.
    pub fn start(addr: &str, routes: Routes) -> Result<Self, TelemetryError> {
        let server = Server::http(addr).map_err(|e| TelemetryError::ExporterBind {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;
        let bound = server
            .server_addr()
            .to_ip()
            .ok_or_else(|| TelemetryError::ExporterBind {
                addr: addr.to_string(),
                reason: "not an IP listener".to_string(),
            })?;

        let server = Arc::new(server);
        let srv = server.clone();
        let worker = std::thread::Builder::new()
            .name(format!("exporter-{}", bound.port()))
            .spawn(move || {
                for request in srv.incoming_requests() {
                    let reply = routes.handle(request.url());
                    debug!(url = request.url(), status = reply.status, "exporter request");
                    let mut response =
                        Response::from_string(reply.body).with_status_code(reply.status);
                    if let Ok(header) = Header::from_bytes("Content-Type", reply.content_type) {
                        response.add_header(header);
                    }
                    if let Err(e) = request.respond(response) {
                        warn!(error = %e, "exporter failed to write response");
                    }
                }
            })
            .map_err(|e| TelemetryError::ExporterBind {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;

        info!(addr = %bound, "exporter listening");
        Ok(Self {
            server,
            addr: bound,
            worker: Some(worker),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting requests and wait for the worker to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.server.unblock();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for EndpointServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::time::Duration;

    fn get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        write!(
            stream,
            "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            path
        )
        .unwrap();
        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn health_status_codes() {
        let health = HealthChecker::new();
        let routes = Routes::new().with_health(health.clone());
        let reply = routes.handle("/health");
        assert_eq!(reply.status, 200);
        assert_eq!(reply.content_type, "application/json");

        health
            .register_check("broken", Duration::from_secs(3600), || Ok(false))
            .unwrap();
        assert!(health.wait_for_first_results(Duration::from_secs(5)));
        let reply = routes.handle("/health?verbose=1");
        assert_eq!(reply.status, 503);
        assert!(reply.body.contains("\"unhealthy\""));
        health.shutdown();
    }

    #[test]
    fn unknown_and_unconfigured_paths_are_404() {
        let routes = Routes::new().with_health(HealthChecker::new());
        assert_eq!(routes.handle("/metrics").status, 404);
        assert_eq!(routes.handle("/").status, 404);
    }

    #[test]
    fn serves_metrics_over_http() {
        let metrics = Arc::new(Metrics::new().unwrap());
        metrics.set_active_operations(2);
        let server = EndpointServer::start("127.0.0.1:0", Routes::new().with_metrics(metrics))
            .unwrap();

        let response = get(server.local_addr(), "/metrics");
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("backup_active_operations 2"));
        server.shutdown();
    }

    #[test]
    fn bind_failure_is_reported() {
        let first = EndpointServer::start("127.0.0.1:0", Routes::new()).unwrap();
        let taken = first.local_addr().to_string();
        let err = EndpointServer::start(&taken, Routes::new()).err().unwrap();
        assert!(matches!(err, TelemetryError::ExporterBind { .. }));
    }
}
