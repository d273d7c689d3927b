//! Delivery of transitions to the external registration endpoint.
//!
//! Each transition is posted once as a form with the fields `podname`,
//! `namespace`, `ip`, `port` and `state` (`1` up, `0` down). Failures are
//! logged and the transition is dropped; idempotency and reconciliation
//! belong to the endpoint.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::error::ReportError;
use crate::transition::Transition;

/// Default registration endpoint.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8081/hook";

/// Default bound on concurrently outstanding requests.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 64;

/// Default timeout for one registration request, connect to last body byte.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the transition reporter.
#[derive(Clone, Debug)]
pub struct ReporterConfig {
    /// URL receiving the form `POST`.
    pub endpoint: String,

    /// Maximum number of requests in flight at once. Further reports wait
    /// for a free slot without blocking the caller.
    pub max_in_flight: usize,

    /// Timeout for a single request. A request that times out releases its
    /// slot and is logged like any other transport failure.
    pub timeout: Duration,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ReporterConfig {
    /// Creates a configuration posting to `endpoint`.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Sets the bound on concurrently outstanding requests (at least one).
    #[must_use]
    pub fn max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    /// Sets the timeout for a single request.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Posts transitions to the registration endpoint.
///
/// Cloning is cheap; clones share the HTTP client and the in-flight bound.
#[derive(Clone, Debug)]
pub struct Reporter {
    client: Client,
    endpoint: Arc<str>,
    permits: Arc<Semaphore>,
}

impl Reporter {
    /// Creates a reporter from its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Client`] if the HTTP client cannot be built,
    /// for example when no TLS backend can be initialized.
    pub fn new(config: ReporterConfig) -> Result<Self, ReportError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ReportError::Client)?;

        Ok(Self {
            client,
            endpoint: config.endpoint.into(),
            permits: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
        })
    }

    /// Returns the configured endpoint URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Reports a transition in the background.
    ///
    /// The returned handle may be dropped; the report still runs to
    /// completion and logs its outcome. Reports are not ordered relative to
    /// each other.
    pub fn report(&self, transition: Transition) -> JoinHandle<()> {
        let reporter = self.clone();

        tokio::spawn(async move {
            // The semaphore is never closed
            let Ok(_permit) = reporter.permits.acquire().await else {
                return;
            };

            tracing::debug!(
                "hook start called upstream for ns: {}, name: {}",
                transition.namespace,
                transition.name
            );

            match reporter.send(&transition).await {
                Ok(()) => tracing::info!("called hook api for name: {} ok", transition.name),
                Err(e) => tracing::warn!("called hook api for name: {}, error: {e}", transition.name),
            }
        })
    }

    /// Posts a single transition and waits for the response.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Transport`] if no response was received, or
    /// [`ReportError::Status`] if the endpoint answered with anything other
    /// than `200 OK`.
    pub async fn send(&self, transition: &Transition) -> Result<(), ReportError> {
        let form = [
            ("podname", transition.name.as_str()),
            ("namespace", transition.namespace.as_str()),
            ("ip", transition.address.as_str()),
            ("port", transition.port.as_str()),
            ("state", transition.kind.state()),
        ];

        let response = self
            .client
            .post(&*self.endpoint)
            .form(&form)
            .send()
            .await
            .map_err(ReportError::Transport)?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(ReportError::Status { status, body });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};
    use tokio::net::TcpListener;

    use super::*;
    use crate::transition::TransitionKind;

    fn make_transition(kind: TransitionKind) -> Transition {
        Transition {
            kind,
            name: "web-0".to_string(),
            namespace: "shop".to_string(),
            address: "10.0.0.5".to_string(),
            port: "80".to_string(),
            reason: String::new(),
            message: String::new(),
        }
    }

    // Helper to start a listener that accepts connections and never answers
    async fn silent_endpoint() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        format!("http://{addr}/hook")
    }

    fn form_matcher(state: &str) -> Matcher {
        Matcher::AllOf(vec![
            Matcher::UrlEncoded("podname".into(), "web-0".into()),
            Matcher::UrlEncoded("namespace".into(), "shop".into()),
            Matcher::UrlEncoded("ip".into(), "10.0.0.5".into()),
            Matcher::UrlEncoded("port".into(), "80".into()),
            Matcher::UrlEncoded("state".into(), state.into()),
        ])
    }

    #[test]
    fn config_defaults() {
        let config = ReporterConfig::default();

        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.max_in_flight, DEFAULT_MAX_IN_FLIGHT);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn config_builder() {
        let config = ReporterConfig::new("http://registry/hook")
            .max_in_flight(0)
            .timeout(Duration::from_secs(3));

        assert_eq!(config.endpoint, "http://registry/hook");
        assert_eq!(config.max_in_flight, 1);
        assert_eq!(config.timeout, Duration::from_secs(3));

        let reporter = Reporter::new(config).unwrap();
        assert_eq!(reporter.endpoint(), "http://registry/hook");
    }

    #[tokio::test]
    async fn send_times_out_on_silent_endpoint() {
        let config = ReporterConfig::new(silent_endpoint().await).timeout(Duration::from_millis(200));
        let reporter = Reporter::new(config).unwrap();

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            reporter.send(&make_transition(TransitionKind::Add)),
        )
        .await
        .expect("send should give up on its own")
        .unwrap_err();

        assert!(matches!(err, ReportError::Transport(ref e) if e.is_timeout()));
    }

    #[tokio::test]
    async fn report_releases_slot_after_timeout() {
        let config = ReporterConfig::new(silent_endpoint().await)
            .max_in_flight(1)
            .timeout(Duration::from_millis(200));
        let reporter = Reporter::new(config).unwrap();

        let first = reporter.report(make_transition(TransitionKind::Add));
        let second = reporter.report(make_transition(TransitionKind::Del));

        // The second report only gets the single slot once the first times out
        tokio::time::timeout(Duration::from_secs(5), async {
            first.await.unwrap();
            second.await.unwrap();
        })
        .await
        .expect("reports should not wait forever behind a hung request");
    }

    #[tokio::test]
    async fn send_posts_add_form() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_header("content-type", "application/x-www-form-urlencoded")
            .match_body(form_matcher("1"))
            .with_status(200)
            .create_async()
            .await;

        let reporter = Reporter::new(ReporterConfig::new(format!("{}/hook", server.url()))).unwrap();
        reporter
            .send(&make_transition(TransitionKind::Add))
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn send_posts_del_form() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_body(form_matcher("0"))
            .with_status(200)
            .create_async()
            .await;

        let reporter = Reporter::new(ReporterConfig::new(format!("{}/hook", server.url()))).unwrap();
        reporter
            .send(&make_transition(TransitionKind::Del))
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn send_returns_status_error_with_body() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .with_status(500)
            .with_body("registry down")
            .create_async()
            .await;

        let reporter = Reporter::new(ReporterConfig::new(format!("{}/hook", server.url()))).unwrap();
        let err = reporter
            .send(&make_transition(TransitionKind::Add))
            .await
            .unwrap_err();

        match err {
            ReportError::Status { status, body } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "registry down");
            }
            other => panic!("unexpected error: {other}"),
        }

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn send_treats_other_success_codes_as_failure() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/hook")
            .with_status(202)
            .create_async()
            .await;

        let reporter = Reporter::new(ReporterConfig::new(format!("{}/hook", server.url()))).unwrap();
        let err = reporter
            .send(&make_transition(TransitionKind::Add))
            .await
            .unwrap_err();

        assert!(matches!(err, ReportError::Status { status, .. } if status == StatusCode::ACCEPTED));
    }

    #[tokio::test]
    async fn send_reports_transport_error() {
        // Nothing listens on port 1
        let reporter = Reporter::new(ReporterConfig::new("http://127.0.0.1:1/hook")).unwrap();
        let err = reporter
            .send(&make_transition(TransitionKind::Add))
            .await
            .unwrap_err();

        assert!(matches!(err, ReportError::Transport(_)));
    }

    #[tokio::test]
    async fn report_swallows_server_error() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let reporter = Reporter::new(ReporterConfig::new(format!("{}/hook", server.url()))).unwrap();

        // The task logs the failure and completes normally
        reporter
            .report(make_transition(TransitionKind::Add))
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn report_runs_concurrent_reports_with_single_slot() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .with_status(200)
            .expect(3)
            .create_async()
            .await;

        let reporter = Reporter::new(
            ReporterConfig::new(format!("{}/hook", server.url())).max_in_flight(1),
        )
        .unwrap();

        let handles: Vec<_> = [TransitionKind::Add, TransitionKind::Del, TransitionKind::Add]
            .into_iter()
            .map(|kind| reporter.report(make_transition(kind)))
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        mock.assert_async().await;
    }
}
