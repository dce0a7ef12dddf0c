//! Best-effort push notification fan-out.
//!
//! Rooms and calls wake interested clients by PUTting a monotonic
//! version to each registered simple-push endpoint. Delivery is
//! advisory: clients resync on their own schedule anyway, so a failed
//! endpoint is logged and skipped, never retried, and never allowed to
//! fail the state change that triggered it.

use std::time::Duration;
use tracing::{debug, error, warn};

const PUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Fans a version number out to simple-push endpoints.
///
/// Cheap to clone; the inner HTTP client pools connections.
#[derive(Clone)]
pub struct PushNotifier {
    http: reqwest::Client,
}

impl PushNotifier {
    /// Build a notifier with the standard short per-request timeout.
    #[must_use]
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(PUSH_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                error!(target: "store.fanout", error = %e, "Failed to build HTTP client, using default");
                reqwest::Client::new()
            });
        Self { http }
    }

    /// Build a notifier around a caller-supplied HTTP client.
    #[must_use]
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Deliver `version` to every endpoint, concurrently, without
    /// waiting for the results.
    ///
    /// The simple-push contract is a PUT of `version=<n>` as a form
    /// body; endpoints treat versions as high-water marks, so
    /// redelivery and reordering are harmless.
    pub fn notify(&self, urls: &[String], version: i64) {
        if urls.is_empty() {
            debug!(target: "store.fanout", version, "No push endpoints registered, skipping");
            return;
        }

        for url in urls {
            let request = self
                .http
                .put(url)
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(format!("version={version}"));
            let url = url.clone();

            tokio::spawn(async move {
                match request.send().await {
                    Ok(response) if response.status().is_success() => {
                        debug!(target: "store.fanout", url = %url, version, "Push delivered");
                    }
                    Ok(response) => {
                        warn!(
                            target: "store.fanout",
                            url = %url,
                            status = %response.status(),
                            "Push endpoint rejected notification"
                        );
                    }
                    Err(e) => {
                        warn!(target: "store.fanout", url = %url, error = %e, "Push delivery failed");
                    }
                }
            });
        }
    }
}

impl Default for PushNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Delivery is spawned, so tests poll the mock until the request
    /// lands instead of awaiting a handle.
    async fn wait_for_requests(server: &MockServer, count: usize) -> Vec<wiremock::Request> {
        for _ in 0..100 {
            if let Some(requests) = server.received_requests().await {
                if requests.len() >= count {
                    return requests;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("push notification never arrived");
    }

    #[tokio::test]
    async fn delivers_version_as_form_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/wake"))
            .and(header("Content-Type", "application/x-www-form-urlencoded"))
            .and(body_string("version=1405517546"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let notifier = PushNotifier::new();
        notifier.notify(&[format!("{}/wake", server.uri())], 1405517546);

        let requests = wait_for_requests(&server, 1).await;
        assert_eq!(requests.len(), 1);
    }

    #[tokio::test]
    async fn notifies_every_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let notifier = PushNotifier::new();
        let urls = vec![
            format!("{}/device-a", server.uri()),
            format!("{}/device-b", server.uri()),
        ];
        notifier.notify(&urls, 42);

        let requests = wait_for_requests(&server, 2).await;
        let mut paths: Vec<String> = requests.iter().map(|r| r.url.path().to_string()).collect();
        paths.sort();
        assert_eq!(paths, vec!["/device-a", "/device-b"]);
    }

    #[tokio::test]
    async fn endpoint_failure_does_not_propagate() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let notifier = PushNotifier::new();
        // A rejecting endpoint is logged and skipped.
        notifier.notify(&[format!("{}/wake", server.uri())], 7);
        wait_for_requests(&server, 1).await;
    }

    #[tokio::test]
    async fn no_endpoints_is_a_quiet_no_op() {
        let notifier = PushNotifier::new();
        notifier.notify(&[], 7);
    }
}
