// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Delivery of container updates to replica nodes.
//!
//! [`DeliveryClient`] is the seam between the processor and the network. A
//! delivery never returns an error: every failure mode (refused connection,
//! timeout, non-2xx status) is a non-acknowledgment, and the entry is retried
//! against that node on the next sweep.
//!
//! # HTTP Delivery
//!
//! [`HttpDeliveryClient`] sends one request per replica:
//!
//! ```text
//! PUT http://10.0.0.1:6201/sdb/512/AUTH_test/photos/2024%2Fcat.jpg
//! X-Timestamp: 1700000000.00000
//! User-Agent: object-updater 4242
//! ```
//!
//! The object path is percent-encoded per segment; `/` inside an object name
//! stays a separator, as the replica expects.

use crate::entry::{NodeId, UpdateOp};
use crate::error::SweepError;
use crate::headers::HeaderMap;
use crate::ring::ReplicaNode;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Future returned by [`DeliveryClient::deliver`].
pub type DeliveryFuture<'a> = Pin<Box<dyn Future<Output = DeliveryOutcome> + Send + 'a>>;

/// Result of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryOutcome {
    /// Whether the replica acknowledged the update.
    pub acknowledged: bool,
    /// Node the attempt was made against.
    pub node_id: NodeId,
}

impl DeliveryOutcome {
    pub fn acked(node_id: NodeId) -> Self {
        Self { acknowledged: true, node_id }
    }

    pub fn failed(node_id: NodeId) -> Self {
        Self { acknowledged: false, node_id }
    }
}

/// Delivers one update to one replica.
pub trait DeliveryClient: Send + Sync + 'static {
    /// Attempt delivery of `op` on `path` to `node`.
    ///
    /// `headers` never contains `user-agent`; clients identify themselves.
    fn deliver<'a>(
        &'a self,
        node: &'a ReplicaNode,
        partition: u32,
        op: UpdateOp,
        path: &'a str,
        headers: &'a HeaderMap,
    ) -> DeliveryFuture<'a>;
}

/// HTTP delivery backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpDeliveryClient {
    client: reqwest::Client,
    scheme: &'static str,
}

impl HttpDeliveryClient {
    /// Build a client with the given connect and response timeouts.
    pub fn new(conn_timeout: Duration, node_timeout: Duration) -> Result<Self, SweepError> {
        let client = reqwest::Client::builder()
            .connect_timeout(conn_timeout)
            .timeout(node_timeout)
            .user_agent(format!("object-updater {}", std::process::id()))
            .build()
            .map_err(|e| SweepError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            scheme: "http",
        })
    }

    /// Build the request URL for a replica.
    pub fn url_for(
        &self,
        node: &ReplicaNode,
        partition: u32,
        path: &str,
    ) -> Result<reqwest::Url, SweepError> {
        let host = if node.ip.contains(':') && !node.ip.starts_with('[') {
            format!("[{}]", node.ip)
        } else {
            node.ip.clone()
        };
        let mut url = reqwest::Url::parse(&format!("{}://{}:{}/", self.scheme, host, node.port))
            .map_err(|e| transport_error(node, format!("invalid replica address: {}", e)))?;

        let partition = partition.to_string();
        let segments: Vec<&str> = [node.device.as_str(), partition.as_str()]
            .into_iter()
            .chain(path.trim_start_matches('/').split('/'))
            .collect();
        // URL parsing folds `.` and `..` (and their %2E spellings) into the
        // neighbouring segments, which would address a different object.
        if let Some(dot) = segments.iter().find(|s| matches!(**s, "." | "..")) {
            return Err(transport_error(
                node,
                format!("path segment {:?} in {} cannot be sent verbatim", dot, path),
            ));
        }

        url.path_segments_mut()
            .map_err(|_| transport_error(node, "replica address cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);

        Ok(url)
    }

    fn build_request(
        &self,
        node: &ReplicaNode,
        partition: u32,
        op: UpdateOp,
        path: &str,
        headers: &HeaderMap,
    ) -> Result<reqwest::RequestBuilder, SweepError> {
        let url = self.url_for(node, partition, path)?;
        let method = match op {
            UpdateOp::Put => reqwest::Method::PUT,
            UpdateOp::Delete => reqwest::Method::DELETE,
        };

        let mut header_map = reqwest::header::HeaderMap::with_capacity(headers.len());
        for (name, value) in headers.iter() {
            match (
                reqwest::header::HeaderName::from_bytes(name.as_bytes()),
                reqwest::header::HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    header_map.insert(name, value);
                }
                _ => {
                    warn!(node = %node.address(), header = %name, "Skipping invalid header");
                }
            }
        }

        Ok(self.client.request(method, url).headers(header_map))
    }
}

fn transport_error(node: &ReplicaNode, message: impl Into<String>) -> SweepError {
    SweepError::Transport {
        node: node.address(),
        message: message.into(),
    }
}

impl DeliveryClient for HttpDeliveryClient {
    fn deliver<'a>(
        &'a self,
        node: &'a ReplicaNode,
        partition: u32,
        op: UpdateOp,
        path: &'a str,
        headers: &'a HeaderMap,
    ) -> DeliveryFuture<'a> {
        Box::pin(async move {
            let start = Instant::now();
            let result = match self.build_request(node, partition, op, path, headers) {
                Ok(request) => request
                    .send()
                    .await
                    .map_err(|e| transport_error(node, e.to_string())),
                Err(e) => Err(e),
            };

            let acknowledged = match result {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        debug!(
                            node = %node.address(),
                            status = status.as_u16(),
                            path = %path,
                            "Error code returned from replica"
                        );
                    }
                    status.is_success()
                }
                Err(e) => {
                    warn!(node = %node.address(), path = %path, error = %e, "Delivery to replica failed");
                    false
                }
            };

            crate::metrics::record_delivery(op.as_str(), acknowledged, start.elapsed());

            if acknowledged {
                DeliveryOutcome::acked(node.id)
            } else {
                DeliveryOutcome::failed(node.id)
            }
        })
    }
}
