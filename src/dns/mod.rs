// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS rewrite plane.
//!
//! Clients resolving an external name that is fronted by a gateway are
//! answered with the gateway's in-cluster address instead:
//!
//! - [`directive`] - Startup directive (`egressoperator <namespace> <zone>`)
//! - [`watcher`] - Live snapshot of gateway `Service`s
//! - [`rules`] - Rule compilation from a snapshot
//! - [`rewriter`] - Atomic rule slot and question/answer rewriting
//! - [`server`] - UDP and TCP forwarder serving rewritten queries
//!
//! # Example
//!
//! ```rust,no_run
//! use egress_operator::dns::{rewriter::QueryRewriter, rule_feed, watcher::FleetWatcher};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! async fn start(client: kube::Client) -> anyhow::Result<Arc<QueryRewriter>> {
//!     let rewriter = Arc::new(QueryRewriter::new());
//!     let watcher = FleetWatcher::spawn(
//!         client,
//!         None,
//!         rule_feed("cluster.local".to_string(), Arc::clone(&rewriter)),
//!     );
//!     watcher.wait_ready(Duration::from_secs(10)).await?;
//!     Ok(rewriter)
//! }
//! ```

pub mod directive;
pub mod rewriter;
pub mod rules;
pub mod server;
pub mod watcher;

use k8s_openapi::api::core::v1::Service;
use rewriter::QueryRewriter;
use std::sync::Arc;

/// Fleet-change callback recompiling the rule set and swapping it into
/// `rewriter`.
pub fn rule_feed(
    zone: String,
    rewriter: Arc<QueryRewriter>,
) -> impl Fn(Vec<Arc<Service>>) + Send + 'static {
    move |members| rewriter.set_rules(rules::compile_rules(&members, &zone))
}
