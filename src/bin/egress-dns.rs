// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS rewrite plane.
//!
//! Watches gateway `Service`s and answers queries for their external names
//! with the in-cluster gateway address, forwarding everything to an upstream
//! resolver.
//!
//! Usage:
//!   egress-dns --directive /etc/egress-dns/directive --upstream 127.0.0.1:5353

use anyhow::{Context as _, Result};
use clap::Parser;
use egress_operator::{
    constants::{DEFAULT_SYNC_TIMEOUT_SECS, UPSTREAM_TIMEOUT_SECS},
    dns::{
        directive::Directive,
        rewriter::QueryRewriter,
        rule_feed,
        server::{DnsServer, Forwarder},
        watcher::FleetWatcher,
    },
    logging::init_tracing,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Rewrite DNS queries for egress-gateway external names.
#[derive(Debug, Parser)]
#[command(name = "egress-dns", version, about)]
struct Args {
    /// File holding the `egressoperator <namespace> <zone>` directive
    #[arg(long)]
    directive: PathBuf,

    /// Address to serve DNS on, over UDP and TCP
    #[arg(long, default_value = "0.0.0.0:53")]
    listen: SocketAddr,

    /// Resolver rewritten queries are forwarded to
    #[arg(long, default_value = "127.0.0.1:5353")]
    upstream: SocketAddr,

    /// Seconds to wait for an upstream answer before replying SERVFAIL
    #[arg(long, default_value_t = UPSTREAM_TIMEOUT_SECS)]
    upstream_timeout_secs: u64,

    /// Seconds to wait for the first gateway listing before giving up
    #[arg(long, default_value_t = DEFAULT_SYNC_TIMEOUT_SECS)]
    sync_timeout_secs: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("egress-dns")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<()> {
    init_tracing();

    info!("Starting egress DNS rewrite plane");

    let directive = Directive::load(&args.directive)?;
    debug!(?directive, "Directive loaded");

    let client = directive.client().await?;
    let rewriter = Arc::new(QueryRewriter::new());
    let watcher = FleetWatcher::spawn(
        client,
        directive.namespace.as_deref(),
        rule_feed(directive.zone.clone(), Arc::clone(&rewriter)),
    );

    watcher
        .wait_ready(Duration::from_secs(args.sync_timeout_secs))
        .await
        .context("gateway fleet never synced")?;
    info!(
        rules = rewriter.rules().len(),
        "Gateway fleet synced, serving DNS"
    );

    let forwarder = Forwarder::connect(
        args.upstream,
        Duration::from_secs(args.upstream_timeout_secs),
    )
    .await?;
    let server = DnsServer::bind(args.listen, Arc::clone(&rewriter), forwarder).await?;

    let result = tokio::select! {
        result = server.run() => {
            error!("CRITICAL: DNS server exited unexpectedly: {:?}", result);
            Err(result.err().unwrap_or_else(|| {
                anyhow::anyhow!("DNS server exited unexpectedly without error")
            }))
        }
        signal = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            signal.context("failed to listen for shutdown signal")
        }
    };

    watcher.stop()?;
    watcher.join().await;
    result
}
