// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Fleet watcher: the live set of gateway `Service`s.
//!
//! Watch events are folded into a reflector store and consumers only ever see
//! the complete, deduplicated membership. A recomputation fires once the
//! initial listing completes (`InitDone`) and after every later change,
//! including re-lists after a reconnect.

use crate::errors::WatcherError;
use crate::labels::{APP_EGRESS_GATEWAY, APP_LABEL};
use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::Service;
use kube::runtime::reflector::{self, store::Writer, Store};
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::{Api, Client};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Reflector-backed fold of watch events into a full snapshot.
pub struct Fleet {
    reader: Store<Service>,
    writer: Writer<Service>,
    synced: bool,
}

impl Default for Fleet {
    fn default() -> Self {
        Self::new()
    }
}

impl Fleet {
    #[must_use]
    pub fn new() -> Self {
        let (reader, writer) = reflector::store();
        Self {
            reader,
            writer,
            synced: false,
        }
    }

    /// `true` once the first full listing has completed.
    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Apply one watch event.
    ///
    /// Returns the complete membership when consumers should recompute.
    pub fn apply(&mut self, event: &Event<Service>) -> Option<Vec<Arc<Service>>> {
        self.writer.apply_watcher_event(event);
        match event {
            Event::InitDone => {
                self.synced = true;
                Some(self.reader.state())
            }
            Event::Apply(_) | Event::Delete(_) if self.synced => Some(self.reader.state()),
            _ => None,
        }
    }
}

/// Background task keeping consumers fed with fleet snapshots.
pub struct FleetWatcher {
    ready: watch::Receiver<bool>,
    stop: Mutex<Option<oneshot::Sender<()>>>,
    task: JoinHandle<()>,
}

impl FleetWatcher {
    /// Watch gateway `Service`s in `namespace` (`None` for all namespaces).
    pub fn spawn<F>(client: Client, namespace: Option<&str>, on_change: F) -> Self
    where
        F: Fn(Vec<Arc<Service>>) + Send + 'static,
    {
        let api: Api<Service> = match namespace {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::all(client),
        };
        let selector = format!("{APP_LABEL}={APP_EGRESS_GATEWAY}");
        info!(
            namespace = namespace.unwrap_or("*"),
            selector = %selector,
            "Starting fleet watcher"
        );

        let stream = watcher::watcher(api, watcher::Config::default().labels(&selector))
            .default_backoff();
        Self::spawn_from_stream(stream, on_change)
    }

    /// Drive the watcher from an arbitrary event stream.
    pub fn spawn_from_stream<S, F>(stream: S, on_change: F) -> Self
    where
        S: Stream<Item = Result<Event<Service>, watcher::Error>> + Send + 'static,
        F: Fn(Vec<Arc<Service>>) + Send + 'static,
    {
        let (ready_tx, ready_rx) = watch::channel(false);
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(run(stream, on_change, ready_tx, stop_rx));

        Self {
            ready: ready_rx,
            stop: Mutex::new(Some(stop_tx)),
            task,
        }
    }

    /// `true` once the first full sync has been delivered to the consumer.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Wait for the first full sync.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::SyncTimeout`] when `timeout` elapses first and
    /// [`WatcherError::Terminated`] when the watcher exits before syncing.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<(), WatcherError> {
        let mut ready = self.ready.clone();
        let synced = tokio::time::timeout(timeout, ready.wait_for(|synced| *synced))
            .await
            .map(|result| result.map(|_| ()));
        match synced {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(WatcherError::Terminated),
            Err(_) => Err(WatcherError::SyncTimeout(timeout.as_secs())),
        }
    }

    /// Signal the watcher to stop.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::AlreadyStopped`] on every call after the first.
    pub fn stop(&self) -> Result<(), WatcherError> {
        let sender = self
            .stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(WatcherError::AlreadyStopped)?;
        // The task may already have exited on its own
        let _ = sender.send(());
        Ok(())
    }

    /// Wait for the background task to finish.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!(error = %e, "Fleet watcher task failed");
        }
    }
}

async fn run<S, F>(
    stream: S,
    on_change: F,
    ready: watch::Sender<bool>,
    mut stop: oneshot::Receiver<()>,
) where
    S: Stream<Item = Result<Event<Service>, watcher::Error>>,
    F: Fn(Vec<Arc<Service>>),
{
    let mut stream = std::pin::pin!(stream);
    let mut fleet = Fleet::new();

    loop {
        tokio::select! {
            _ = &mut stop => {
                info!("Fleet watcher stopped");
                break;
            }
            event = stream.next() => match event {
                Some(Ok(event)) => {
                    if let Some(members) = fleet.apply(&event) {
                        debug!(members = members.len(), "Fleet membership changed");
                        on_change(members);
                        ready.send_replace(true);
                    }
                }
                Some(Err(e)) => warn!(error = %e, "Fleet watch error, retrying"),
                None => {
                    warn!("Fleet watch stream ended");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod watcher_tests;
