// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for the egress operator.
//!
//! This module provides specialized error types for:
//! - Compiling an `ExternalService` into an Envoy bootstrap document
//! - Parsing the DNS-plane startup directive
//! - Running the fleet watcher that feeds the DNS rewrite rules
//!
//! Orchestration code wraps these in `anyhow::Error` with context; the types
//! here exist so callers can match on the failures that carry meaning.

use thiserror::Error;

/// Errors raised while turning an `ExternalService` into generated objects.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Every candidate admin port is claimed by a TCP port entry.
    ///
    /// Practically unreachable, but reported instead of aborting the process so
    /// only the affected reconcile pass fails.
    #[error("no free admin port in [{start}, {end}) for ExternalService '{name}'")]
    AdminPortExhausted {
        /// Name of the `ExternalService` being compiled
        name: String,
        /// First candidate port (inclusive)
        start: u16,
        /// End of the candidate range (exclusive)
        end: u16,
    },

    /// The bootstrap document could not be serialized.
    #[error("failed to serialize Envoy bootstrap for '{name}': {reason}")]
    Serialization {
        /// Name of the `ExternalService` being compiled
        name: String,
        /// Serializer error message
        reason: String,
    },

    /// The `ExternalService` is missing metadata required to own children.
    #[error("ExternalService is missing metadata.{field}")]
    MissingMetadata {
        /// The missing field (`name` or `uid`)
        field: &'static str,
    },
}

/// Errors raised while parsing the DNS-plane startup directive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectiveError {
    /// The directive is empty or contains only comments.
    #[error("empty directive, expected '{expected} <namespace> <zone>'")]
    Empty {
        /// Expected plugin name
        expected: &'static str,
    },

    /// The directive names a different plugin.
    #[error("unexpected directive '{found}', expected '{expected}'")]
    WrongPlugin {
        /// Plugin name that was found
        found: String,
        /// Expected plugin name
        expected: &'static str,
    },

    /// Namespace or zone is missing.
    #[error("missing required argument '{argument}'")]
    MissingArgument {
        /// Name of the missing argument
        argument: &'static str,
    },

    /// More positional arguments than namespace and zone.
    #[error("unexpected argument '{0}'")]
    UnexpectedArgument(String),

    /// A keyword inside the override block was not recognised.
    #[error("unknown property '{0}'")]
    UnknownProperty(String),

    /// A keyword inside the override block is missing its value.
    #[error("property '{0}' requires a value")]
    MissingValue(String),

    /// An override block was opened but never closed.
    #[error("unterminated '{{' block")]
    UnterminatedBlock,
}

/// Errors raised by the fleet watcher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WatcherError {
    /// `stop()` was called after the watcher had already been stopped.
    #[error("fleet watcher already stopped")]
    AlreadyStopped,

    /// The initial full sync did not complete in time.
    #[error("fleet watcher did not sync within {0}s")]
    SyncTimeout(u64),

    /// The watcher task exited before signalling readiness.
    #[error("fleet watcher exited before the initial sync")]
    Terminated,
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
