// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes reconciliation for `ExternalService` resources.
//!
//! # Reconciliation Architecture
//!
//! The operator follows the standard Kubernetes controller pattern:
//!
//! 1. **Watch** - `ExternalService` resources and every generated child kind
//! 2. **Compile** - Turn each `ExternalService` into an Envoy bootstrap document
//! 3. **Apply** - Create or minimally patch each generated object
//!
//! # Modules
//!
//! - [`externalservice`] - Per-`ExternalService` orchestration
//! - [`resources`] - Generic create-or-patch engine
//! - [`merge`] - JSON merge patch and additive metadata merging
//! - [`retry`] - Backoff for transient Kubernetes API errors

pub mod externalservice;
pub mod merge;
pub mod resources;
pub mod retry;

pub use externalservice::{owning_external_service, reconcile_external_service};
pub use resources::{reconcile_object, reconcile_object_with, ObjectStore, Outcome};
