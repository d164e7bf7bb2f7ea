// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # Egress Operator - Envoy egress gateways for Kubernetes
//!
//! The egress operator fronts external services with per-destination Envoy
//! gateways. Each cluster-scoped `ExternalService` declares a DNS name and the
//! ports to reach it on; the operator generates the gateway fleet for it and a
//! companion DNS plane steers in-cluster clients to that gateway.
//!
//! ## Overview
//!
//! - Custom Resource Definition for `ExternalService`
//! - Compilation of an `ExternalService` into an Envoy bootstrap document
//! - Reconciliation of the generated `ConfigMap`, `Deployment`, `Service`,
//!   `HorizontalPodAutoscaler`, `NetworkPolicy` and `PodDisruptionBudget`
//! - DNS cutover that only redirects traffic once the gateway is ready
//! - A DNS rewrite plane answering external names with gateway addresses
//!
//! ## Modules
//!
//! - [`crd`] - The `ExternalService` custom resource
//! - [`envoy`] - Envoy bootstrap compiler
//! - [`resources`] - Builders for every generated object
//! - [`cutover`] - DNS cutover state machine
//! - [`reconcilers`] - Create-or-patch engine and per-resource orchestration
//! - [`dns`] - DNS rewrite plane
//! - [`config`] - Operator configuration from the environment
//!
//! ## Example
//!
//! ```rust,no_run
//! use egress_operator::crd::{ExternalServicePort, ExternalServiceSpec, Protocol};
//! use egress_operator::envoy::compile;
//!
//! let spec = ExternalServiceSpec {
//!     dns_name: "api.example.com".to_string(),
//!     ports: vec![ExternalServicePort {
//!         port: 443,
//!         protocol: Some(Protocol::Tcp),
//!     }],
//!     ..Default::default()
//! };
//!
//! let compiled = compile("api", &spec).unwrap();
//! println!("{}", compiled.document);
//! ```

pub mod config;
pub mod constants;
pub mod context;
pub mod crd;
pub mod cutover;
pub mod dns;
pub mod envoy;
pub mod errors;
pub mod labels;
pub mod logging;
pub mod metrics;
pub mod reconcilers;
pub mod resources;
