// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Envoy bootstrap generation for egress gateways.
//!
//! This module turns an [`ExternalServiceSpec`](crate::crd::ExternalServiceSpec)
//! into the static bootstrap document each gateway pod loads from its
//! `ConfigMap`. It handles:
//!
//! - Allocating a collision-free admin port
//! - Building dynamic, override and aggregate clusters per port
//! - Building TCP and UDP proxy listeners with stdout access logs
//! - Rendering the document deterministically and hashing it
//!
//! # Example
//!
//! ```rust,no_run
//! use egress_operator::crd::{ExternalServicePort, ExternalServiceSpec};
//! use egress_operator::envoy::compile;
//!
//! let spec = ExternalServiceSpec {
//!     dns_name: "api.github.com".to_string(),
//!     ports: vec![ExternalServicePort { port: 443, protocol: None }],
//!     ..Default::default()
//! };
//!
//! let compiled = compile("github", &spec).unwrap();
//! assert_eq!(compiled.admin_port, 11000);
//! ```

pub mod access_log;
pub mod compiler;
pub mod ports;
pub mod types;

pub use compiler::{cluster_name, compile, config_hash, CompiledConfig};
pub use ports::allocate_admin_port;
