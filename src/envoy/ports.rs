// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Admin port allocation.

use crate::constants::{ADMIN_PORT_RANGE_END, ADMIN_PORT_RANGE_START};
use crate::crd::{ExternalServicePort, Protocol};
use crate::errors::ConfigError;
use std::collections::HashSet;

/// Pick the Envoy admin port for a gateway.
///
/// Returns the smallest port in `[11000, 32768)` not claimed by a TCP port
/// entry. UDP entries do not block a candidate because the admin listener is
/// TCP only.
///
/// # Errors
///
/// Returns [`ConfigError::AdminPortExhausted`] when every candidate is taken.
pub fn allocate_admin_port(name: &str, ports: &[ExternalServicePort]) -> Result<u16, ConfigError> {
    let disallowed: HashSet<i32> = ports
        .iter()
        .filter(|p| p.protocol() == Protocol::Tcp)
        .map(|p| p.port)
        .collect();

    (ADMIN_PORT_RANGE_START..ADMIN_PORT_RANGE_END)
        .find(|candidate| !disallowed.contains(&i32::from(*candidate)))
        .ok_or_else(|| ConfigError::AdminPortExhausted {
            name: name.to_string(),
            start: ADMIN_PORT_RANGE_START,
            end: ADMIN_PORT_RANGE_END,
        })
}

#[cfg(test)]
#[path = "ports_tests.rs"]
mod ports_tests;
