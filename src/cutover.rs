// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS hijack cutover state.
//!
//! The gateway `Service` carries `egress.monzo.com/hijack-dns` with one of
//! three values. The DNS plane reads this label to decide whether clients are
//! being redirected, so transitions are gated on gateway readiness and never
//! revert from `true` on unreadiness alone.

use std::fmt;
use std::str::FromStr;

/// Value of the cutover label on a gateway `Service`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CutoverState {
    /// Hijacking disabled
    Disabled,
    /// Hijacking requested, no gateway pod ready yet
    WaitingForPods,
    /// Hijacking active
    Active,
}

impl CutoverState {
    /// Label value written to the `Service`.
    #[must_use]
    pub fn as_label(self) -> &'static str {
        match self {
            CutoverState::Disabled => "false",
            CutoverState::WaitingForPods => "waiting-for-pods",
            CutoverState::Active => "true",
        }
    }

    /// Parse a stored label value. Unrecognised values are treated as absent.
    #[must_use]
    pub fn from_label(value: Option<&str>) -> Option<Self> {
        value.and_then(|v| v.parse().ok())
    }
}

impl fmt::Display for CutoverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

impl FromStr for CutoverState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "false" => Ok(CutoverState::Disabled),
            "waiting-for-pods" => Ok(CutoverState::WaitingForPods),
            "true" => Ok(CutoverState::Active),
            other => Err(format!("unknown cutover state '{other}'")),
        }
    }
}

/// Decide the next cutover state.
///
/// * `hijack_enabled` - the `ExternalService`'s `hijackDns` flag
/// * `ready` - the gateway `Deployment` has at least one ready replica
/// * `previous` - state read off the stored `Service`, `None` on creation
#[must_use]
pub fn next_state(
    hijack_enabled: bool,
    ready: bool,
    previous: Option<CutoverState>,
) -> CutoverState {
    if !hijack_enabled {
        return CutoverState::Disabled;
    }
    if ready {
        return CutoverState::Active;
    }

    match previous {
        // Once active, stay active through transient unreadiness
        Some(CutoverState::Active) => CutoverState::Active,
        None | Some(CutoverState::Disabled | CutoverState::WaitingForPods) => {
            CutoverState::WaitingForPods
        }
    }
}

#[cfg(test)]
#[path = "cutover_tests.rs"]
mod cutover_tests;
