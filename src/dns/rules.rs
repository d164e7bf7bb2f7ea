// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Rewrite rules derived from the gateway fleet.
//!
//! Each gateway `Service` annotated with `egress.monzo.com/dns-name` yields one
//! exact-match rule: questions for the external name are rewritten to the
//! gateway's in-cluster name, and answers for the in-cluster name are rewritten
//! back so the caller never sees the redirection.

use crate::labels::DNS_NAME_ANNOTATION;
use anyhow::{Context as _, Result};
use hickory_proto::rr::Name;
use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, warn};

/// What happens after a rule matched a question.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NextAction {
    /// No further rules are evaluated
    Stop,
    /// Following rules see the rewritten name
    Continue,
}

/// One immutable question/answer rewrite.
#[derive(Clone, Debug)]
pub struct RewriteRule {
    from: Name,
    to: Name,
    response_pattern: Regex,
    next_action: NextAction,
}

impl RewriteRule {
    /// Build a rule rewriting `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns an error if either name is not a valid domain name.
    pub fn new(from: &str, to: &str, next_action: NextAction) -> Result<Self> {
        let from = normalize(from).with_context(|| format!("invalid source name '{from}'"))?;
        let to = normalize(to).with_context(|| format!("invalid target name '{to}'"))?;
        let response_pattern = Regex::new(&format!("(?i)^{}$", regex::escape(&to.to_ascii())))
            .with_context(|| format!("invalid response pattern for '{to}'"))?;

        Ok(Self {
            from,
            to,
            response_pattern,
            next_action,
        })
    }

    #[must_use]
    pub fn from(&self) -> &Name {
        &self.from
    }

    #[must_use]
    pub fn to(&self) -> &Name {
        &self.to
    }

    #[must_use]
    pub fn next_action(&self) -> NextAction {
        self.next_action
    }

    /// `true` when a question for `name` should be rewritten.
    #[must_use]
    pub fn matches_question(&self, name: &Name) -> bool {
        normalize_name(name) == self.from
    }

    /// `true` when a response record named `name` should be rewritten back.
    #[must_use]
    pub fn matches_response(&self, name: &Name) -> bool {
        let mut name = name.clone();
        name.set_fqdn(true);
        self.response_pattern.is_match(&name.to_ascii())
    }
}

/// Normalize a domain name to lowercase fully-qualified form.
///
/// # Errors
///
/// Returns an error if `name` is not a valid domain name.
pub fn normalize(name: &str) -> Result<Name> {
    let parsed = Name::from_ascii(name.trim())?;
    Ok(normalize_name(&parsed))
}

fn normalize_name(name: &Name) -> Name {
    let mut normalized = name.to_lowercase();
    normalized.set_fqdn(true);
    normalized
}

/// In-cluster DNS name of a gateway `Service`.
#[must_use]
pub fn target_name(service: &str, namespace: &str, zone: &str) -> String {
    format!("{service}.{namespace}.svc.{}", zone.trim_end_matches('.'))
}

/// Compile the full rule set from a fleet snapshot.
///
/// Members are ordered by namespace and name so the output does not depend on
/// watch delivery order. Members missing the source-name annotation or
/// producing an invalid name are skipped with a warning.
#[must_use]
pub fn compile_rules(members: &[Arc<Service>], zone: &str) -> Vec<RewriteRule> {
    let mut members: Vec<&Service> = members.iter().map(AsRef::as_ref).collect();
    members.sort_by(|a, b| {
        (a.namespace(), a.name_any()).cmp(&(b.namespace(), b.name_any()))
    });

    let rules: Vec<RewriteRule> = members
        .into_iter()
        .filter_map(|svc| compile_member(svc, zone))
        .collect();

    debug!(rules = rules.len(), zone = %zone, "Compiled DNS rewrite rules");
    rules
}

fn compile_member(svc: &Service, zone: &str) -> Option<RewriteRule> {
    let name = svc.name_any();
    let Some(namespace) = svc.namespace() else {
        warn!(service = %name, "Gateway service has no namespace, skipping");
        return None;
    };
    let Some(from) = svc.annotations().get(DNS_NAME_ANNOTATION) else {
        warn!(
            service = %name,
            namespace = %namespace,
            "Gateway service is missing the {} annotation",
            DNS_NAME_ANNOTATION
        );
        return None;
    };

    let to = target_name(&name, &namespace, zone);
    match RewriteRule::new(from, &to, NextAction::Stop) {
        Ok(rule) => Some(rule),
        Err(e) => {
            warn!(
                service = %name,
                namespace = %namespace,
                error = %format!("{e:#}"),
                "Dropping rewrite rule"
            );
            None
        }
    }
}

#[cfg(test)]
#[path = "rules_tests.rs"]
mod rules_tests;
