// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS-plane startup directive.
//!
//! ```text
//! # namespace zone
//! egressoperator egress-operator-system cluster.local {
//!     kubeconfig /etc/kube/config staging
//! }
//! ```
//!
//! The block is optional. A namespace of `*` watches gateway `Service`s in all
//! namespaces. Without a `kubeconfig` property the client is inferred from the
//! environment (in-cluster service account or the default kubeconfig).

use crate::constants::DNS_PLUGIN_NAME;
use crate::errors::DirectiveError;
use anyhow::{Context as _, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Namespace value selecting every namespace.
pub const ALL_NAMESPACES: &str = "*";

/// Explicit kubeconfig selection from the directive block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KubeconfigOverride {
    pub path: PathBuf,
    pub context: Option<String>,
}

/// Parsed startup directive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Directive {
    /// Namespace to watch, `None` for all namespaces
    pub namespace: Option<String>,
    /// Cluster DNS zone used to derive gateway target names
    pub zone: String,
    pub kubeconfig: Option<KubeconfigOverride>,
}

impl Directive {
    /// Read and parse a directive file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not parse.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read directive {}", path.display()))?;
        let directive = text
            .parse()
            .with_context(|| format!("invalid directive in {}", path.display()))?;
        debug!(path = %path.display(), directive = ?directive, "Loaded DNS directive");
        Ok(directive)
    }

    /// Build a Kubernetes client honouring the kubeconfig override.
    ///
    /// # Errors
    ///
    /// Returns an error if the kubeconfig cannot be loaded or no client can be
    /// inferred.
    pub async fn client(&self) -> Result<Client> {
        let Some(kubeconfig) = &self.kubeconfig else {
            return Client::try_default()
                .await
                .context("failed to infer Kubernetes client");
        };

        let file = Kubeconfig::read_from(&kubeconfig.path)
            .with_context(|| format!("failed to read kubeconfig {}", kubeconfig.path.display()))?;
        let options = KubeConfigOptions {
            context: kubeconfig.context.clone(),
            ..KubeConfigOptions::default()
        };
        let config = Config::from_custom_kubeconfig(file, &options)
            .await
            .context("failed to load kubeconfig")?;
        Client::try_from(config).context("failed to build Kubernetes client")
    }
}

impl FromStr for Directive {
    type Err = DirectiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_directive(s)
    }
}

fn tokenize(input: &str) -> Vec<String> {
    input
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default())
        .flat_map(|line| {
            line.replace('{', " { ")
                .replace('}', " } ")
                .split_whitespace()
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Parse a directive string.
///
/// # Errors
///
/// Returns a [`DirectiveError`] describing the first problem found.
pub fn parse_directive(input: &str) -> Result<Directive, DirectiveError> {
    let tokens = tokenize(input);
    let mut tokens = tokens.iter().map(String::as_str).peekable();

    match tokens.next() {
        None => {
            return Err(DirectiveError::Empty {
                expected: DNS_PLUGIN_NAME,
            })
        }
        Some(DNS_PLUGIN_NAME) => {}
        Some(other) => {
            return Err(DirectiveError::WrongPlugin {
                found: other.to_string(),
                expected: DNS_PLUGIN_NAME,
            })
        }
    }

    let mut positional = Vec::new();
    while let Some(token) = tokens.next_if(|t| *t != "{") {
        if positional.len() == 2 {
            return Err(DirectiveError::UnexpectedArgument(token.to_string()));
        }
        positional.push(token);
    }

    let namespace = *positional.first().ok_or(DirectiveError::MissingArgument {
        argument: "namespace",
    })?;
    let zone = *positional
        .get(1)
        .ok_or(DirectiveError::MissingArgument { argument: "zone" })?;

    let mut kubeconfig = None;
    if tokens.next() == Some("{") {
        loop {
            match tokens.next() {
                None => return Err(DirectiveError::UnterminatedBlock),
                Some("}") => break,
                Some("kubeconfig") => {
                    let path = tokens
                        .next_if(|t| *t != "}")
                        .ok_or_else(|| DirectiveError::MissingValue("kubeconfig".to_string()))?;
                    let context = tokens.next_if(|t| *t != "}").map(str::to_string);
                    kubeconfig = Some(KubeconfigOverride {
                        path: PathBuf::from(path),
                        context,
                    });
                }
                Some(other) => return Err(DirectiveError::UnknownProperty(other.to_string())),
            }
        }
    }

    if let Some(extra) = tokens.next() {
        return Err(DirectiveError::UnexpectedArgument(extra.to_string()));
    }

    Ok(Directive {
        namespace: (namespace != ALL_NAMESPACES).then(|| namespace.to_string()),
        zone: zone.trim_end_matches('.').to_string(),
        kubeconfig,
    })
}

#[cfg(test)]
#[path = "directive_tests.rs"]
mod directive_tests;
