// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Live query rewriting against the current rule set.
//!
//! The rule set sits in an [`ArcSwap`] slot: the fleet watcher publishes a new
//! immutable `Vec` on every recomputation and query handlers load whichever set
//! is current without blocking each other or the writer.

use crate::dns::rules::{NextAction, RewriteRule};
use crate::metrics::record_rewrite_rules;
use arc_swap::ArcSwap;
use hickory_proto::op::Message;
use hickory_proto::rr::{Name, Record};
use std::sync::Arc;
use tracing::{debug, info};

/// Holder of the active rewrite rules.
pub struct QueryRewriter {
    rules: ArcSwap<Vec<RewriteRule>>,
}

impl Default for QueryRewriter {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryRewriter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rules: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Replace the active rule set.
    pub fn set_rules(&self, rules: Vec<RewriteRule>) {
        info!(rules = rules.len(), "Activating DNS rewrite rules");
        record_rewrite_rules(rules.len());
        self.rules.store(Arc::new(rules));
    }

    /// Snapshot of the active rule set.
    #[must_use]
    pub fn rules(&self) -> Arc<Vec<RewriteRule>> {
        self.rules.load_full()
    }

    /// Rewrite the first question of `message` in place.
    ///
    /// Returns what was applied so the response can be mapped back, or `None`
    /// when no rule matched.
    pub fn rewrite_query(&self, message: &mut Message) -> Option<AppliedRewrite> {
        let rules = self.rules.load();
        let mut queries = message.take_queries();

        let applied = queries.first_mut().and_then(|query| {
            let original = query.name().clone();
            let mut current = original.clone();
            let mut matched = Vec::new();

            for rule in rules.iter() {
                if !rule.matches_question(&current) {
                    continue;
                }
                current = rule.to().clone();
                matched.push(rule.clone());
                if rule.next_action() == NextAction::Stop {
                    break;
                }
            }

            if matched.is_empty() {
                return None;
            }
            debug!(from = %original, to = %current, "Rewrote DNS question");
            query.set_name(current);
            Some(AppliedRewrite {
                original,
                rules: matched,
            })
        });

        message.add_queries(queries);
        applied
    }
}

/// Record of a question rewrite, used to restore the response.
#[derive(Clone, Debug)]
pub struct AppliedRewrite {
    original: Name,
    rules: Vec<RewriteRule>,
}

impl AppliedRewrite {
    /// Name the client originally asked for.
    #[must_use]
    pub fn original(&self) -> &Name {
        &self.original
    }

    /// Rules applied, in application order.
    #[must_use]
    pub fn rules(&self) -> &[RewriteRule] {
        &self.rules
    }

    /// Undo the rewrite on a response.
    ///
    /// The question goes back to the name the client sent and every answer,
    /// authority and additional record named after a rewrite target is renamed
    /// to the corresponding source.
    pub fn restore(&self, message: &mut Message) {
        let mut queries = message.take_queries();
        if let Some(query) = queries.first_mut() {
            query.set_name(self.original.clone());
        }
        message.add_queries(queries);

        let answers = self.restore_records(message.take_answers());
        message.insert_answers(answers);
        let authority = self.restore_records(message.take_name_servers());
        message.insert_name_servers(authority);
        let additionals = self.restore_records(message.take_additionals());
        message.insert_additionals(additionals);
    }

    fn restore_records(&self, mut records: Vec<Record>) -> Vec<Record> {
        for record in &mut records {
            if let Some(name) = self.restore_name(record.name()) {
                record.set_name(name);
            }
        }
        records
    }

    // Walk the applied rules backwards so chained rewrites unwind in order
    fn restore_name(&self, name: &Name) -> Option<Name> {
        let mut restored: Option<Name> = None;
        for rule in self.rules.iter().rev() {
            let candidate = restored.as_ref().unwrap_or(name);
            if rule.matches_response(candidate) {
                restored = Some(rule.from().clone());
            }
        }
        restored
    }
}

#[cfg(test)]
#[path = "rewriter_tests.rs"]
mod rewriter_tests;
