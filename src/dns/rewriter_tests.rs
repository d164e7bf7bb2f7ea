// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `rewriter.rs`

#[cfg(test)]
mod tests {
    use crate::dns::rewriter::QueryRewriter;
    use crate::dns::rules::{NextAction, RewriteRule};
    use hickory_proto::op::{Message, MessageType, Query};
    use hickory_proto::rr::rdata::{A, CNAME};
    use hickory_proto::rr::{Name, RData, Record, RecordType};
    use std::sync::Arc;

    fn name(s: &str) -> Name {
        Name::from_ascii(s).unwrap()
    }

    fn query(qname: &str) -> Message {
        let mut message = Message::new();
        message
            .set_id(4242)
            .set_message_type(MessageType::Query)
            .add_query(Query::query(name(qname), RecordType::A));
        message
    }

    fn rule(from: &str, to: &str) -> RewriteRule {
        RewriteRule::new(from, to, NextAction::Stop).unwrap()
    }

    fn rewriter_with(rules: Vec<RewriteRule>) -> QueryRewriter {
        let rewriter = QueryRewriter::new();
        rewriter.set_rules(rules);
        rewriter
    }

    #[test]
    fn test_question_rewritten_to_gateway() {
        let rewriter = rewriter_with(vec![rule("api.example.com", "svc1.ns1.svc.cluster.local")]);
        let mut message = query("api.example.com.");

        let applied = rewriter.rewrite_query(&mut message).unwrap();

        assert_eq!(
            message.queries()[0].name().to_ascii(),
            "svc1.ns1.svc.cluster.local."
        );
        assert_eq!(applied.original().to_ascii(), "api.example.com.");
        assert_eq!(applied.rules().len(), 1);
    }

    #[test]
    fn test_unmatched_question_passes_through() {
        let rewriter = rewriter_with(vec![rule("api.example.com", "svc1.ns1.svc.cluster.local")]);
        let mut message = query("other.example.com.");

        assert!(rewriter.rewrite_query(&mut message).is_none());
        assert_eq!(message.queries()[0].name().to_ascii(), "other.example.com.");
    }

    #[test]
    fn test_response_names_restored() {
        let rewriter = rewriter_with(vec![rule("api.example.com", "svc1.ns1.svc.cluster.local")]);
        let mut message = query("Api.Example.com.");
        let applied = rewriter.rewrite_query(&mut message).unwrap();

        let mut response = message.clone();
        response.set_message_type(MessageType::Response);
        response.add_answer(Record::from_rdata(
            name("svc1.ns1.svc.cluster.local."),
            30,
            RData::A(A::new(10, 0, 0, 12)),
        ));
        response.add_answer(Record::from_rdata(
            name("unrelated.example.org."),
            30,
            RData::A(A::new(10, 0, 0, 13)),
        ));

        applied.restore(&mut response);

        assert_eq!(response.queries()[0].name().to_ascii(), "Api.Example.com.");
        assert_eq!(response.answers()[0].name().to_ascii(), "api.example.com.");
        assert_eq!(response.answers()[1].name().to_ascii(), "unrelated.example.org.");

        // Question case survives encoding
        let wire = Message::from_vec(&response.to_vec().unwrap()).unwrap();
        assert_eq!(wire.queries()[0].name().to_ascii(), "Api.Example.com.");
    }

    #[test]
    fn test_first_matching_rule_stops_processing() {
        let rewriter = rewriter_with(vec![
            rule("api.example.com", "first.ns1.svc.cluster.local"),
            rule("api.example.com", "second.ns1.svc.cluster.local"),
        ]);
        let mut message = query("api.example.com.");

        let applied = rewriter.rewrite_query(&mut message).unwrap();
        assert_eq!(applied.rules().len(), 1);
        assert_eq!(
            message.queries()[0].name().to_ascii(),
            "first.ns1.svc.cluster.local."
        );
    }

    #[test]
    fn test_continue_chains_and_unwinds() {
        let rewriter = rewriter_with(vec![
            RewriteRule::new("a.example.com", "b.example.com", NextAction::Continue).unwrap(),
            rule("b.example.com", "svc.ns.svc.cluster.local"),
        ]);
        let mut message = query("a.example.com.");
        let applied = rewriter.rewrite_query(&mut message).unwrap();
        assert_eq!(
            message.queries()[0].name().to_ascii(),
            "svc.ns.svc.cluster.local."
        );

        let mut response = message.clone();
        response.add_answer(Record::from_rdata(
            name("svc.ns.svc.cluster.local."),
            5,
            RData::CNAME(CNAME(name("other.example.net."))),
        ));
        applied.restore(&mut response);
        assert_eq!(response.answers()[0].name().to_ascii(), "a.example.com.");
    }

    #[test]
    fn test_swap_is_visible_to_later_queries() {
        let rewriter = Arc::new(QueryRewriter::new());
        let mut before = query("api.example.com.");
        assert!(rewriter.rewrite_query(&mut before).is_none());

        let snapshot = rewriter.rules();
        rewriter.set_rules(vec![rule("api.example.com", "svc1.ns1.svc.cluster.local")]);

        let mut after = query("api.example.com.");
        assert!(rewriter.rewrite_query(&mut after).is_some());
        assert!(snapshot.is_empty(), "held snapshots are never mutated");
        assert_eq!(rewriter.rules().len(), 1);
    }

    #[test]
    fn test_concurrent_readers_during_swaps() {
        let rewriter = Arc::new(rewriter_with(vec![rule(
            "api.example.com",
            "svc1.ns1.svc.cluster.local",
        )]));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let rewriter = Arc::clone(&rewriter);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let mut message = query("api.example.com.");
                        if let Some(applied) = rewriter.rewrite_query(&mut message) {
                            assert_eq!(applied.rules().len(), 1);
                        }
                    }
                })
            })
            .collect();

        for i in 0..100 {
            let rules = if i % 2 == 0 {
                Vec::new()
            } else {
                vec![rule("api.example.com", "svc1.ns1.svc.cluster.local")]
            };
            rewriter.set_rules(rules);
        }

        for reader in readers {
            reader.join().unwrap();
        }
    }
}
