//! Unit tests for routing rules.

use rstest::rstest;
use serde_json::json;

use super::*;

fn telegram_user(user: &str) -> Message {
    Message::new()
        .with_origin([("media", "telegram"), ("user", user)])
        .with_field("text", "hi")
}

#[test]
fn clause_rule_requires_every_clause() {
    let rule = Rule::new("tg", [("media", "test")]).expect("rule");
    let matching = Message::new().with_origin([("media", "test")]);
    assert_eq!(rule.target_for(&matching).as_deref(), Some("tg"));
    assert_eq!(rule.target_for(&telegram_user("123456")), None);
}

#[test]
fn empty_clause_set_matches_anything() {
    let rule = Rule::catch_all("brain").expect("rule");
    assert_eq!(rule.specificity(), 0);
    assert_eq!(
        rule.target_for(&Message::new()).as_deref(),
        Some("brain")
    );
}

#[test]
fn clause_against_missing_origin_does_not_match() {
    let rule = Rule::new("tg", [("media", "telegram")]).expect("rule");
    assert_eq!(rule.target_for(&Message::new()), None);
}

#[rstest]
#[case::number(json!(123_456), true)]
#[case::string(json!("123456"), true)]
#[case::other_number(json!(7), false)]
#[case::null(json!(null), false)]
fn numeric_attributes_compare_by_text(#[case] user: serde_json::Value, #[case] matches: bool) {
    let rule = Rule::new("owner", [("user", "123456")]).expect("rule");
    let message = Message::new().with_origin([("user", user)]);
    assert_eq!(rule.target_for(&message).is_some(), matches);
}

#[test]
fn specificity_counts_clauses() {
    let rule = Rule::new("x", [("a", "1"), ("b", "2"), ("c", "3")]).expect("rule");
    assert_eq!(rule.specificity(), 3);
    let computed = Rule::computed("p:", "user", [("a", "1")]).expect("computed");
    assert_eq!(computed.specificity(), 1);
}

#[test]
fn computed_rule_appends_the_attribute() {
    let rule = Rule::computed("tg:", "user", [("media", "telegram")]).expect("rule");
    assert_eq!(
        rule.target_for(&telegram_user("42")).as_deref(),
        Some("tg:42")
    );
}

#[test]
fn computed_rule_without_attribute_yields_nothing() {
    let rule = Rule::computed("tg:", "chat", [("media", "telegram")]).expect("rule");
    assert_eq!(rule.target_for(&telegram_user("42")), None);
}

#[rstest]
#[case::empty_target(Rule::new("", [("a", "1")]), RuleError::EmptyTarget)]
#[case::empty_key(Rule::new("t", [("", "1")]), RuleError::EmptyClauseKey)]
#[case::duplicate(
    Rule::new("t", [("a", "1"), ("a", "2")]),
    RuleError::DuplicateClause { key: "a".into() }
)]
#[case::empty_prefix(Rule::computed("", "user", [("a", "1")]), RuleError::EmptyTarget)]
#[case::empty_attribute(Rule::computed("p", "", [("a", "1")]), RuleError::EmptyAttribute)]
fn invalid_rules_are_rejected(#[case] built: Result<Rule, RuleError>, #[case] expected: RuleError) {
    assert_eq!(built.expect_err("invalid rule"), expected);
}

#[test]
fn clauses_iterate_in_key_order() {
    let clauses = Clauses::new([("b", "2"), ("a", "1")]).expect("clauses");
    let keys: Vec<_> = clauses.iter().map(|(key, _)| key).collect();
    assert_eq!(keys, vec!["a", "b"]);
    assert_eq!(clauses.len(), 2);
    assert!(!clauses.is_empty());
    assert!(Clauses::default().is_empty());
}
