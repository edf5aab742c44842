//! Unit tests for message dispatch.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rstest::{fixture, rstest};

use super::*;
use crate::error::EndpointError;
use crate::tests::{QueueFaucet, RecordingSink, telegram};

struct Bench {
    router: Router,
    default: RecordingSink,
}

#[fixture]
fn bench() -> Bench {
    let default = RecordingSink::default();
    Bench {
        router: Router::new(default.handle()),
        default,
    }
}

impl Bench {
    fn sink(&mut self, name: &str) -> RecordingSink {
        let sink = RecordingSink::default();
        self.router.add_sink(name, sink.handle());
        sink
    }

    fn faucet(&mut self, name: &str) -> QueueFaucet {
        let faucet = QueueFaucet::default();
        self.router.add_faucet(name, faucet.handle());
        faucet
    }
}

#[rstest]
#[case::specific_first(true)]
#[case::general_first(false)]
fn more_specific_rule_wins_regardless_of_order(mut bench: Bench, #[case] specific_first: bool) {
    let specific = Rule::new("sink1", [("media", "telegram"), ("user", "123456")]).expect("rule");
    let general = Rule::new("sink2", [("media", "telegram")]).expect("rule");
    if specific_first {
        bench.router.add_rule(specific, "test");
        bench.router.add_rule(general, "test");
    } else {
        bench.router.add_rule(general, "test");
        bench.router.add_rule(specific, "test");
    }
    let sink1 = bench.sink("sink1");
    let sink2 = bench.sink("sink2");
    let faucet = bench.faucet("test");

    faucet.push(telegram("123456", "hi"));
    bench.router.tick().expect("tick");

    assert_eq!(sink1.count(), 1);
    assert_eq!(sink2.count(), 0);
    assert_eq!(bench.default.count(), 0);
}

#[rstest]
fn equal_specificity_keeps_registration_order(mut bench: Bench) {
    bench
        .router
        .add_rule(Rule::new("first", [("media", "telegram")]).expect("rule"), "test");
    bench
        .router
        .add_rule(Rule::new("second", [("user", "1")]).expect("rule"), "test");
    bench.router.add_rule(Rule::catch_all("fallback").expect("rule"), "test");
    let first = bench.sink("first");
    bench.sink("second");

    let targets: Vec<usize> = bench
        .router
        .rules_for("test")
        .iter()
        .map(Rule::specificity)
        .collect();
    assert_eq!(targets, vec![1, 1, 0]);
    assert_eq!(
        bench.router.route("test", &telegram("1", "x")),
        Route::Named("first".into())
    );

    let faucet = bench.faucet("test");
    faucet.push(telegram("1", "x"));
    bench.router.tick().expect("tick");
    assert_eq!(first.count(), 1);
}

#[rstest]
fn explicit_destination_overrides_rules(mut bench: Bench) {
    bench
        .router
        .add_rule(Rule::catch_all("ruled").expect("rule"), "test");
    let ruled = bench.sink("ruled");
    let direct = bench.sink("direct");
    let faucet = bench.faucet("test");

    faucet.push(telegram("1", "x").with_destination("direct"));
    bench.router.tick().expect("tick");

    assert_eq!(direct.count(), 1);
    assert_eq!(ruled.count(), 0);
}

#[rstest]
fn unknown_destination_without_factory_uses_default(mut bench: Bench) {
    let faucet = bench.faucet("test");
    faucet.push(telegram("1", "x").with_destination("nowhere"));

    let report = bench.router.tick().expect("tick");

    assert_eq!(report.delivered, 1);
    assert_eq!(bench.default.count(), 1);
    assert_eq!(
        bench.router.route("test", &telegram("1", "x").with_destination("nowhere")),
        Route::Default
    );
}

#[rstest]
fn unmatched_message_uses_default(mut bench: Bench) {
    bench
        .router
        .add_rule(Rule::new("tg", [("media", "telegram")]).expect("rule"), "test");
    bench.sink("tg");
    let faucet = bench.faucet("test");
    faucet.push(Message::new().with_origin([("media", "irc")]));

    bench.router.tick().expect("tick");
    assert_eq!(bench.default.count(), 1);
}

#[rstest]
fn factory_is_called_once_and_its_sink_receives_the_message(mut bench: Bench) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let created = RecordingSink::default();
    let factory_calls = Arc::clone(&calls);
    let factory_sink = created.clone();
    bench.router.add_sink_factory(move |router, destination| {
        factory_calls
            .lock()
            .expect("calls lock")
            .push(destination.to_owned());
        router.add_sink(destination, factory_sink.handle());
    });
    let faucet = bench.faucet("test");

    faucet.push(telegram("1", "x").with_destination("X"));
    bench.router.tick().expect("tick");

    assert_eq!(*calls.lock().expect("calls lock"), vec![String::from("X")]);
    assert_eq!(created.count(), 1);
    assert_eq!(bench.default.count(), 0);
    assert!(bench.router.has_sink("X"));

    faucet.push(telegram("1", "y").with_destination("X"));
    bench.router.tick().expect("tick");
    assert_eq!(calls.lock().expect("calls lock").len(), 1);
    assert_eq!(created.count(), 2);
}

#[rstest]
fn factory_that_creates_nothing_falls_back_to_default(mut bench: Bench) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    bench.router.add_sink_factory(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let faucet = bench.faucet("test");

    faucet.push(telegram("1", "x").with_destination("ghost"));
    faucet.push(telegram("1", "y").with_destination("ghost"));
    bench.router.tick().expect("tick");

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(bench.default.count(), 2);
}

#[rstest]
fn factory_may_register_faucets_without_disturbing_the_pass(mut bench: Bench) {
    let late = QueueFaucet::default();
    late.push(telegram("2", "late"));
    let late_faucet = late.clone();
    bench.router.add_sink_factory(move |router, destination| {
        router.add_sink(destination, RecordingSink::default().handle());
        router.add_faucet("late", late_faucet.handle());
    });
    let faucet = bench.faucet("early");
    faucet.push(telegram("1", "x").with_destination("fresh"));

    let first = bench.router.tick().expect("first tick");
    assert_eq!(first.delivered, 1);
    assert!(bench.router.has_faucet("late"));

    let second = bench.router.tick().expect("second tick");
    assert_eq!(second.delivered, 1);
    assert_eq!(bench.default.count(), 1);
}

#[rstest]
#[case::by_name(true)]
#[case::by_reference(false)]
fn removed_faucet_stops_delivering(mut bench: Bench, #[case] by_name: bool) {
    let kept = bench.faucet("kept");
    let removed = QueueFaucet::default();
    let removed_handle = removed.handle();
    bench.router.add_faucet("gone", removed_handle.clone());

    if by_name {
        assert!(bench.router.remove_faucet_by_name("gone").is_some());
    } else {
        assert_eq!(
            bench.router.remove_faucet_by_reference(&removed_handle),
            Some(String::from("gone"))
        );
    }
    kept.push(telegram("1", "kept"));
    removed.push(telegram("1", "gone"));
    bench.router.tick().expect("tick");

    let delivered = bench.default.messages();
    assert_eq!(delivered, vec![telegram("1", "kept")]);
    assert!(!bench.router.has_faucet("gone"));
    assert_eq!(bench.router.faucet_names().collect::<Vec<_>>(), vec!["kept"]);
}

#[rstest]
fn sinks_are_removed_by_name_or_reference(mut bench: Bench) {
    let a = bench.sink("a");
    let b = bench.sink("b");
    let removed = bench.router.remove_sink_by_name("b").expect("sink b");
    assert!(!b.is_closed());
    removed.close();
    assert!(b.is_closed());

    let handle = a.handle();
    bench.router.add_sink("a2", handle.clone());
    assert_eq!(
        bench.router.remove_sink_by_reference(&handle),
        Some(String::from("a2"))
    );
    assert_eq!(bench.router.sink_names().collect::<Vec<_>>(), vec!["a"]);
}

#[rstest]
fn default_sink_cannot_be_removed(mut bench: Bench) {
    let default_handle = bench.router.default_sink().clone();
    assert_eq!(bench.router.remove_sink_by_reference(&default_handle), None);
    assert!(bench.router.remove_sink_by_name("default").is_none());

    let faucet = bench.faucet("test");
    faucet.push(telegram("1", "x"));
    bench.router.tick().expect("tick");
    assert_eq!(bench.default.count(), 1);
}

#[rstest]
fn malformed_lines_are_counted_and_skipped(mut bench: Bench) {
    let faucet = bench.faucet("test");
    faucet.push(telegram("1", "before"));
    faucet.push_error(EndpointError::malformed(b"{oops", "expected value"));
    faucet.push(telegram("1", "after"));
    let other = bench.faucet("zz-other");
    other.push(telegram("2", "other"));

    let report = bench.router.tick().expect("tick");

    assert_eq!(
        report,
        TickReport {
            delivered: 3,
            malformed: 1
        }
    );
    assert_eq!(bench.default.count(), 3);
}

#[rstest]
fn closed_faucet_is_reported_by_name(mut bench: Bench) {
    let faucet = bench.faucet("tg");
    faucet.push_error(EndpointError::closed("end of stream"));

    let error = bench.router.tick().expect_err("closed faucet");

    assert!(error.is_closed());
    assert!(matches!(error, RouterError::Faucet { ref name, .. } if name == "tg"));
}

#[rstest]
fn failing_sink_is_reported_by_route(mut bench: Bench) {
    let sink = bench.sink("brain");
    sink.hang_up();
    let faucet = bench.faucet("tg");
    faucet.push(telegram("1", "x").with_destination("brain"));

    let error = bench.router.tick().expect_err("closed sink");

    assert!(
        matches!(&error, RouterError::Sink { route: Route::Named(name), .. } if name == "brain"),
        "unexpected error: {error}"
    );
}

#[rstest]
fn replacing_the_default_sink_redirects_fallback(mut bench: Bench) {
    let replacement = RecordingSink::default();
    let handle = replacement.handle();
    let previous = bench.router.replace_default_sink(handle.clone());
    assert!(!previous.same_as(&handle));
    assert!(bench.router.default_sink().same_as(&handle));

    let faucet = bench.faucet("test");
    faucet.push(telegram("1", "x"));
    bench.router.tick().expect("tick");
    assert_eq!(replacement.count(), 1);
    assert_eq!(bench.default.count(), 0);
}
