//! End-to-end runs through the engine against an in-memory store

use serde_json::{json, Value};
use signal_engine::{
    Action, Chain, Engine, EngineConfig, MutationKind, Outcome, SignalError, StatePath,
    StateStore, StepErrorPolicy, TraceNode, TreeStore,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

fn engine() -> (Engine, Arc<TreeStore>) {
    engine_with(EngineConfig::default())
}

fn engine_with(config: EngineConfig) -> (Engine, Arc<TreeStore>) {
    let store = Arc::new(TreeStore::new());
    (Engine::new(store.clone(), config), store)
}

fn policy(on_step_error: StepErrorPolicy) -> EngineConfig {
    EngineConfig {
        on_step_error,
        ..EngineConfig::default()
    }
}

/// Sync step that appends its name to `order` in the store
fn marker(name: &'static str) -> Action {
    Action::sync(name, move |_, state| {
        state.push("order", name)?;
        Ok(Outcome::next())
    })
}

/// Async step that sleeps, then takes `success`
fn delayed(name: &'static str, millis: u64) -> Action {
    Action::asynchronous(name, move |_, _| async move {
        sleep(Duration::from_millis(millis)).await;
        Ok(Outcome::success(json!({ name: true })))
    })
}

fn failing(name: &'static str) -> Action {
    Action::sync(name, |_, _| Err(anyhow::anyhow!("card declined")))
}

// ============================================================================
// Sequential runs
// ============================================================================

#[tokio::test]
async fn test_sync_steps_see_each_other() {
    let (engine, store) = engine();
    let sync1 = Action::sync("sync1", |_, state| {
        state.set("hello", "world")?;
        Ok(Outcome::next())
    });
    let sync2 = Action::sync("sync2", |_, state| {
        assert_eq!(state.get("hello"), Some(json!("world")));
        state.set("hello", "planet")?;
        Ok(Outcome::next())
    });

    let signal = engine.create("greet", &[sync1.into(), sync2.into()]).unwrap();
    let trace = signal.run(&()).await.unwrap();

    assert_eq!(store.get(&StatePath::from("hello")), Some(json!("planet")));
    assert!(!trace.is_executing);
    assert!(trace.duration.is_some());
    assert!(trace.records().iter().all(|r| r.run.has_executed && !r.run.is_executing));
}

#[tokio::test]
async fn test_payloads_merge_into_args() {
    let (engine, _) = engine();
    let first = Action::sync("first", |_, _| Ok(Outcome::next().with("a", 1).with("b", 1)));
    let second = Action::sync("second", |args, _| {
        assert_eq!(args["a"], json!(1));
        Ok(Outcome::with_payload(json!({"b": 2})))
    });

    let signal = engine.create("merge", &[first.into(), second.into()]).unwrap();
    let trace = signal.run(&json!({"input": "x"})).await.unwrap();

    assert_eq!(trace.args["input"], json!("x"));
    assert_eq!(trace.args["a"], json!(1));
    assert_eq!(trace.args["b"], json!(2));

    let second = trace.find("second").unwrap();
    assert_eq!(second.run.args.as_ref().unwrap()["b"], json!(1));
    assert_eq!(second.run.output, Some(json!({"b": 2})));
}

#[tokio::test]
async fn test_outputs_choose_the_next_list() {
    let (engine, store) = engine();
    let check = Action::sync("check", |args, _| {
        if args["amount"].as_u64().unwrap_or(0) > 100 {
            Ok(Outcome::path("review"))
        } else {
            Ok(Outcome::path("approve"))
        }
    })
    .with_outputs(["approve", "review"]);

    let signal = engine
        .create(
            "payment",
            &[
                check.into(),
                Chain::paths([
                    ("approve", vec![marker("approved").into()]),
                    ("review", vec![marker("flagged").into()]),
                ]),
                marker("done").into(),
            ],
        )
        .unwrap();

    let trace = signal.run(&json!({"amount": 500})).await.unwrap();
    assert_eq!(store.get(&"order".into()), Some(json!(["flagged", "done"])));

    let check = trace.find("check").unwrap();
    assert_eq!(check.run.output_path.as_deref(), Some("review"));
    assert!(!trace.find("approved").unwrap().run.has_executed);
}

#[tokio::test]
async fn test_default_output() {
    let (engine, store) = engine();
    let lookup = Action::sync("lookup", |_, _| Ok(Outcome::next())).with_default_output("missing");

    let signal = engine
        .create(
            "lookup",
            &[lookup.into(), Chain::paths([("missing", vec![marker("create").into()])])],
        )
        .unwrap();

    let trace = signal.run(&()).await.unwrap();
    assert_eq!(trace.find("lookup").unwrap().run.output_path.as_deref(), Some("missing"));
    assert_eq!(store.get(&"order".into()), Some(json!(["create"])));
}

#[tokio::test]
async fn test_mutations_are_logged_in_call_order() {
    let (engine, _) = engine();
    let step = Action::sync("edit", |_, state| {
        state.set(["cart", "items"], json!([]))?;
        state.push(["cart", "items"], "apple")?;
        state.unshift(["cart", "items"], "pear")?;
        state.merge("cart", json!({"open": true}))?;
        state.apply(["cart", "count"], |_| json!(2))?;
        state.unset(["cart", "open"])?;
        Ok(Outcome::next())
    });

    let signal = engine.create("cart", &[step.into()]).unwrap();
    let trace = signal.run(&()).await.unwrap();

    let mutations = &trace.find("edit").unwrap().run.mutations;
    let names: Vec<MutationKind> = mutations.iter().map(|m| m.name).collect();
    assert_eq!(
        names,
        vec![
            MutationKind::Set,
            MutationKind::Push,
            MutationKind::Unshift,
            MutationKind::Merge,
            MutationKind::Apply,
            MutationKind::Unset,
        ]
    );
    assert_eq!(mutations[1].path, StatePath::from(["cart", "items"]));
    assert_eq!(mutations[1].args, vec![json!("apple")]);
    assert!(mutations[4].args.is_empty());
}

// ============================================================================
// Concurrent groups
// ============================================================================

#[tokio::test]
async fn test_async_outputs_follow_completion_order() {
    let (engine, store) = engine();

    let signal = engine
        .create(
            "race",
            &[Chain::parallel([
                delayed("asyncA", 10).into(),
                Chain::paths([("success", vec![marker("s1").into()])]),
                delayed("asyncB", 0).into(),
                Chain::paths([("success", vec![marker("s2").into()])]),
            ])],
        )
        .unwrap();

    let trace = signal.run(&()).await.unwrap();

    assert_eq!(store.get(&"order".into()), Some(json!(["s2", "s1"])));
    assert_eq!(trace.args["asyncA"], json!(true));
    assert_eq!(trace.args["asyncB"], json!(true));

    let TraceNode::Group(members) = &trace.branches[0] else {
        panic!("Expected a group, got {:?}", trace.branches[0]);
    };
    assert_eq!(members.len(), 2);
    assert!(members.iter().all(|m| m.is_async && m.run.has_executed));
}

#[tokio::test]
async fn test_group_joins_before_list_continues() {
    let (engine, store) = engine();
    let signal = engine
        .create(
            "fan",
            &[
                marker("before").into(),
                Chain::parallel([
                    delayed("slow", 15).into(),
                    Chain::paths([("success", vec![marker("slow_done").into()])]),
                    delayed("fast", 0).into(),
                ]),
                marker("after").into(),
            ],
        )
        .unwrap();

    signal.run(&()).await.unwrap();
    assert_eq!(
        store.get(&"order".into()),
        Some(json!(["before", "slow_done", "after"]))
    );
}

#[tokio::test]
async fn test_async_steps_read_state() {
    let (engine, _) = engine();
    let seed = Action::sync("seed", |_, state| {
        state.set("user", json!({"name": "ada"}))?;
        Ok(Outcome::next())
    });
    let read = Action::asynchronous("read", |_, state| async move {
        let name = state.get(["user", "name"]).unwrap_or(Value::Null);
        Ok(Outcome::next().with("seen", name))
    });

    let signal = engine
        .create("read", &[seed.into(), Chain::parallel([read.into()])])
        .unwrap();
    let trace = signal.run(&()).await.unwrap();

    assert_eq!(trace.args["seen"], json!("ada"));
    assert!(trace.find("read").unwrap().run.mutations.is_empty());
}

#[tokio::test]
async fn test_async_failure_rejects_run() {
    let (engine, store) = engine();
    let broken = Action::asynchronous("broken", |_, _| async {
        Err::<Outcome, _>(anyhow::anyhow!("upstream unavailable"))
    });

    let signal = engine
        .create(
            "fetch",
            &[Chain::parallel([broken.into()]), marker("after").into()],
        )
        .unwrap();

    let err = signal.run(&()).await.unwrap_err();
    match err {
        SignalError::AsyncStepFailed { step, message, .. } => {
            assert_eq!(step, "broken");
            assert!(message.contains("upstream unavailable"));
        }
        other => panic!("Expected AsyncStepFailed, got {:?}", other),
    }
    assert_eq!(store.get(&"order".into()), None);
    assert!(engine.traces().latest("fetch").is_none());
}

#[tokio::test]
async fn test_rejected_run_is_not_executing() {
    let (engine, _) = engine();
    let broken = Action::asynchronous("broken", |_, _| async {
        Err::<Outcome, _>(anyhow::anyhow!("upstream unavailable"))
    });
    let signal = engine
        .create(
            "fetch",
            &[Chain::parallel([delayed("slow", 50).into(), broken.into()])],
        )
        .unwrap();

    let run = signal.start(&()).unwrap();
    let monitor = run.monitor();
    assert!(run.await.is_err());

    assert!(!monitor.is_executing());
    let snapshot = monitor.snapshot();
    assert!(!snapshot.is_executing);
    assert!(snapshot.duration.is_some());
    assert!(!snapshot.find("slow").unwrap().run.is_executing);
    assert!(!snapshot.find("broken").unwrap().run.is_executing);
}

#[tokio::test]
async fn test_async_step_in_sequence_runs_alone() {
    let (engine, store) = engine();
    let signal = engine
        .create(
            "fetch",
            &[delayed("fetch", 0).into(), marker("after").into()],
        )
        .unwrap();

    let trace = signal.run(&()).await.unwrap();
    assert_eq!(trace.args["fetch"], json!(true));
    assert_eq!(store.get(&"order".into()), Some(json!(["after"])));

    let fetch = trace.find("fetch").unwrap();
    assert!(!fetch.is_async);
    assert_eq!(fetch.run.output_path.as_deref(), Some("success"));
}

#[tokio::test]
async fn test_sync_step_in_group_gets_read_only_state() {
    let (engine, store) = engine();
    let check = Action::sync("check", |_, state| {
        let refused = state.set("flag", true).is_err();
        Ok(Outcome::success(json!({
            "refused": refused,
            "writable": state.is_writable(),
        })))
    })
    .with_outputs(["success", "error"]);

    let signal = engine
        .create(
            "check",
            &[Chain::parallel([
                check.into(),
                Chain::paths([
                    ("success", vec![marker("passed").into()]),
                    ("error", vec![marker("failed").into()]),
                ]),
                delayed("fetch", 5).into(),
            ])],
        )
        .unwrap();

    let trace = signal.run(&()).await.unwrap();
    assert_eq!(trace.args["refused"], json!(true));
    assert_eq!(trace.args["writable"], json!(false));
    assert_eq!(trace.args["fetch"], json!(true));
    assert_eq!(store.get(&"flag".into()), None);
    assert_eq!(store.get(&"order".into()), Some(json!(["passed"])));

    let check = trace.find("check").unwrap();
    assert!(check.is_async);
    assert!(check.run.mutations.is_empty());
}

#[tokio::test]
async fn test_async_undeclared_output_rejects_run() {
    let (engine, _) = engine();
    let step = Action::asynchronous("step", |_, _| async { Ok(Outcome::path("timeout")) })
        .with_outputs(["success"]);

    let signal = engine.create("s", &[Chain::parallel([step.into()])]).unwrap();
    let err = signal.run(&()).await.unwrap_err();
    assert!(matches!(err, SignalError::UndeclaredOutput { ref output, .. } if output == "timeout"));
}

// ============================================================================
// Arguments
// ============================================================================

#[tokio::test]
async fn test_non_serializable_args_are_rejected_before_running() {
    let (engine, store) = engine();
    let signal = engine.create("touch", &[marker("touched").into()]).unwrap();

    let mut args = HashMap::new();
    args.insert((1, 2), "tuple keys do not serialize to JSON objects");

    let err = signal.run(&args).await.unwrap_err();
    assert!(matches!(err, SignalError::InvalidArgs { .. }));
    assert!(err.to_string().contains("touch"));
    assert_eq!(store.snapshot(), json!({}));
}

#[tokio::test]
async fn test_concurrent_runs_do_not_share_bookkeeping() {
    let (engine, _) = engine();
    let echo = Action::asynchronous("echo", |args, _| async move {
        sleep(Duration::from_millis(5)).await;
        Ok(Outcome::next().with("echo", args["value"].clone()))
    });
    let signal = engine.create("echo", &[Chain::parallel([echo.into()])]).unwrap();

    let args_a = json!({"value": "a"});
    let args_b = json!({"value": "b"});
    let (a, b) = tokio::join!(signal.run(&args_a), signal.run(&args_b));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_ne!(a.id, b.id);
    assert_eq!(a.args["echo"], json!("a"));
    assert_eq!(b.args["echo"], json!("b"));
    assert_eq!(engine.traces().traces("echo").len(), 2);
}

// ============================================================================
// Step failure policies
// ============================================================================

#[tokio::test]
async fn test_stall_leaves_run_pending() {
    let (engine, store) = engine();
    let signal = engine
        .create(
            "charge",
            &[marker("begin").into(), failing("charge").into(), marker("end").into()],
        )
        .unwrap();

    let mut run = signal.start(&()).unwrap();
    assert!(timeout(Duration::from_millis(50), &mut run).await.is_err());

    let snapshot = run.snapshot();
    assert!(snapshot.is_executing);
    let charge = snapshot.find("charge").unwrap();
    assert!(charge.run.is_executing);
    assert!(!charge.run.has_executed);
    assert!(!snapshot.find("end").unwrap().run.has_executed);
    assert_eq!(store.get(&"order".into()), Some(json!(["begin"])));
}

#[tokio::test]
async fn test_reject_policy() {
    let (engine, store) = engine_with(policy(StepErrorPolicy::Reject));
    let signal = engine
        .create("charge", &[failing("charge").into(), marker("end").into()])
        .unwrap();

    let err = signal.run(&()).await.unwrap_err();
    match err {
        SignalError::StepFailed { step, position, message, .. } => {
            assert_eq!(step, "charge");
            assert_eq!(position, "[0]");
            assert_eq!(message, "card declined");
        }
        other => panic!("Expected StepFailed, got {:?}", other),
    }
    assert_eq!(store.get(&"order".into()), None);
}

#[tokio::test]
async fn test_error_output_policy() {
    let (engine, store) = engine_with(policy(StepErrorPolicy::ErrorOutput));
    let signal = engine
        .create(
            "charge",
            &[
                failing("charge").into(),
                Chain::paths([("error", vec![marker("refund").into()])]),
                marker("end").into(),
            ],
        )
        .unwrap();

    let trace = signal.run(&()).await.unwrap();
    assert_eq!(store.get(&"order".into()), Some(json!(["refund", "end"])));
    assert_eq!(trace.args["error"], json!("card declined"));

    let charge = trace.find("charge").unwrap();
    assert_eq!(charge.run.output_path.as_deref(), Some("error"));
    assert!(charge.run.has_executed);
}

#[tokio::test]
async fn test_error_output_policy_rejects_without_error_output() {
    let (engine, store) = engine_with(policy(StepErrorPolicy::ErrorOutput));
    let charge = Action::sync("charge", |_, _| Err(anyhow::anyhow!("card declined")))
        .with_outputs(["success"]);
    let signal = engine
        .create("charge", &[charge.into(), marker("end").into()])
        .unwrap();

    let err = signal.run(&()).await.unwrap_err();
    assert!(matches!(err, SignalError::StepFailed { ref step, .. } if step == "charge"));
    assert_eq!(store.get(&"order".into()), None);
}

#[tokio::test]
async fn test_undeclared_sync_output_follows_policy() {
    let (engine, _) = engine_with(policy(StepErrorPolicy::Reject));
    let step = Action::sync("step", |_, _| Ok(Outcome::path("later"))).with_outputs(["now"]);

    let signal = engine.create("s", &[step.into()]).unwrap();
    let err = signal.run(&()).await.unwrap_err();
    assert!(err.to_string().contains("undeclared output 'later'"));
}

// ============================================================================
// Trace log
// ============================================================================

#[tokio::test]
async fn test_completed_traces_are_broadcast() {
    let (engine, _) = engine();
    let mut rx = engine.traces().subscribe();
    let signal = engine.create("ping", &[marker("ping").into()]).unwrap();

    let trace = signal.run(&()).await.unwrap();
    let received = rx.recv().await.unwrap();
    assert_eq!(received.id, trace.id);
    assert_eq!(received.name, "ping");
}

#[tokio::test]
async fn test_spawned_run_can_be_monitored() {
    let (engine, _) = engine();
    let signal = engine
        .create("slow", &[Chain::parallel([delayed("wait", 10).into()])])
        .unwrap();

    let run = signal.start(&()).unwrap();
    let monitor = run.monitor();
    let id = run.id();
    assert!(monitor.is_executing());

    let trace = tokio::spawn(run).await.unwrap().unwrap();
    assert_eq!(trace.id, id.to_string());
    assert!(!monitor.is_executing());
}
