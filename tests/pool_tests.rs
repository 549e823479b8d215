//! End-to-end pool tests
//!
//! Real workers on loopback TCP, driven through handles and groups.

mod common;

use std::collections::BTreeMap;
use std::time::Duration;

use common::{dead_port, fast_options, TestPool};
use nsworker::client::{Criterion, Resolved, WorkerHandle};
use nsworker::error::Error;
use nsworker::group::{JoinOptions, Operation, Outcome, SelectMode, Selection, WorkerGroup};
use nsworker::script::Value;
use nsworker::server::EngineSettings;

// ─────────────────────────────────────────────────────────────────
// Multi-run
// ─────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sequential_run_captures_member_failure() {
    let pool = TestPool::start(3).await;
    let group = pool.group().await;
    group.handles()[0].set("x", 1).await.unwrap();
    group.handles()[2].set("x", 3).await.unwrap();

    let result = group.run_sequential(&Operation::Get { name: "x".into() }).await;

    assert_eq!(result.len(), 3);
    let outcomes: Vec<&Outcome> = result.iter().map(|(_, o)| o).collect();
    assert_eq!(outcomes[0].value(), Some(&Value::Int(1)));
    assert!(matches!(outcomes[1].error(), Some(Error::NameNotFound { .. })));
    assert_eq!(outcomes[2].value(), Some(&Value::Int(3)));

    let total_calls: u64 = pool.servers.iter().map(|s| s.engine().stats().calls()).sum();
    // Handshake info calls, two sets and three gets
    assert_eq!(total_calls, 3 + 2 + 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_run_pending_then_joined() {
    let pool = TestPool::start(3).await;
    let group = pool.group().await;
    for (handle, delay) in group.iter().zip([0.01, 0.05, 0.2]) {
        handle.set("delay", delay).await.unwrap();
    }

    let run = group.run_parallel(&Operation::evaluate("sleep(delay); delay"));
    let early = run.snapshot();
    assert_eq!(early.len(), 3);
    assert_eq!(early.pending_count(), 3);

    let joined = run
        .join(JoinOptions {
            timeout: Some(Duration::from_millis(300)),
            poll_interval: Duration::from_millis(10),
        })
        .await;
    assert!(joined.is_complete());
    assert_eq!(joined.failed_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_results_keyed_by_endpoint() {
    let pool = TestPool::start(2).await;
    let group = pool.group().await;

    let result = group.run_sequential(&Operation::Ping).await;
    let keys: Vec<String> = result.keys().cloned().collect();
    let expected: Vec<String> = pool.servers.iter().map(|s| s.endpoint().to_string()).collect();
    assert_eq!(keys, expected);
}

// ─────────────────────────────────────────────────────────────────
// Worker lock
// ─────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_exclusive_calls_never_overlap() {
    let pool = TestPool::start(1).await;
    let handle = pool.handle(0).await;
    handle.set("n", 0).await.unwrap();

    let calls: Vec<_> = (0..8)
        .map(|_| {
            let handle = handle.clone();
            tokio::spawn(async move { handle.execute("sleep(0.01); n = n + 1").await })
        })
        .collect();
    for call in calls {
        call.await.unwrap().unwrap();
    }

    assert_eq!(handle.get("n").await.unwrap(), Value::Int(8));
    assert_eq!(pool.servers[0].engine().stats().exclusive_peak(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lock_timeout_reaches_the_caller() {
    let pool = TestPool::start_with(
        1,
        EngineSettings {
            lock_timeout: Duration::from_millis(100),
            ..Default::default()
        },
    )
    .await;
    let handle = pool.handle(0).await;

    let busy = {
        let handle = handle.clone();
        tokio::spawn(async move { handle.execute("sleep(0.6)").await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(handle.is_busy().await.unwrap());
    let err = handle.list().await.unwrap_err();
    assert!(matches!(err, Error::LockTimeout { timeout_ms: 100 }), "got {:?}", err);

    assert!(!handle.wait(Some(Duration::from_millis(10))).await.unwrap());
    assert!(handle.wait(None).await.unwrap());
    busy.await.unwrap().unwrap();
    assert!(!handle.is_busy().await.unwrap());
}

// ─────────────────────────────────────────────────────────────────
// Namespace
// ─────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_volatile_execute_leaves_list_unchanged() {
    let pool = TestPool::start(1).await;
    let handle = pool.handle(0).await;
    handle.set("a", 1).await.unwrap();
    handle.install("helpers", "fn twice(x) = x * 2").await.unwrap();

    let before = handle.list().await.unwrap();
    let mut bindings = BTreeMap::new();
    bindings.insert("a".to_string(), Value::Int(21));
    let out = handle
        .volatile_execute("import helpers\nb = helpers.twice(a)\na = 0", bindings, &["b"])
        .await
        .unwrap();
    let after = handle.list().await.unwrap();

    assert_eq!(out["b"], Value::Int(42));
    assert_eq!(before, after);
    assert_eq!(handle.get("a").await.unwrap(), Value::Int(1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_clear_then_get_is_name_not_found() {
    let pool = TestPool::start(1).await;
    let handle = pool.handle(0).await;
    handle.execute("x = 1\ny = [1, 2, 3]").await.unwrap();
    assert_eq!(handle.list().await.unwrap().len(), 2);

    handle.clear().await.unwrap();
    assert!(handle.list().await.unwrap().is_empty());
    assert!(matches!(
        handle.get("x").await.unwrap_err(),
        Error::NameNotFound { ref name } if name == "x"
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_execution_error_carries_cause() {
    let pool = TestPool::start(1).await;
    let handle = pool.handle(0).await;

    match handle.execute("z = 1 // 0").await.unwrap_err() {
        Error::Execution { message } => assert!(message.contains("zero"), "{}", message),
        other => panic!("expected execution error, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_deeply_nested_code_leaves_worker_serving() {
    let pool = TestPool::start(1).await;
    let handle = pool.handle(0).await;

    let nested = format!("x = {}1{}", "(".repeat(2_000), ")".repeat(2_000));
    assert!(matches!(
        handle.execute(&nested).await.unwrap_err(),
        Error::Execution { .. }
    ));
    assert_eq!(handle.ping().await.unwrap(), "pong");
    assert_eq!(handle.evaluate("1 + 1").await.unwrap(), Value::Int(2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_proxy_over_tcp() {
    let pool = TestPool::start(1).await;
    let handle = pool.handle(0).await;
    handle
        .install("stats", "fn mean(xs) = sum(xs) / len(xs)\ncount = 0")
        .await
        .unwrap();
    handle.execute("import stats\nsamples = [1, 2, 3, 4]").await.unwrap();

    let root = handle.proxy();
    let stats = match root.resolve("stats").await.unwrap() {
        Resolved::Module(proxy) => proxy,
        other => panic!("expected module, got {:?}", other),
    };
    let mean = match stats.resolve("mean").await.unwrap() {
        Resolved::Callable(callable) => callable,
        other => panic!("expected callable, got {:?}", other),
    };
    let samples = root.get("samples").await.unwrap();
    assert_eq!(mean.call(&[samples], &[]).await.unwrap(), Value::Float(2.5));

    stats.set("count", 7).await.unwrap();
    assert_eq!(handle.get("stats.count").await.unwrap(), Value::Int(7));
}

// ─────────────────────────────────────────────────────────────────
// Group health and selection
// ─────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_prune_unreachable_members() {
    let pool = TestPool::start(3).await;
    let mut group = pool.group().await;

    pool.servers[1].shutdown();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(group.detect_unreachable().await, vec![1]);
    assert_eq!(group.unreachable().await.len(), 1);
    assert_eq!(group.prune_unreachable().await, 1);
    assert_eq!(group.len(), 2);
    assert!(group.detect_unreachable().await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_select_fastest_ranks_every_member() {
    let pool = TestPool::start(3).await;
    let group = pool.group().await;

    match group
        .select_fastest(SelectMode::Ranked, Criterion::Combined, 2_000)
        .await
        .unwrap()
    {
        Selection::Ranked(ranked) => assert_eq!(ranked.len(), 3),
        other => panic!("expected ranked selection, got {:?}", other),
    }

    let ranked = group
        .benchmark(Criterion::Compute, 2_000, JoinOptions::default())
        .await;
    let scores: Vec<f64> = ranked.iter().map(|(_, r)| r.compute_secs).collect();
    assert!(scores.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_connect_to_dead_worker() {
    let endpoint = format!("nsw://127.0.0.1:{}/w-gone", dead_port());
    let err = WorkerHandle::connect(&endpoint, fast_options()).await.unwrap_err();
    assert!(err.is_unreachable());

    let err = WorkerGroup::connect_from_text(&endpoint, fast_options())
        .await
        .unwrap_err();
    assert!(err.is_unreachable());
}
