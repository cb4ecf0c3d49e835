use futures_conductor::{
  Concurrency, Lifecycle, Outcome, Pool, PoolError, PoolEvent, PoolOptions, SettleError, Severity, TaskCause,
};
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;

// Helper to initialize tracing for tests (call once per test run, not per test function)
fn setup_tracing_for_test() {
  use std::sync::Once;
  use tracing_subscriber::{fmt, EnvFilter};
  static TRACING_INIT: Once = Once::new();

  TRACING_INIT.call_once(|| {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,futures_conductor=trace"));

    fmt::Subscriber::builder()
      .with_env_filter(filter)
      .with_test_writer()
      .try_init()
      .ok();
  });
}

// Returns a receiver that yields once per `Next` event, so tests can wait for
// the pool to have processed a completion.
fn next_events(pool: &Pool<u32, String>) -> mpsc::UnboundedReceiver<()> {
  let (tx, rx) = mpsc::unbounded_channel();
  pool.on(PoolEvent::Next, move |_| {
    let _ = tx.send(());
  });
  rx
}

fn options(name: &str) -> PoolOptions {
  PoolOptions::new().name(name).verbose(true)
}

#[tokio::test]
async fn test_close_without_admissions_resolves_empty() {
  setup_tracing_for_test();
  let pool = Pool::<u32, String>::with_options(Concurrency::limited(2).unwrap(), options("empty_pool")).unwrap();
  assert_eq!(pool.lifecycle(), Lifecycle::Idle);

  let outcomes = pool.close().await;
  assert_eq!(outcomes, Ok(Vec::new()));
  assert!(pool.is_settled());
  assert!(pool.is_started());
  assert_eq!(pool.lifecycle(), Lifecycle::Resolved);
}

#[tokio::test]
async fn test_zero_concurrency_is_rejected() {
  setup_tracing_for_test();
  let result = Pool::<u32, String>::new(0);
  assert_eq!(result.err(), Some(PoolError::InvalidConcurrency));
}

#[test]
fn test_construction_requires_runtime() {
  let result = Pool::<u32, String>::new(2);
  assert_eq!(result.err(), Some(PoolError::NoRuntime));
}

#[tokio::test]
async fn test_explicit_runtime_handle() {
  setup_tracing_for_test();
  let pool = Pool::<u32, String>::with_options(
    Concurrency::Unbounded,
    options("explicit_runtime").runtime(tokio::runtime::Handle::current()),
  )
  .unwrap();
  pool.enqueue(|| async { Ok(5) }).unwrap();
  assert_eq!(pool.close().await, Ok(vec![Outcome::Success(5)]));
}

#[tokio::test]
async fn test_outcomes_follow_submission_order_with_random_delays() {
  setup_tracing_for_test();
  let pool = Pool::<u32, String>::with_options(Concurrency::limited(4).unwrap(), options("ordering_pool")).unwrap();

  let delays: Vec<u64> = {
    let mut rng = rand::rng();
    (0..20).map(|_| rng.random_range(0..30u64)).collect()
  };

  for (i, delay) in delays.into_iter().enumerate() {
    let index = pool
      .enqueue(move || async move {
        sleep(Duration::from_millis(delay)).await;
        Ok(i as u32)
      })
      .unwrap();
    assert_eq!(index, i, "indices are assigned in admission order");
  }

  let outcomes = pool.close().await.unwrap();
  let values: Vec<u32> = outcomes.into_iter().map(|o| o.into_result().unwrap()).collect();
  assert_eq!(values, (0..20).collect::<Vec<u32>>());
}

#[tokio::test]
async fn test_running_count_never_exceeds_limit() {
  setup_tracing_for_test();
  let limit = 3;
  let pool = Pool::<u32, String>::with_options(Concurrency::limited(limit).unwrap(), options("cap_pool")).unwrap();

  let current = Arc::new(AtomicUsize::new(0));
  let max_seen = Arc::new(AtomicUsize::new(0));
  let max_reported = Arc::new(AtomicUsize::new(0));

  for event in [PoolEvent::Full, PoolEvent::Available, PoolEvent::Next] {
    let max_reported = max_reported.clone();
    pool.on(event, move |stats| {
      max_reported.fetch_max(stats.running, Ordering::SeqCst);
    });
  }

  for i in 0..30u32 {
    let current = current.clone();
    let max_seen = max_seen.clone();
    pool
      .enqueue(move || async move {
        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
        max_seen.fetch_max(now, Ordering::SeqCst);
        sleep(Duration::from_millis(5 + u64::from(i % 4) * 5)).await;
        current.fetch_sub(1, Ordering::SeqCst);
        Ok(i)
      })
      .unwrap();
    assert!(pool.running_count() <= limit);
  }

  let outcomes = pool.close().await.unwrap();
  assert_eq!(outcomes.len(), 30);
  assert_eq!(max_seen.load(Ordering::SeqCst), limit);
  assert!(max_reported.load(Ordering::SeqCst) <= limit);
  assert_eq!(pool.running_count(), 0);
  assert_eq!(pool.waiting_count(), 0);
}

#[tokio::test]
async fn test_admission_after_close_and_after_settle() {
  setup_tracing_for_test();
  let pool = Pool::<u32, String>::new(2).unwrap();
  let (gate_tx, gate_rx) = oneshot::channel::<()>();
  pool
    .enqueue(move || async move {
      let _ = gate_rx.await;
      Ok(1)
    })
    .unwrap();

  let handle = pool.close();
  assert!(pool.is_closed());
  assert_eq!(pool.lifecycle(), Lifecycle::Draining);
  assert_eq!(pool.enqueue(|| async { Ok(2) }), Err(PoolError::PoolClosed));

  gate_tx.send(()).unwrap();
  assert_eq!(handle.await, Ok(vec![Outcome::Success(1)]));

  assert_eq!(pool.enqueue(|| async { Ok(3) }), Err(PoolError::PoolSettled));
}

#[tokio::test]
async fn test_accumulate_mode_records_failure_in_place() {
  setup_tracing_for_test();
  let pool = Pool::<u32, String>::with_options(Concurrency::limited(2).unwrap(), options("accumulate_pool")).unwrap();

  for i in 0..5u32 {
    pool
      .enqueue(move || async move {
        sleep(Duration::from_millis(10)).await;
        if i == 2 {
          Err(format!("task {i} broke"))
        } else {
          Ok(i * 10)
        }
      })
      .unwrap();
  }

  let outcomes = pool.close().await.expect("accumulate mode never rejects");
  assert_eq!(outcomes.len(), 5);
  for i in [0usize, 1, 3, 4] {
    assert_eq!(outcomes[i], Outcome::Success(i as u32 * 10));
  }
  let failure = outcomes[2].failure().expect("index 2 should hold the failure");
  assert_eq!(failure.index(), 2);
  assert_eq!(failure.cause(), &TaskCause::Returned("task 2 broke".to_string()));
}

#[tokio::test]
async fn test_fail_fast_rejects_with_original_cause() {
  setup_tracing_for_test();
  let pool = Pool::<u32, String>::with_options(
    Concurrency::limited(5).unwrap(),
    options("fail_fast_pool").reject_on_error(true),
  )
  .unwrap();
  let finished = Arc::new(AtomicUsize::new(0));

  for i in 0..5u32 {
    let finished = finished.clone();
    pool
      .enqueue(move || async move {
        if i == 2 {
          sleep(Duration::from_millis(10)).await;
          return Err("disk full".to_string());
        }
        sleep(Duration::from_millis(80)).await;
        finished.fetch_add(1, Ordering::SeqCst);
        Ok(i)
      })
      .unwrap();
  }

  let result = pool.close().await;
  match result {
    Err(SettleError::Rejected(failure)) => {
      assert_eq!(failure.index, 2);
      assert_eq!(failure.into_cause(), TaskCause::Returned("disk full".to_string()));
    }
    other => panic!("Expected rejection by task 2, got {:?}", other),
  }
  assert_eq!(pool.lifecycle(), Lifecycle::Rejected);
  assert_eq!(pool.rejected_index(), Some(2));
  assert_eq!(pool.running_count(), 0, "running tasks are detached on rejection");

  // The other tasks were not aborted: they run to completion, and their
  // outcomes are discarded.
  sleep(Duration::from_millis(150)).await;
  assert_eq!(finished.load(Ordering::SeqCst), 4);
  assert_eq!(pool.completed_count(), 0);
  assert_eq!(pool.enqueue(|| async { Ok(9) }), Err(PoolError::PoolSettled));
}

#[tokio::test]
async fn test_fail_fast_abandons_queued_tasks() {
  setup_tracing_for_test();
  let pool =
    Pool::<u32, String>::with_options(Concurrency::limited(1).unwrap(), options("abandon_pool").reject_on_error(true))
      .unwrap();
  let queued_ran = Arc::new(AtomicBool::new(false));

  pool.enqueue(|| async { Err("first failed".to_string()) }).unwrap();
  for _ in 0..3 {
    let queued_ran = queued_ran.clone();
    pool
      .enqueue(move || async move {
        queued_ran.store(true, Ordering::SeqCst);
        Ok(1)
      })
      .unwrap();
  }
  assert_eq!(pool.waiting_count(), 3);

  let result = pool.close().await;
  assert_eq!(result.unwrap_err().rejection().map(|f| f.index), Some(0));
  assert_eq!(pool.waiting_count(), 0);

  sleep(Duration::from_millis(30)).await;
  assert!(!queued_ran.load(Ordering::SeqCst), "Queued tasks must not run after rejection.");
}

#[tokio::test]
async fn test_fail_fast_rejects_before_close() {
  setup_tracing_for_test();
  let pool = Pool::<u32, String>::with_options(Concurrency::Unbounded, options("early_reject").reject_on_error(true))
    .unwrap();
  let mut close_rx = {
    let (tx, rx) = mpsc::unbounded_channel();
    pool.on(PoolEvent::Close, move |_| {
      let _ = tx.send(());
    });
    rx
  };

  pool.enqueue(|| async { Err("early".to_string()) }).unwrap();
  close_rx.recv().await.unwrap();

  assert!(pool.is_settled());
  assert!(pool.is_closed());
  assert_eq!(pool.enqueue(|| async { Ok(1) }), Err(PoolError::PoolSettled));

  let result = pool.close().await;
  assert!(matches!(result, Err(SettleError::Rejected(ref f)) if f.index == 0));
}

#[tokio::test]
async fn test_auto_start_disabled_waits_for_start() {
  setup_tracing_for_test();
  let pool =
    Pool::<u32, String>::with_options(Concurrency::limited(2).unwrap(), options("manual_pool").auto_start(false))
      .unwrap();
  let ran = Arc::new(AtomicBool::new(false));
  let flag = ran.clone();

  pool
    .enqueue(move || async move {
      flag.store(true, Ordering::SeqCst);
      Ok(7)
    })
    .unwrap();

  sleep(Duration::from_millis(20)).await;
  assert!(!ran.load(Ordering::SeqCst), "Task should not run before start().");
  assert!(!pool.is_started());
  assert_eq!(pool.waiting_count(), 1);
  assert_eq!(pool.lifecycle(), Lifecycle::Idle);

  pool.start();
  assert!(pool.is_started());
  assert_eq!(pool.waiting_count(), 0);
  assert_eq!(pool.running_count(), 1);

  assert_eq!(pool.close().await, Ok(vec![Outcome::Success(7)]));
  assert!(ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_close_starts_idle_pool() {
  setup_tracing_for_test();
  let pool =
    Pool::<u32, String>::with_options(Concurrency::limited(1).unwrap(), options("close_starts").auto_start(false))
      .unwrap();
  pool.enqueue(|| async { Ok(1) }).unwrap();
  pool.enqueue(|| async { Ok(2) }).unwrap();
  assert!(!pool.is_started());

  let outcomes = pool.close().await.unwrap();
  assert_eq!(outcomes, vec![Outcome::Success(1), Outcome::Success(2)]);
}

#[tokio::test]
async fn test_panicking_task_recorded_as_failure() {
  setup_tracing_for_test();
  let pool = Pool::<u32, String>::new(2).unwrap();
  pool.enqueue(|| async { Ok(1) }).unwrap();
  pool
    .enqueue(|| async {
      sleep(Duration::from_millis(5)).await;
      if true {
        panic!("task blew up");
      }
      Ok(2)
    })
    .unwrap();
  pool.enqueue(|| async { Ok(3) }).unwrap();

  let outcomes = pool.close().await.unwrap();
  assert_eq!(outcomes[0], Outcome::Success(1));
  assert_eq!(outcomes[2], Outcome::Success(3));
  let failure = outcomes[1].failure().unwrap();
  assert_eq!(failure.cause, TaskCause::Panicked("task blew up".to_string()));
  assert!(failure.cause.is_panic());
}

#[tokio::test]
async fn test_second_close_returns_unavailable_handle() {
  setup_tracing_for_test();
  let pool = Pool::<u32, String>::new(1).unwrap();
  pool.enqueue(|| async { Ok(4) }).unwrap();

  let first = pool.close();
  let second = pool.close();
  assert!(first.is_live());
  assert!(!second.is_live());

  assert_eq!(second.await, Err(SettleError::Pool(PoolError::ResultUnavailable)));
  assert_eq!(first.await, Ok(vec![Outcome::Success(4)]));
}

#[tokio::test]
async fn test_completion_count_visible_after_next_event() {
  setup_tracing_for_test();
  let pool = Pool::<u32, String>::new(2).unwrap();
  let mut next_rx = next_events(&pool);
  let (gate_tx, gate_rx) = oneshot::channel::<Result<u32, String>>();

  pool
    .enqueue(move || async move { gate_rx.await.unwrap_or_else(|_| Err("gate dropped".to_string())) })
    .unwrap();
  assert_eq!(pool.running_count(), 1);
  assert_eq!(pool.completed_count(), 0);

  gate_tx.send(Ok(11)).unwrap();
  next_rx.recv().await.unwrap();
  assert_eq!(pool.running_count(), 0);
  assert_eq!(pool.completed_count(), 1);
  assert_eq!(pool.lifecycle(), Lifecycle::Started, "open pool stays idle awaiting admissions");

  let stats = pool.stats();
  assert_eq!((stats.submitted, stats.completed, stats.running, stats.waiting), (1, 1, 0, 0));
  assert_eq!(pool.close().await, Ok(vec![Outcome::Success(11)]));
}

#[tokio::test]
async fn test_diagnostics_sink_receives_pool_messages() {
  setup_tracing_for_test();
  let seen: Arc<Mutex<Vec<(Severity, String)>>> = Arc::new(Mutex::new(Vec::new()));
  let sink = seen.clone();
  let pool = Pool::<u32, String>::with_options(
    Concurrency::limited(1).unwrap(),
    PoolOptions::new()
      .name("diag_pool")
      .diagnostics_sink(move |severity, message| sink.lock().unwrap().push((severity, message.to_string()))),
  )
  .unwrap();

  pool.enqueue(|| async { Err("nope".to_string()) }).unwrap();
  let outcomes = pool.close().await.unwrap();
  assert!(outcomes[0].is_failure());

  let seen = seen.lock().unwrap();
  assert!(seen
    .iter()
    .any(|(severity, message)| *severity == Severity::Warn && message.starts_with("[diag_pool] task #0 failed")));
  assert!(seen
    .iter()
    .any(|(severity, message)| *severity == Severity::Info && message.contains("resolved 1 task(s), 1 failed")));
}
