use futures_conductor::{parallel_with, serie, task, PoolOptions, SettleError, TaskGenerator};
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;

fn step(id: u32, delay_ms: u64, fail: bool) -> TaskGenerator<u32, String> {
  task(move || async move {
    info!("Step {} running", id);
    sleep(Duration::from_millis(delay_ms)).await;
    if fail {
      Err(format!("step {} hit a bad record", id))
    } else {
      Ok(id)
    }
  })
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Fail-Fast Example ---");

  let tasks = vec![step(0, 300, false), step(1, 100, true), step(2, 300, false)];
  let options = PoolOptions::new().name("fail_fast_pool").reject_on_error(true).verbose(true);
  match parallel_with(tasks, options).await {
    Ok(outcomes) => info!("Unexpected success: {} outcomes", outcomes.len()),
    Err(SettleError::Rejected(failure)) => info!("Rejected by task #{}: {}", failure.index, failure.cause),
    Err(e) => tracing::error!("Pool error: {}", e),
  }

  info!("Same steps in series, accumulating failures:");
  let tasks = vec![step(0, 50, false), step(1, 50, true), step(2, 50, false)];
  match serie(tasks).await {
    Ok(outcomes) => {
      for outcome in outcomes {
        match outcome.into_result() {
          Ok(id) => info!("step {} ok", id),
          Err(failure) => info!("{}", failure),
        }
      }
    }
    Err(e) => tracing::error!("Pool error: {}", e),
  }

  info!("--- Fail-Fast Example End ---");
}
