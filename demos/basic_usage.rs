use futures_conductor::{Concurrency, Outcome, Pool, PoolOptions};
use std::time::Duration;
use tracing::info;

async fn my_task_fn(id: usize, delay_ms: u64) -> Result<String, String> {
  info!("Task {} starting, will sleep for {}ms", id, delay_ms);
  tokio::time::sleep(Duration::from_millis(delay_ms)).await;
  if id == 3 {
    return Err(format!("Task {} gave up after {}ms", id, delay_ms));
  }
  Ok(format!("Task {} finished successfully after {}ms", id, delay_ms))
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false) // Disable module paths for cleaner example output
    .init();

  info!("--- Basic Usage Example ---");

  let pool = Pool::<String, String>::with_options(
    Concurrency::limited(2).expect("limit is positive"),
    PoolOptions::new().name("basic_pool").verbose(true),
  )
  .expect("Pool construction failed");

  for i in 0..5 {
    // Alternate sleep times so later tasks can finish first.
    let sleep_duration: u64 = 500 - (i as u64 % 3 * 150);
    match pool.enqueue(move || my_task_fn(i, sleep_duration)) {
      Ok(index) => info!("Submitted task {} at index {}", i, index),
      Err(e) => tracing::error!("Failed to submit task {}: {:?}", i, e),
    }
  }

  info!("All tasks submitted. Closing pool and awaiting outcomes...");

  match pool.close().await {
    Ok(outcomes) => {
      for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
          Outcome::Success(result) => info!("Outcome {}: {}", index, result),
          Outcome::Failure(failure) => info!("Outcome {}: {}", index, failure),
        }
      }
    }
    Err(e) => tracing::error!("Pool failed: {}", e),
  }

  info!("--- Basic Usage Example End ---");
}
