use futures_conductor::{Concurrency, Pool, PoolEvent, PoolOptions};
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt().with_target(false).init();

  info!("--- Progress Events Example ---");

  let pool = Pool::<u64, String>::with_options(
    Concurrency::limited(3).expect("limit is positive"),
    PoolOptions::new().name("progress_pool"),
  )
  .expect("Pool construction failed");

  pool
    .on(PoolEvent::Start, |stats| info!("started with {} queued", stats.waiting))
    .on(PoolEvent::Full, |stats| info!("full: {} running", stats.running))
    .on(PoolEvent::Available, |_| info!("one slot available"))
    .on(PoolEvent::Next, |stats| {
      info!(
        "progress {}/{} ({} running, {} waiting)",
        stats.completed, stats.submitted, stats.running, stats.waiting
      )
    })
    .once(PoolEvent::Close, |stats| info!("done: {} tasks", stats.completed));

  for i in 0..10u64 {
    pool
      .enqueue(move || async move {
        tokio::time::sleep(Duration::from_millis(50 + (i * 37) % 120)).await;
        Ok(i * i)
      })
      .expect("pool is open");
  }

  let outcomes = pool.close().await.expect("accumulate mode never rejects");
  let squares: Vec<u64> = outcomes.into_iter().filter_map(|o| o.into_result().ok()).collect();
  info!("Squares in submission order: {:?}", squares);
  info!("--- Progress Events Example End ---");
}
