// src/poll/scheduler.rs
use metrics::{counter, gauge, histogram};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::PollCycle;
use crate::notify::Alerter;

/// Spawn the periodic task for one source kind. The first run starts immediately;
/// each run is awaited before the next tick, so runs of the same source never overlap.
pub fn spawn_poll_loop(cycle: PollCycle, interval: Duration, alerter: Alerter) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            run_and_log(&cycle, &alerter).await;
        }
    })
}

/// One cycle with logging, metrics and alerting around it. Never fails.
pub async fn run_and_log(cycle: &PollCycle, alerter: &Alerter) {
    let kind = cycle.kind();
    let t0 = std::time::Instant::now();
    let result = cycle.run().await;
    histogram!("bridge_cycle_ms", "source" => kind.as_str())
        .record(t0.elapsed().as_secs_f64() * 1_000.0);
    gauge!("bridge_last_cycle_ts", "source" => kind.as_str())
        .set(chrono::Utc::now().timestamp() as f64);

    match result {
        Ok(report) if report.skipped => {}
        Ok(report) => {
            tracing::info!(
                target: "poll",
                source = %kind,
                sub_sources = report.sub_sources.len(),
                delivered = report.delivered(),
                failures = report.failures(),
                "cycle finished"
            );
        }
        Err(e) => {
            let msg = format!("{:#}", anyhow::Error::new(e));
            tracing::error!(source = %kind, error = %msg, "cycle failed");
            counter!("bridge_persist_errors_total", "source" => kind.as_str()).increment(1);
            alerter.send_alert(&format!("{kind} sync failed: {msg}")).await;
        }
    }
}
