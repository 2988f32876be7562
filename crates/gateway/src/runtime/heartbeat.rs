//! Periodic synthetic command that lets the agent check on pending work.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use sb_domain::message::Command;

pub const HEARTBEAT_SOURCE_ID: &str = "system_heartbeat";
pub const HEARTBEAT_USER_ID: &str = "system";
pub const HEARTBEAT_CONTENT: &str =
    "Heartbeat trigger: Check for any pending tasks or status updates.";

/// The command run on every heartbeat tick.
pub fn heartbeat_command() -> Command {
    Command::new(HEARTBEAT_SOURCE_ID, HEARTBEAT_USER_ID, HEARTBEAT_CONTENT)
}

/// Convert the configured interval to a period. `None` when disabled
/// (zero, negative or not a number).
pub fn interval_from_minutes(minutes: f64) -> Option<Duration> {
    if !minutes.is_finite() || minutes <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(minutes * 60.0).ok()
}

/// Run `on_tick` once per `period` until `cancel` fires.
///
/// The first tick happens one full period after spawning. A tick that is
/// still running when the token fires is abandoned at its next suspension
/// point.
pub fn spawn<F, Fut>(period: Duration, cancel: CancellationToken, on_tick: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        tracing::info!(period_secs = period.as_secs_f64(), "heartbeat started");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(period) => {}
            }
            tracing::debug!("heartbeat trigger");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = on_tick() => {}
            }
        }
        tracing::info!("heartbeat stopped");
    })
}
