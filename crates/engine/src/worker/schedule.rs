use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::sleep;

/// How long to sleep at `now` before `target` is reached. Zero for a target
/// in the past.
pub fn delay_until(target: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (target - now).to_std().unwrap_or(Duration::ZERO)
}

/// Suspend until the wall clock reaches `target`.
///
/// Timers can fire a little early relative to the wall clock, so this loops
/// until `Utc::now()` has actually passed the target.
pub async fn wait_until(target: DateTime<Utc>) {
    loop {
        let delay = delay_until(target, Utc::now());
        if delay.is_zero() {
            return;
        }
        sleep(delay).await;
    }
}
