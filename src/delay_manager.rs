use std::time::Duration;
use std::thread;
use log::info;

/// Base delay of the rate-limit backoff, in seconds.
pub const INITIAL_DELAY_SECS: u64 = 5;

/// Total attempts (first try included) before a rate-limited search gives up.
pub const MAX_RETRIES: u32 = 10;

/// Delay before the retry that follows failed attempt `attempt` (0-based): `5 * 2^attempt` seconds.
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(INITIAL_DELAY_SECS * 2u64.pow(attempt))
}

/// Blocks the current thread between retries. Tests swap in a recorder.
pub trait Sleeper {
    fn sleep(&self, delay: Duration);
}

impl<S: Sleeper + ?Sized> Sleeper for &S {
    fn sleep(&self, delay: Duration) {
        (**self).sleep(delay)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, delay: Duration) {
        info!("Rate limit hit. Waiting for {} seconds before retrying...", delay.as_secs());
        thread::sleep(delay);
    }
}
