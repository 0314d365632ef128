use anyhow::Result;
use std::time::Instant;
use tokio::runtime::Runtime;

/// Single-threaded reactor: every connection is driven from one thread.
pub fn create_runtime() -> Result<Runtime> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    Ok(rt)
}

/// Monotonic time source, injectable for tests.
pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
