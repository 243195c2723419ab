use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info};

/// The outcome of a measured run: its return value and wall-clock time.
///
/// # Type Parameters
/// - `T`: The return type of the measured closure.
pub struct ExecutionResult<T> {
    pub result: T,
    pub duration: Duration,
}

impl<T> ExecutionResult<T> {
    pub fn elapsed_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1_000.0
    }

    /// Logs a one-line summary including the return value.
    pub fn log_summary(&self, operation_name: &str)
    where
        T: fmt::Debug,
    {
        info!(
            "{}: {:.2} ms, {:?}",
            operation_name,
            self.elapsed_ms(),
            self.result
        );
    }
}

/// Runs `f` and records how long it took.
pub fn measure<F, R>(f: F) -> ExecutionResult<R>
where
    F: FnOnce() -> R,
{
    let start_time = Instant::now();
    let result = f();
    ExecutionResult {
        result,
        duration: start_time.elapsed(),
    }
}

/// Runs one phase of an algorithm and logs its duration at debug level.
pub fn timed<F, R>(phase: &str, f: F) -> R
where
    F: FnOnce() -> R,
{
    let execution_result = measure(f);
    debug!(
        phase,
        elapsed_us = execution_result.duration.as_micros() as u64,
        "phase finished"
    );
    execution_result.result
}
