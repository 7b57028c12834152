//! Concurrent stress runner.

use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress run.
#[derive(Debug, Clone)]
pub struct StressResult {
    /// Total operations performed.
    pub operations: usize,
    /// Wall time of the run.
    pub duration: Duration,
}

impl StressResult {
    /// Returns operations per second.
    pub fn ops_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.operations as f64 / secs
        } else {
            0.0
        }
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Operations: {}", self.operations);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second());
    }
}

/// Runs `op(thread, iteration)` on `threads` scoped threads, `per_thread`
/// times each.
pub fn run_concurrent<F>(threads: usize, per_thread: usize, op: F) -> StressResult
where
    F: Fn(usize, usize) + Sync,
{
    let start = Instant::now();
    thread::scope(|scope| {
        for t in 0..threads {
            let op = &op;
            scope.spawn(move || {
                for i in 0..per_thread {
                    op(t, i);
                }
            });
        }
    });
    StressResult {
        operations: threads * per_thread,
        duration: start.elapsed(),
    }
}
