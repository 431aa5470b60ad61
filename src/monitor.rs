//! Cooperative polling loop for monitor mode.
//!
//! Single-threaded: fetch the run state, hand it to the renderer, check for
//! completion, sleep, repeat. There is no backoff and no iteration cap; a
//! never-completing run is stopped by killing the process.

use std::time::Duration;

use anyhow::Result;

use crate::timeline::TaskRun;

/// Fixed sleep between poll cycles.
pub const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// A run is complete when every task in the watched directory has produced
/// a run and no run remains in a non-succeeded state.
pub fn run_complete(runs: &[TaskRun], task_count: usize) -> bool {
    runs.len() == task_count && runs.iter().all(|r| r.state.is_succeeded())
}

/// Poll until the run completes.
///
/// Each cycle fetches the run history, renders it, then checks for
/// completion, so the final state is always rendered before the loop stops.
/// Returns the number of fetch/render cycles performed.
pub fn watch<F, R>(
    task_count: usize,
    interval: Duration,
    mut fetch: F,
    mut render: R,
) -> Result<u32>
where
    F: FnMut() -> Result<Vec<TaskRun>>,
    R: FnMut(&[TaskRun]) -> Result<()>,
{
    let mut cycles = 0;
    loop {
        let runs = fetch()?;
        render(&runs)?;
        cycles += 1;
        if run_complete(&runs, task_count) {
            return Ok(cycles);
        }
        std::thread::sleep(interval);
    }
}
