//! Work Scheduling Module
//!
//! Every unit of work handed to the scheduler is independent, so the
//! sequential and pooled paths run the exact same per-item closure and only
//! differ in how items are dispatched.

use crate::error::HashingError;
use indicatif::{ProgressBar, ProgressStyle};
use log::warn;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::fmt::Display;

/// Dispatches independent units of work, sequentially or on a bounded pool.
pub enum Scheduler {
    Sequential,
    Pool(ThreadPool),
}

impl Scheduler {
    /// `workers` of 0 or 1 runs everything on the calling thread.
    pub fn new(workers: usize) -> Result<Self, HashingError> {
        if workers <= 1 {
            return Ok(Scheduler::Sequential);
        }
        let pool = start_with_retry(|| {
            ThreadPoolBuilder::new()
                .num_threads(workers)
                .thread_name(|i| format!("phash-worker-{}", i))
                .build()
        })
        .map_err(|e| HashingError::PoolStartFailure {
            workers,
            reason: e.to_string(),
        })?;
        Ok(Scheduler::Pool(pool))
    }

    pub fn workers(&self) -> usize {
        match self {
            Scheduler::Sequential => 1,
            Scheduler::Pool(pool) => pool.current_num_threads(),
        }
    }

    /// Applies `f` to every item and returns the results in input order.
    pub fn map<T, R, F>(&self, items: &[T], progress: &ProgressBar, f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        let run = |item: &T| {
            let result = f(item);
            progress.inc(1);
            result
        };
        match self {
            Scheduler::Sequential => items.iter().map(run).collect(),
            Scheduler::Pool(pool) => pool.install(|| items.par_iter().map(run).collect()),
        }
    }
}

/// Calls `start` and, if it fails, calls it exactly once more.
fn start_with_retry<T, E: Display>(mut start: impl FnMut() -> Result<T, E>) -> Result<T, E> {
    match start() {
        Ok(pool) => Ok(pool),
        Err(e) => {
            warn!("Worker pool failed to start ({}). Restarting once.", e);
            start()
        }
    }
}

/// A progress bar for `len` items, or a hidden one when `verbose` is off.
pub fn progress_bar(len: usize, verbose: bool, label: &str) -> ProgressBar {
    if !verbose {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len as u64);
    let template = format!(
        "{{spinner:.green}} {} [{{bar:40.cyan/blue}}] {{pos}}/{{len}} ({{eta}})",
        label
    );
    let style = ProgressStyle::default_bar()
        .template(&template)
        .map(|style| style.progress_chars("##-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}
