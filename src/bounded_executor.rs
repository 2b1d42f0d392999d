use std::collections::VecDeque;
use std::sync::mpsc;
use std::thread;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;

/// A unit of work that may borrow from the caller's stack.
pub type ScopedJob<'a, T> = Box<dyn FnOnce() -> T + Send + 'a>;

struct Job<'a, T> {
    index: usize,
    run: ScopedJob<'a, T>,
}

/// Run `jobs` on at most `max_parallel` scoped threads and return their
/// outputs in job order.
///
/// Returns only after every thread has been joined.
pub fn run_bounded<'a, T: Send + 'a>(
    max_parallel: usize,
    jobs: Vec<ScopedJob<'a, T>>,
) -> Result<Vec<T>> {
    if max_parallel == 0 {
        return Err(anyhow!("run_bounded needs max_parallel >= 1"));
    }
    if jobs.is_empty() {
        return Ok(Vec::new());
    }

    let expected_count = jobs.len();
    let worker_count = max_parallel.min(expected_count);
    let queue: Mutex<VecDeque<Job<'a, T>>> = Mutex::new(
        jobs.into_iter()
            .enumerate()
            .map(|(index, run)| Job { index, run })
            .collect(),
    );

    let mut out: Vec<(usize, T)> = thread::scope(|scope| {
        let (tx, rx) = mpsc::channel::<(usize, T)>();
        let queue = &queue;

        let handles: Vec<_> = (0..worker_count)
            .map(|_| {
                let tx = tx.clone();
                scope.spawn(move || loop {
                    let Some(job) = queue.lock().pop_front() else {
                        break;
                    };
                    let out = (job.run)();
                    if tx.send((job.index, out)).is_err() {
                        break;
                    }
                })
            })
            .collect();
        drop(tx);

        let out: Vec<(usize, T)> = rx.iter().collect();

        let mut panicked = false;
        for h in handles {
            panicked |= h.join().is_err();
        }
        if panicked {
            return Err(anyhow!("a scoped job panicked before reporting its result"));
        }
        Ok(out)
    })?;

    if out.len() != expected_count {
        return Err(anyhow!(
            "scoped executor returned {} results for {expected_count} jobs",
            out.len()
        ));
    }

    out.sort_by_key(|(idx, _)| *idx);
    Ok(out.into_iter().map(|(_, v)| v).collect())
}
