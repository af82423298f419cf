use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use veritas_domain::errors::BacktestError;

pub type CancelFn<'a> = &'a (dyn Fn() -> bool + Sync);

enum WorkerMessage<T> {
    Done { slot: usize, value: T },
    Fatal { slot: usize, error: BacktestError },
}

/// Available cores minus one, never below one.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

pub fn normalize_workers(value: Option<usize>) -> usize {
    value.unwrap_or_else(default_worker_count).max(1)
}

fn should_cancelled(should_cancel: Option<CancelFn<'_>>) -> bool {
    should_cancel.map(|f| f()).unwrap_or(false)
}

fn run_guarded<T, F>(task: &F, slot: usize) -> Result<T, BacktestError>
where
    F: Fn(usize) -> Result<T, BacktestError>,
{
    match panic::catch_unwind(AssertUnwindSafe(|| task(slot))) {
        Ok(result) => result,
        Err(_) => Err(BacktestError::Worker(format!("task {slot} panicked"))),
    }
}

/// Runs `task(0..task_count)` on at most `workers` scoped threads.
///
/// Each task fills its own slot; results come back in slot order no matter
/// which worker finished first. The first failure stops the hand-out of new
/// tasks and is returned. `should_cancel` is polled before every task.
pub fn run_indexed<T, F>(
    task_count: usize,
    workers: usize,
    should_cancel: Option<CancelFn<'_>>,
    task: F,
) -> Result<Vec<T>, BacktestError>
where
    T: Send,
    F: Fn(usize) -> Result<T, BacktestError> + Sync,
{
    let worker_count = workers.max(1).min(task_count);
    if worker_count <= 1 {
        let mut out = Vec::with_capacity(task_count);
        for slot in 0..task_count {
            if should_cancelled(should_cancel) {
                return Err(BacktestError::Worker(format!("cancelled before task {slot}")));
            }
            out.push(run_guarded(&task, slot)?);
        }
        return Ok(out);
    }

    let next_index = AtomicUsize::new(0);
    let cancelled = AtomicBool::new(false);
    let (tx, rx) = mpsc::channel::<WorkerMessage<T>>();

    std::thread::scope(|scope| {
        for _ in 0..worker_count {
            let tx = tx.clone();
            let next_index_ref = &next_index;
            let cancelled_ref = &cancelled;
            let task_ref = &task;
            scope.spawn(move || loop {
                if cancelled_ref.load(Ordering::Relaxed) {
                    break;
                }
                let slot = next_index_ref.fetch_add(1, Ordering::Relaxed);
                if slot >= task_count {
                    break;
                }
                if should_cancelled(should_cancel) {
                    cancelled_ref.store(true, Ordering::Relaxed);
                    let _ = tx.send(WorkerMessage::Fatal {
                        slot,
                        error: BacktestError::Worker(format!("cancelled before task {slot}")),
                    });
                    break;
                }

                let message = match run_guarded(task_ref, slot) {
                    Ok(value) => WorkerMessage::Done { slot, value },
                    Err(error) => {
                        cancelled_ref.store(true, Ordering::Relaxed);
                        WorkerMessage::Fatal { slot, error }
                    }
                };
                if tx.send(message).is_err() {
                    break;
                }
            });
        }

        drop(tx);

        let mut slots: Vec<Option<T>> = (0..task_count).map(|_| None).collect();
        let mut fatal: Option<(usize, BacktestError)> = None;
        while let Ok(message) = rx.recv() {
            match message {
                WorkerMessage::Done { slot, value } => slots[slot] = Some(value),
                WorkerMessage::Fatal { slot, error } => {
                    // Lowest failing slot wins so the reported error is stable.
                    if fatal.as_ref().map_or(true, |(first, _)| slot < *first) {
                        fatal = Some((slot, error));
                    }
                }
            }
        }

        if let Some((_, error)) = fatal {
            return Err(error);
        }
        slots
            .into_iter()
            .enumerate()
            .map(|(slot, value)| {
                value.ok_or_else(|| BacktestError::Worker(format!("task slot {slot} was not filled")))
            })
            .collect()
    })
}
