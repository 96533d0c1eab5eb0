//! Single-worker executors
//!
//! A [`SerialQueue`] runs submitted jobs one at a time, in submission order,
//! on a dedicated named thread. It serializes cache mutations, delivers
//! completion callbacks off the caller's worker threads and guarantees at
//! most one concurrent mapping per queue.
//!
//! Copyright (c) 2025 Mapkit Team
//! Licensed under the Apache-2.0 license

use crate::error::{Error, Result};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Label of the default completion queue
pub const DEFAULT_CALLBACK_QUEUE_LABEL: &str = "mapkit.callbacks";

/// A serial executor backed by one worker thread.
///
/// Cloning shares the same worker. The worker exits once every clone has
/// been dropped and the backlog is drained.
#[derive(Clone)]
pub struct SerialQueue {
    label: Arc<str>,
    sender: mpsc::UnboundedSender<Job>,
}

impl SerialQueue {
    /// Spawn a new queue with its worker thread
    pub fn new(label: impl Into<String>) -> Result<Self> {
        let label: String = label.into();
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        let worker_label = label.clone();
        std::thread::Builder::new()
            .name(label.clone())
            .spawn(move || {
                while let Some(job) = receiver.blocking_recv() {
                    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                        log::error!("Job on queue '{}' panicked", worker_label);
                    }
                }
                log::trace!("Queue '{}' drained and stopped", worker_label);
            })
            .map_err(|e| Error::Configuration {
                message: format!("cannot spawn worker for queue '{}'", label),
                source: Some(e.into()),
            })?;
        Ok(Self {
            label: label.into(),
            sender,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Submit a job without waiting for it
    pub fn dispatch<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.sender.send(Box::new(job)).is_err() {
            log::warn!("Queue '{}' is no longer running; job dropped", self.label);
        }
    }

    /// Submit a job and block until it has run, returning its output.
    ///
    /// Must not be called from a job running on this same queue.
    pub fn dispatch_and_wait<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.dispatch(move || {
            let _ = tx.send(job());
        });
        rx.blocking_recv().map_err(|_| Error::Internal {
            message: format!("job on queue '{}' did not complete", self.label),
            source: anyhow::anyhow!("worker dropped the result channel"),
        })
    }
}

impl std::fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialQueue").field("label", &self.label).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_jobs_run_in_submission_order() {
        let queue = SerialQueue::new("test.order").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..20 {
            let seen = seen.clone();
            queue.dispatch(move || seen.lock().unwrap().push(i));
        }
        queue.dispatch_and_wait(|| ()).unwrap();
        assert_eq!(*seen.lock().unwrap(), (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_dispatch_and_wait_returns_output() {
        let queue = SerialQueue::new("test.wait").unwrap();
        assert_eq!(queue.dispatch_and_wait(|| 6 * 7).unwrap(), 42);
        assert_eq!(queue.label(), "test.wait");
    }

    #[test]
    fn test_panicking_job_does_not_stop_queue() {
        let queue = SerialQueue::new("test.panic").unwrap();
        queue.dispatch(|| panic!("boom"));
        assert_eq!(queue.dispatch_and_wait(|| "still alive").unwrap(), "still alive");
    }

    #[test]
    fn test_runs_on_named_thread() {
        let queue = SerialQueue::new("test.thread-name").unwrap();
        let name = queue
            .dispatch_and_wait(|| std::thread::current().name().map(str::to_string))
            .unwrap();
        assert_eq!(name.as_deref(), Some("test.thread-name"));
    }
}
