//! Task executors used by asynchronous dispatchers
//!
//! Dispatchers submit one boxed closure per delivery. An executor may run it
//! inline, on a dedicated worker pool, or on a tokio runtime's blocking pool.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::fmt::Debug;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;
use tracing::{debug, error, info};

/// Unit of work submitted by a dispatcher
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// The executor refused a task
#[derive(Debug, Clone, thiserror::Error)]
#[error("Executor '{executor}' rejected task: {reason}")]
pub struct TaskRejected {
    pub executor: String,
    pub reason: String,
}

pub trait TaskExecutor: Send + Sync + Debug {
    /// Schedule `task` for execution
    fn execute(&self, task: Task) -> Result<(), TaskRejected>;
}

/// Runs every task immediately in the submitting thread
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl TaskExecutor for InlineExecutor {
    fn execute(&self, task: Task) -> Result<(), TaskRejected> {
        task();
        Ok(())
    }
}

/// Fixed-size pool of named worker threads fed through a crossbeam channel
#[derive(Debug)]
pub struct ThreadPoolExecutor {
    name: String,
    sender: Mutex<Option<Sender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPoolExecutor {
    /// Start `workers` threads named `{name}-{index}`
    pub fn with_name(name: impl Into<String>, workers: usize) -> std::io::Result<Self> {
        let name = name.into();
        let workers = workers.max(1);
        let (sender, receiver) = unbounded::<Task>();

        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let receiver = receiver.clone();
            let thread_name = format!("{name}-{index}");
            let handle = std::thread::Builder::new()
                .name(thread_name)
                .spawn(move || Self::worker_loop(receiver))?;
            handles.push(handle);
        }

        info!(executor = %name, workers, "Thread pool started");
        Ok(Self {
            name,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(handles),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop accepting tasks, let queued tasks finish and join the workers.
    ///
    /// When called from one of the pool's own workers, that worker is
    /// detached instead of joined.
    pub fn shutdown(&self) {
        if self.sender.lock().take().is_none() {
            return;
        }
        let current = std::thread::current().id();
        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                error!(executor = %self.name, "Worker thread terminated abnormally");
            }
        }
        info!(executor = %self.name, "Thread pool stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.sender.lock().is_none()
    }

    fn worker_loop(receiver: Receiver<Task>) {
        while let Ok(task) = receiver.recv() {
            if catch_unwind(AssertUnwindSafe(task)).is_err() {
                let thread = std::thread::current();
                error!(worker = thread.name().unwrap_or("unnamed"), "Task panicked");
            }
        }
        debug!("Worker exiting");
    }
}

impl TaskExecutor for ThreadPoolExecutor {
    fn execute(&self, task: Task) -> Result<(), TaskRejected> {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            return Err(TaskRejected {
                executor: self.name.clone(),
                reason: "executor is shut down".to_string(),
            });
        };
        sender.send(task).map_err(|_| TaskRejected {
            executor: self.name.clone(),
            reason: "all workers have exited".to_string(),
        })
    }
}

impl Drop for ThreadPoolExecutor {
    fn drop(&mut self) {
        // Workers exit once the channel is closed and drained
        self.sender.lock().take();
    }
}

/// Runs tasks on a tokio runtime's blocking thread pool.
///
/// Handlers are synchronous and may block on channel capacity, so they are
/// never run on the async worker threads.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: tokio::runtime::Handle,
}

impl TokioExecutor {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Executor bound to the runtime of the calling context, if any
    pub fn current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

impl TaskExecutor for TokioExecutor {
    fn execute(&self, task: Task) -> Result<(), TaskRejected> {
        // Dropping the JoinHandle detaches the task
        drop(self.handle.spawn_blocking(task));
        Ok(())
    }
}
