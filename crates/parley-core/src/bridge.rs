// ABOUTME: Task bridge: schedules async work from sync callers onto a dedicated loop thread.
// ABOUTME: Tracks every submission until completion and supports bounded graceful shutdown.

use crate::error::{CoreError, Result};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

/// How often drain/wait loops re-check their condition.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// After cancelling stragglers, how long to let their completion watchers
/// record the cancellation before the loop is stopped.
const CANCEL_GRACE: Duration = Duration::from_millis(250);

/// Bounded wait for the loop thread to exit after it has been told to stop.
const JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// One in-flight unit of asynchronous work, tracked between submission and
/// completion. Removal happens exactly once: in the completion watcher, or
/// during forced shutdown once the loop can no longer run watchers.
struct PendingTask {
    name: String,
    abort: AbortHandle,
}

/// Why a submitted task did not produce a value.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("task was cancelled")]
    Cancelled,

    #[error("task failed: {0}")]
    Failed(String),

    #[error("timed out waiting for task")]
    Timeout,
}

/// Handle to one submitted task. The submitting thread can block on it with
/// [`TaskTicket::wait`] or await it with [`TaskTicket::join`]; dropping it
/// detaches from the task without cancelling it.
pub struct TaskTicket<T> {
    name: String,
    submitted_at: Instant,
    rx: oneshot::Receiver<std::result::Result<T, TaskError>>,
}

impl<T> TaskTicket<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn submitted_at(&self) -> Instant {
        self.submitted_at
    }

    /// Block the calling thread until the task finishes or `timeout` elapses.
    /// Must not be called from the loop thread itself.
    pub fn wait(mut self, timeout: Duration) -> std::result::Result<T, TaskError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.rx.try_recv() {
                Ok(outcome) => return outcome,
                // Sender dropped without a verdict: the loop was torn down
                // before the watcher ran, which only happens on forced stop.
                Err(oneshot::error::TryRecvError::Closed) => return Err(TaskError::Cancelled),
                Err(oneshot::error::TryRecvError::Empty) => {
                    if Instant::now() >= deadline {
                        return Err(TaskError::Timeout);
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
            }
        }
    }

    /// Await the task outcome from async context.
    pub async fn join(self) -> std::result::Result<T, TaskError> {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(TaskError::Cancelled),
        }
    }
}

/// Lifecycle of the bridge. Submissions are accepted in `NotStarted`
/// (triggering a lazy start) and `Running` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    NotStarted,
    Running,
    ShuttingDown,
    Stopped,
}

/// Handles owned by a running loop thread.
struct Driver {
    handle: Handle,
    stop: Option<oneshot::Sender<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
    done_rx: std::sync::mpsc::Receiver<()>,
}

struct Inner {
    phase: Phase,
    driver: Option<Driver>,
}

/// Bridge between synchronous callers and one shared cooperative scheduler.
///
/// A single background thread drives a current-thread tokio runtime; work is
/// handed across threads only through the runtime [`Handle`]. Every
/// submission is tracked in the pending set until its completion watcher
/// (running on the loop thread, strictly after the task body) removes it and
/// logs the outcome. Task panics are captured by the runtime and surface
/// only through the returned ticket, never to the submitting thread.
pub struct TaskBridge {
    inner: Mutex<Inner>,
    pending: Arc<Mutex<HashMap<u64, PendingTask>>>,
    next_id: AtomicU64,
}

impl Default for TaskBridge {
    fn default() -> Self {
        Self::new()
    }
}

/// Lock the pending set, recovering from poisoning: the completion watcher
/// must never panic, so a poisoned map is still usable state.
fn lock_pending(pending: &Mutex<HashMap<u64, PendingTask>>) -> MutexGuard<'_, HashMap<u64, PendingTask>> {
    match pending.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl TaskBridge {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                phase: Phase::NotStarted,
                driver: None,
            }),
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Number of tasks currently tracked between submission and completion.
    pub fn pending_count(&self) -> usize {
        lock_pending(&self.pending).len()
    }

    /// Start the scheduling loop on its own thread if not already running.
    /// Idempotent; concurrent callers race on one lock and only the first
    /// creates a loop.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.lock_inner();
        self.start_locked(&mut inner)
    }

    fn start_locked(&self, inner: &mut Inner) -> Result<()> {
        if inner.phase != Phase::NotStarted {
            debug!("task bridge already started");
            return Ok(());
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| CoreError::Internal(format!("failed to build scheduler runtime: {e}")))?;
        let handle = runtime.handle().clone();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("parley-task-bridge".to_string())
            .spawn(move || {
                // Park on the stop signal; spawned tasks run while we block.
                // The channel erroring out (bridge dropped) also stops the loop.
                runtime.block_on(async {
                    let _ = stop_rx.await;
                });
                // Drop the runtime without waiting on tasks that ignored
                // cancellation; they have already been aborted by shutdown.
                runtime.shutdown_timeout(Duration::from_millis(100));
                let _ = done_tx.send(());
            })
            .map_err(|e| CoreError::Internal(format!("failed to spawn loop thread: {e}")))?;

        inner.phase = Phase::Running;
        inner.driver = Some(Driver {
            handle,
            stop: Some(stop_tx),
            thread: Some(thread),
            done_rx,
        });

        info!("task bridge started");
        Ok(())
    }

    /// Schedule `future` onto the loop from any thread.
    ///
    /// Fails once shutdown has been initiated. Starts the loop lazily on
    /// first use. Returns immediately with a ticket the caller may wait on;
    /// the task itself is tracked in the pending set until its completion
    /// watcher removes it.
    pub fn submit<F>(&self, future: F, name: Option<&str>) -> Result<TaskTicket<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let handle = {
            let mut inner = self.lock_inner();
            match inner.phase {
                Phase::ShuttingDown | Phase::Stopped => return Err(CoreError::ShuttingDown),
                Phase::NotStarted => self.start_locked(&mut inner)?,
                Phase::Running => {}
            }
            // Driver is always present in Running.
            match inner.driver.as_ref() {
                Some(driver) => driver.handle.clone(),
                None => return Err(CoreError::Internal("loop running without driver".into())),
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let task_name = name
            .map(str::to_string)
            .unwrap_or_else(|| format!("task-{id}"));
        let submitted_at = Instant::now();

        debug!(task = %task_name, "submitting task");

        let join = handle.spawn(future);
        let abort = join.abort_handle();
        lock_pending(&self.pending).insert(
            id,
            PendingTask {
                name: task_name.clone(),
                abort,
            },
        );

        let (tx, rx) = oneshot::channel();
        let pending = Arc::clone(&self.pending);
        let watcher_name = task_name.clone();
        // Completion watcher: runs on the loop thread strictly after the
        // task finishes, cancels, or panics. It must never panic itself.
        handle.spawn(async move {
            let outcome = join.await;
            let removed = lock_pending(&pending).remove(&id);
            let elapsed = submitted_at.elapsed();

            if removed.is_some() {
                match &outcome {
                    Ok(_) => info!(
                        task = %watcher_name,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "task completed successfully"
                    ),
                    Err(e) if e.is_cancelled() => warn!(
                        task = %watcher_name,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "task was cancelled"
                    ),
                    Err(e) => error!(
                        task = %watcher_name,
                        elapsed_ms = elapsed.as_millis() as u64,
                        error = %e,
                        "task failed"
                    ),
                }
            }

            let _ = tx.send(outcome.map_err(|e| {
                if e.is_cancelled() {
                    TaskError::Cancelled
                } else {
                    TaskError::Failed(e.to_string())
                }
            }));
        });

        Ok(TaskTicket {
            name: task_name,
            submitted_at,
            rx,
        })
    }

    /// Shut the bridge down, waiting up to `timeout` for pending tasks to
    /// drain. Tasks still pending after the timeout are cancelled. The loop
    /// is then stopped and its thread joined with a bounded wait. Idempotent
    /// past the first call; a no-op if the loop never started. Never panics.
    pub fn shutdown(&self, timeout: Duration) {
        let driver = {
            let mut inner = self.lock_inner();
            match inner.phase {
                Phase::NotStarted => {
                    inner.phase = Phase::Stopped;
                    return;
                }
                Phase::ShuttingDown | Phase::Stopped => return,
                Phase::Running => {}
            }
            inner.phase = Phase::ShuttingDown;
            inner.driver.take()
        };

        let Some(mut driver) = driver else {
            self.lock_inner().phase = Phase::Stopped;
            return;
        };

        info!("shutting down task bridge");

        // Wait for pending tasks to complete, up to the timeout.
        let deadline = Instant::now() + timeout;
        loop {
            let count = self.pending_count();
            if count == 0 {
                break;
            }
            if Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        // Cancel whatever is left.
        let cancelled = {
            let guard = lock_pending(&self.pending);
            for task in guard.values() {
                task.abort.abort();
            }
            guard.len()
        };

        if cancelled > 0 {
            warn!(count = cancelled, "cancelling incomplete tasks");
            // Let the completion watchers record the cancellations.
            let grace_deadline = Instant::now() + CANCEL_GRACE;
            while Instant::now() < grace_deadline {
                if self.pending_count() == 0 {
                    break;
                }
                std::thread::sleep(POLL_INTERVAL);
            }
        }

        // Stop the loop and join its thread with a bounded wait.
        if let Some(stop) = driver.stop.take() {
            let _ = stop.send(());
        }
        match driver.done_rx.recv_timeout(JOIN_TIMEOUT) {
            Ok(()) => {
                if let Some(thread) = driver.thread.take() {
                    let _ = thread.join();
                }
            }
            Err(_) => {
                warn!("loop thread did not stop in time; detaching");
            }
        }

        // Watchers can no longer run; clear anything they did not get to.
        let leftover = {
            let mut guard = lock_pending(&self.pending);
            let names: Vec<String> = guard.values().map(|t| t.name.clone()).collect();
            guard.clear();
            names
        };
        for name in leftover {
            warn!(task = %name, "task dropped at shutdown");
        }

        self.lock_inner().phase = Phase::Stopped;
        info!("task bridge shutdown complete");
    }
}
