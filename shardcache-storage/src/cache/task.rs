//! Single-resolution retrieval task.
//!
//! A task moves from `Pending` to exactly one of `Succeeded`, `Failed` or
//! `Cancelled`. Every transition goes through one compare-and-set on the
//! state byte, so a cancel racing a real completion leaves exactly one of
//! them in effect and the loser is discarded without a trace.

use parking_lot::Mutex;
use shardcache_core::RetrievalError;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;

const PENDING: u8 = 0;
const SUCCEEDED: u8 = 1;
const FAILED: u8 = 2;
const CANCELLED: u8 = 3;

/// Observable state of a [`RetrievalTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Pending,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            PENDING => TaskState::Pending,
            SUCCEEDED => TaskState::Succeeded,
            FAILED => TaskState::Failed,
            _ => TaskState::Cancelled,
        }
    }

    pub fn is_terminal(self) -> bool {
        self != TaskState::Pending
    }
}

type Outcome<T> = Option<Result<T, RetrievalError>>;

enum Handler<T> {
    Success(Box<dyn FnOnce(&T) + Send>),
    Error(Box<dyn FnOnce(&RetrievalError) + Send>),
}

impl<T> Handler<T> {
    fn run(self, result: &Result<T, RetrievalError>) {
        match (self, result) {
            (Handler::Success(handler), Ok(value)) => handler(value),
            (Handler::Error(handler), Err(error)) => handler(error),
            _ => {}
        }
    }
}

enum Handlers<T> {
    Open(Vec<Handler<T>>),
    Drained,
}

struct TaskInner<T> {
    state: AtomicU8,
    deadline: Instant,
    outcome: watch::Sender<Outcome<T>>,
    /// Also serialises publication of the outcome against handler registration.
    handlers: Mutex<Handlers<T>>,
}

/// Handle to an asynchronous retrieval.
///
/// Clones share one underlying task. Completion may be driven from any
/// thread; it never blocks beyond a short internal lock.
///
/// Do not `wait()` on a task from the context that feeds gateway events into
/// the registry: that context may be the one that would complete it.
pub struct RetrievalTask<T> {
    inner: Arc<TaskInner<T>>,
}

impl<T> Clone for RetrievalTask<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for RetrievalTask<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrievalTask")
            .field(
                "state",
                &TaskState::from_raw(self.inner.state.load(Ordering::Acquire)),
            )
            .field("deadline", &self.inner.deadline)
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> RetrievalTask<T> {
    /// Create a pending task that should resolve by `deadline`.
    ///
    /// The task does not enforce the deadline itself; whoever drives it
    /// fails it with [`RetrievalError::Timeout`] when the deadline passes.
    pub fn new(deadline: Instant) -> Self {
        let (outcome, _) = watch::channel(None);
        Self {
            inner: Arc::new(TaskInner {
                state: AtomicU8::new(PENDING),
                deadline,
                outcome,
                handlers: Mutex::new(Handlers::Open(Vec::new())),
            }),
        }
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_raw(self.inner.state.load(Ordering::Acquire))
    }

    pub fn is_done(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn deadline(&self) -> Instant {
        self.inner.deadline
    }

    /// Resolve with a value. Returns false if the task was already resolved.
    pub fn succeed(&self, value: T) -> bool {
        self.complete(Ok(value))
    }

    /// Resolve with an error. Returns false if the task was already resolved.
    pub fn fail(&self, error: RetrievalError) -> bool {
        self.complete(Err(error))
    }

    /// Resolve with `result`. Returns false if the task was already resolved.
    pub fn complete(&self, result: Result<T, RetrievalError>) -> bool {
        let target = if result.is_ok() { SUCCEEDED } else { FAILED };
        self.transition(target, result)
    }

    /// Cancel a pending task.
    ///
    /// Returns false if the task had already resolved, in which case nothing
    /// changes. After a successful cancel no registered handler runs and
    /// waiters see [`RetrievalError::Cancelled`]. The underlying transport
    /// request is not stopped.
    pub fn cancel(&self) -> bool {
        self.transition(CANCELLED, Err(RetrievalError::Cancelled))
    }

    fn transition(&self, target: u8, result: Result<T, RetrievalError>) -> bool {
        let drained = {
            let mut handlers = self.inner.handlers.lock();
            if self
                .inner
                .state
                .compare_exchange(PENDING, target, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return false;
            }
            self.inner.outcome.send_replace(Some(result.clone()));
            std::mem::replace(&mut *handlers, Handlers::Drained)
        };

        if target != CANCELLED {
            if let Handlers::Open(pending) = drained {
                for handler in pending {
                    handler.run(&result);
                }
            }
        }
        true
    }

    /// The result, if the task has resolved. Never blocks.
    pub fn outcome(&self) -> Option<Result<T, RetrievalError>> {
        self.inner.outcome.borrow().clone()
    }

    /// Run `handler` with the value once the task succeeds.
    ///
    /// On an already-succeeded task the handler runs immediately on the
    /// calling thread. It never runs for a failed or cancelled task.
    pub fn on_success<F>(&self, handler: F) -> &Self
    where
        F: FnOnce(&T) + Send + 'static,
    {
        self.register(Handler::Success(Box::new(handler)));
        self
    }

    /// Run `handler` with the error once the task fails.
    ///
    /// Not run for a cancelled task.
    pub fn on_error<F>(&self, handler: F) -> &Self
    where
        F: FnOnce(&RetrievalError) + Send + 'static,
    {
        self.register(Handler::Error(Box::new(handler)));
        self
    }

    fn register(&self, handler: Handler<T>) {
        {
            let mut handlers = self.inner.handlers.lock();
            if let Handlers::Open(pending) = &mut *handlers {
                pending.push(handler);
                return;
            }
        }
        if self.state() == TaskState::Cancelled {
            return;
        }
        if let Some(result) = self.outcome() {
            handler.run(&result);
        }
    }

    /// Wait for the task to resolve.
    pub async fn wait(&self) -> Result<T, RetrievalError> {
        let mut receiver = self.inner.outcome.subscribe();
        let outcome = receiver
            .wait_for(Option::is_some)
            .await
            .map(|outcome| (*outcome).clone());
        match outcome {
            Ok(Some(result)) => result,
            // the sender lives as long as `self`
            _ => Err(RetrievalError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    fn task() -> RetrievalTask<u32> {
        RetrievalTask::new(Instant::now() + Duration::from_secs(10))
    }

    #[test]
    fn test_terminal_state_is_final() {
        let task = task();
        assert_eq!(task.state(), TaskState::Pending);
        assert!(task.outcome().is_none());

        assert!(task.succeed(7));
        assert!(!task.fail(RetrievalError::Cancelled));
        assert!(!task.cancel());
        assert!(!task.succeed(8));

        assert_eq!(task.state(), TaskState::Succeeded);
        assert_eq!(task.outcome(), Some(Ok(7)));
    }

    #[test]
    fn test_fail_records_error() {
        let task = task();
        let error = RetrievalError::Timeout {
            after: Duration::from_secs(10),
        };
        assert!(task.fail(error.clone()));
        assert_eq!(task.state(), TaskState::Failed);
        assert_eq!(task.outcome(), Some(Err(error)));
    }

    #[test]
    fn test_handlers_fire_once_on_completion() {
        let task = task();
        let successes = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(AtomicUsize::new(0));

        let s = Arc::clone(&successes);
        let e = Arc::clone(&errors);
        task.on_success(move |value| {
            assert_eq!(*value, 3);
            s.fetch_add(1, Ordering::SeqCst);
        })
        .on_error(move |_| {
            e.fetch_add(1, Ordering::SeqCst);
        });

        task.succeed(3);
        task.succeed(4);
        assert_eq!(successes.load(Ordering::SeqCst), 1);
        assert_eq!(errors.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_late_handler_runs_immediately() {
        let task = task();
        task.fail(RetrievalError::RemoteFailure {
            reason: "boom".to_string(),
        });

        let errors = Arc::new(AtomicUsize::new(0));
        let e = Arc::clone(&errors);
        task.on_error(move |error| {
            assert!(matches!(error, RetrievalError::RemoteFailure { .. }));
            e.fetch_add(1, Ordering::SeqCst);
        });
        task.on_success(|_| panic!("success handler on failed task"));
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_suppresses_handlers() {
        let task = task();
        task.on_success(|_| panic!("ran after cancel"));
        task.on_error(|_| panic!("ran after cancel"));

        assert!(task.cancel());
        assert!(!task.succeed(1));
        task.on_error(|_| panic!("ran after cancel"));

        assert_eq!(task.state(), TaskState::Cancelled);
        assert_eq!(task.outcome(), Some(Err(RetrievalError::Cancelled)));
    }

    #[tokio::test]
    async fn test_wait_resolves_after_completion() {
        let task = task();
        let remote = task.clone();
        let waiter = tokio::spawn(async move { remote.wait().await });

        tokio::task::yield_now().await;
        task.succeed(42);
        assert_eq!(waiter.await.unwrap(), Ok(42));
        assert_eq!(task.wait().await, Ok(42));
    }

    #[tokio::test]
    async fn test_wait_sees_cancellation() {
        let task = task();
        task.cancel();
        assert_eq!(task.wait().await, Err(RetrievalError::Cancelled));
    }

    #[test]
    fn test_cancel_races_completion_exactly_once() {
        for round in 0..500u32 {
            let task = task();
            let fired = Arc::new(AtomicUsize::new(0));
            let f = Arc::clone(&fired);
            task.on_success(move |_| {
                f.fetch_add(1, Ordering::SeqCst);
            });

            let barrier = Arc::new(Barrier::new(2));
            let completer = {
                let task = task.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    task.succeed(round)
                })
            };
            let canceller = {
                let task = task.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    task.cancel()
                })
            };

            let completed = completer.join().unwrap();
            let cancelled = canceller.join().unwrap();
            assert!(completed ^ cancelled, "round {}: both or neither won", round);

            match task.state() {
                TaskState::Succeeded => {
                    assert!(completed);
                    assert_eq!(task.outcome(), Some(Ok(round)));
                    assert_eq!(fired.load(Ordering::SeqCst), 1);
                }
                TaskState::Cancelled => {
                    assert!(cancelled);
                    assert_eq!(task.outcome(), Some(Err(RetrievalError::Cancelled)));
                    assert_eq!(fired.load(Ordering::SeqCst), 0);
                }
                other => panic!("round {}: unexpected state {:?}", round, other),
            }
        }
    }
}
