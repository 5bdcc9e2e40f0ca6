use std::future::Future;
use std::thread;

use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{RemoteError, TaskError};
use crate::runtime::DispatcherHandle;

/// Schedules cooperative work from whatever thread the caller is on.
///
/// This is the only component that cares whether the caller sits on the
/// dispatcher, on a thread with its own runtime, or on a bare worker.
#[derive(Debug, Clone, Default)]
pub struct TaskBridge {
    dispatcher: Option<DispatcherHandle>,
}

impl TaskBridge {
    #[must_use]
    pub fn new(dispatcher: Option<DispatcherHandle>) -> Self {
        Self { dispatcher }
    }

    /// True while the dispatcher this bridge was built with has not shut down.
    #[must_use]
    pub fn dispatcher_live(&self) -> bool {
        self.live_dispatcher().is_some()
    }

    /// True when [`ScheduledTask::wait`] may block this thread: a dispatcher
    /// is live and the caller is neither on it nor inside any other runtime.
    #[must_use]
    pub fn can_block_current_thread(&self) -> bool {
        self.live_dispatcher().is_some_and(|dispatcher| {
            !dispatcher.is_dispatcher_thread() && Handle::try_current().is_err()
        })
    }

    /// Schedules `work` and returns immediately.
    ///
    /// With a live dispatcher the work is submitted cross-thread and the
    /// returned task can be waited on. Otherwise it is spawned on the caller's
    /// own runtime, or, with no runtime anywhere, run to completion on a
    /// throwaway thread whose failures are only logged.
    pub fn schedule<F, T>(&self, work: F) -> ScheduledTask<T>
    where
        F: Future<Output = Result<T, RemoteError>> + Send + 'static,
        T: Send + 'static,
    {
        if let Some(dispatcher) = self.live_dispatcher() {
            let (tx, rx) = oneshot::channel();
            dispatcher.runtime().spawn(async move {
                let _ = tx.send(work.await);
            });
            return ScheduledTask {
                inner: Scheduled::Dispatched {
                    receiver: rx,
                    dispatcher: dispatcher.clone(),
                },
            };
        }

        if let Ok(local) = Handle::try_current() {
            return ScheduledTask {
                inner: Scheduled::Local(local.spawn(work)),
            };
        }

        run_isolated(work);
        ScheduledTask {
            inner: Scheduled::Detached,
        }
    }

    fn live_dispatcher(&self) -> Option<&DispatcherHandle> {
        self.dispatcher
            .as_ref()
            .filter(|dispatcher| !dispatcher.is_closed())
    }
}

fn run_isolated<F, T>(work: F)
where
    F: Future<Output = Result<T, RemoteError>> + Send + 'static,
    T: Send + 'static,
{
    let spawned = thread::Builder::new()
        .name("coder-relay-isolated".to_string())
        .spawn(move || {
            let runtime = match Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(error) => {
                    tracing::warn!(%error, "failed to build isolated runtime; dropping task");
                    return;
                }
            };

            if let Err(error) = runtime.block_on(work) {
                tracing::warn!(%error, "isolated task failed with no dispatcher running");
            }
        });

    if let Err(error) = spawned {
        tracing::warn!(%error, "failed to spawn isolated task thread");
    }
}

/// Pending outcome of work handed to [`TaskBridge::schedule`].
///
/// Dropping it is fire-and-forget; the work still runs.
pub struct ScheduledTask<T> {
    inner: Scheduled<T>,
}

enum Scheduled<T> {
    Dispatched {
        receiver: oneshot::Receiver<Result<T, RemoteError>>,
        dispatcher: DispatcherHandle,
    },
    Local(JoinHandle<Result<T, RemoteError>>),
    Detached,
}

impl<T> ScheduledTask<T> {
    /// True when [`ScheduledTask::wait`] can produce the work's outcome.
    #[must_use]
    pub fn is_awaitable(&self) -> bool {
        matches!(self.inner, Scheduled::Dispatched { .. })
    }

    /// Blocks the calling thread until the dispatcher finishes the work.
    ///
    /// There is no timeout. Waiting from the dispatcher thread, or from any
    /// thread inside a runtime, is refused rather than deadlocking it.
    pub fn wait(self) -> Result<T, TaskError> {
        match self.inner {
            Scheduled::Dispatched {
                receiver,
                dispatcher,
            } => {
                if dispatcher.is_dispatcher_thread() || Handle::try_current().is_ok() {
                    return Err(TaskError::WaitOnDispatcherThread);
                }

                match receiver.blocking_recv() {
                    Ok(outcome) => outcome.map_err(TaskError::from),
                    Err(_) => Err(TaskError::DispatcherGone),
                }
            }
            Scheduled::Local(_) | Scheduled::Detached => Err(TaskError::NotAwaitable),
        }
    }

    /// Awaits the outcome from async code.
    pub async fn join(self) -> Result<T, TaskError> {
        match self.inner {
            Scheduled::Dispatched { receiver, .. } => match receiver.await {
                Ok(outcome) => outcome.map_err(TaskError::from),
                Err(_) => Err(TaskError::DispatcherGone),
            },
            Scheduled::Local(handle) => match handle.await {
                Ok(outcome) => outcome.map_err(TaskError::from),
                Err(_) => Err(TaskError::DispatcherGone),
            },
            Scheduled::Detached => Err(TaskError::NotAwaitable),
        }
    }
}
