use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;

/// Shared reference to the process's cooperative dispatcher.
///
/// Cloning is cheap. Only [`Dispatcher::spawn`] creates one, so the liveness
/// flag always flips once the owning [`Dispatcher`] stops or is dropped;
/// schedulers then degrade instead of submitting into a dead loop.
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    runtime: Handle,
    thread_id: ThreadId,
    closed: Arc<AtomicBool>,
}

impl DispatcherHandle {
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// True when called from the thread that drives this dispatcher.
    #[must_use]
    pub fn is_dispatcher_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Spawns a long-lived task (accept loops, connection readers) onto the dispatcher.
    pub fn spawn<F>(&self, future: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.runtime.spawn(future)
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.runtime
    }
}

/// Owns a single-threaded tokio runtime driven on a dedicated thread.
pub struct Dispatcher {
    handle: DispatcherHandle,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Dispatcher {
    /// Builds the runtime and starts driving it on `coder-relay-dispatcher`.
    pub fn spawn() -> io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let runtime_handle = runtime.handle().clone();
        let closed = Arc::new(AtomicBool::new(false));
        let closed_on_exit = Arc::clone(&closed);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let thread = thread::Builder::new()
            .name("coder-relay-dispatcher".to_string())
            .spawn(move || {
                runtime.block_on(async {
                    let _ = shutdown_rx.await;
                });
                closed_on_exit.store(true, Ordering::SeqCst);
                drop(runtime);
            })?;

        let handle = DispatcherHandle {
            runtime: runtime_handle,
            thread_id: thread.thread().id(),
            closed,
        };

        Ok(Self {
            handle,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    #[must_use]
    pub fn handle(&self) -> DispatcherHandle {
        self.handle.clone()
    }

    /// Stops the loop and joins its thread. Pending tasks are dropped.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.handle.closed.store(true, Ordering::SeqCst);

        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }

        if let Some(thread) = self.thread.take() {
            if thread.thread().id() != thread::current().id() {
                let _ = thread.join();
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
