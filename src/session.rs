//! Holds the assistant session that runs are executed against.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use assistant_session::{AssistantSession, CoderProfile};

/// Registration token returned by [`SessionRegistry::register_observer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type KindObserver = Arc<dyn Fn(&CoderProfile) + Send + Sync>;

/// The currently installed session plus listeners for kind changes.
///
/// Observers run synchronously on the thread calling [`SessionRegistry::install`].
pub struct SessionRegistry {
    current: Mutex<Arc<dyn AssistantSession>>,
    observers: Mutex<Vec<(ObserverId, KindObserver)>>,
    next_observer_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new(session: Arc<dyn AssistantSession>) -> Self {
        Self {
            current: Mutex::new(session),
            observers: Mutex::new(Vec::new()),
            next_observer_id: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn current(&self) -> Arc<dyn AssistantSession> {
        Arc::clone(&lock_unpoisoned(&self.current))
    }

    /// Replaces the session. Observers fire only if the coder kind differs.
    ///
    /// Returns whether the kind changed.
    pub fn install(&self, session: Arc<dyn AssistantSession>) -> bool {
        let profile = session.profile();
        let previous = {
            let mut current = lock_unpoisoned(&self.current);
            std::mem::replace(&mut *current, session)
        };

        if previous.profile().kind == profile.kind {
            return false;
        }

        tracing::debug!(kind = %profile.kind, edit_format = %profile.edit_format, "coder kind changed");
        let observers: Vec<KindObserver> = lock_unpoisoned(&self.observers)
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in observers {
            observer(&profile);
        }

        true
    }

    pub fn register_observer<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&CoderProfile) + Send + Sync + 'static,
    {
        let id = ObserverId(self.next_observer_id.fetch_add(1, Ordering::SeqCst));
        lock_unpoisoned(&self.observers).push((id, Arc::new(observer)));
        id
    }

    /// Returns false if `id` was not registered.
    pub fn unregister_observer(&self, id: ObserverId) -> bool {
        let mut observers = lock_unpoisoned(&self.observers);
        let before = observers.len();
        observers.retain(|(registered, _)| *registered != id);
        observers.len() != before
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use assistant_session_mock::MockSession;

    use super::*;

    fn session(kind: &str) -> Arc<dyn AssistantSession> {
        Arc::new(MockSession::with_profile(
            CoderProfile::new(kind, "diff"),
            Vec::new(),
        ))
    }

    #[test]
    fn observers_fire_only_when_kind_changes() {
        let registry = SessionRegistry::new(session("EditBlockCoder"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        registry.register_observer(move |profile| {
            sink.lock().expect("seen lock").push(profile.kind.clone());
        });

        assert!(!registry.install(session("EditBlockCoder")));
        assert!(registry.install(session("AskCoder")));
        assert!(!registry.install(session("AskCoder")));

        assert_eq!(*seen.lock().expect("seen lock"), vec!["AskCoder".to_string()]);
        assert_eq!(registry.current().profile().kind, "AskCoder");
    }

    #[test]
    fn unregistered_observers_are_not_called() {
        let registry = SessionRegistry::new(session("EditBlockCoder"));
        let calls = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&calls);
        let id = registry.register_observer(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(registry.unregister_observer(id));
        assert!(!registry.unregister_observer(id));
        registry.install(session("ArchitectCoder"));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
