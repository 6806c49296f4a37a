//! In-process multi-subscriber event channel with synchronous delivery.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Subscribers<E> {
    next_id: u64,
    entries: Vec<(u64, Callback<E>)>,
}

/// Observers run on the notifying thread, in subscription order, before
/// [`Observable::notify`] returns. The subscriber list is snapshotted per
/// notification so observers may subscribe or unsubscribe re-entrantly.
pub struct Observable<E> {
    inner: Arc<Mutex<Subscribers<E>>>,
}

impl<E> Clone for Observable<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: 'static> Default for Observable<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Observable<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("subscribers", &lock(&self.inner).entries.len())
            .finish()
    }
}

impl<E: 'static> Observable<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Subscribers {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    pub fn subscribe<F>(&self, observer: F) -> Unsubscriber
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = {
            let mut subscribers = lock(&self.inner);
            let id = subscribers.next_id;
            subscribers.next_id += 1;
            subscribers.entries.push((id, Arc::new(observer)));
            id
        };

        let registry: Weak<Mutex<Subscribers<E>>> = Arc::downgrade(&self.inner);
        Unsubscriber::new(move || {
            if let Some(registry) = registry.upgrade() {
                lock(&registry).entries.retain(|(entry_id, _)| *entry_id != id);
            }
        })
    }

    pub fn notify(&self, event: &E) {
        let observers: Vec<Callback<E>> = lock(&self.inner)
            .entries
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for observer in observers {
            observer(event);
        }
    }

    pub fn subscribers_count(&self) -> usize {
        lock(&self.inner).entries.len()
    }
}

fn lock<E>(inner: &Mutex<Subscribers<E>>) -> MutexGuard<'_, Subscribers<E>> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

type Release = Box<dyn FnOnce() + Send + Sync>;

/// Handle returned by every `subscribe`/`on_*` call.
///
/// Dropping it keeps the subscription alive; call [`Unsubscriber::unsubscribe`]
/// to detach. Repeated calls are no-ops.
pub struct Unsubscriber {
    release: Mutex<Option<Release>>,
}

impl Unsubscriber {
    pub fn new<F>(release: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            release: Mutex::new(Some(Box::new(release))),
        }
    }

    pub fn unsubscribe(&self) {
        let release = self
            .release
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(release) = release {
            release();
        }
    }

    pub fn is_active(&self) -> bool {
        self.release
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl fmt::Debug for Unsubscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscriber")
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn delivers_to_every_subscriber_synchronously() {
        let channel = Observable::<u32>::new();
        let total = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let total = Arc::clone(&total);
            channel.subscribe(move |value| {
                total.fetch_add(*value as usize, Ordering::SeqCst);
            });
        }

        channel.notify(&2);
        assert_eq!(total.load(Ordering::SeqCst), 6);
        assert_eq!(channel.subscribers_count(), 3);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let channel = Observable::<()>::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let first = channel.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let _second = channel.subscribe(|_| {});

        first.unsubscribe();
        first.unsubscribe();
        channel.notify(&());

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(channel.subscribers_count(), 1);
        assert!(!first.is_active());
    }

    #[test]
    fn clones_share_subscribers() {
        let channel = Observable::<&'static str>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        channel.subscribe(move |event| sink.lock().expect("sink").push(*event));

        channel.clone().notify(&"from clone");
        assert_eq!(*seen.lock().expect("seen"), vec!["from clone"]);
    }

    #[test]
    fn observers_may_unsubscribe_while_being_notified() {
        let channel = Observable::<()>::new();
        let handle: Arc<Mutex<Option<Unsubscriber>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&handle);
        let unsubscriber = channel.subscribe(move |_| {
            if let Some(handle) = slot.lock().expect("slot").as_ref() {
                handle.unsubscribe();
            }
        });
        *handle.lock().expect("handle") = Some(unsubscriber);

        channel.notify(&());
        assert_eq!(channel.subscribers_count(), 0);
    }

    #[test]
    fn unsubscribing_after_channel_dropped_is_harmless() {
        let channel = Observable::<()>::new();
        let unsubscriber = channel.subscribe(|_| {});
        drop(channel);
        unsubscriber.unsubscribe();
    }
}
