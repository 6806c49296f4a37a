use shared::{
    error::ControllerError,
    observable::{Observable, Unsubscriber},
};

/// Routes controller failures to error observers.
///
/// A failure is surfaced to the caller as `Err` only while nobody is
/// subscribed; with at least one observer attached it is notified and
/// swallowed.
#[derive(Debug, Clone, Default)]
pub struct ErrorRouter {
    errors: Observable<ControllerError>,
}

impl ErrorRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, observer: F) -> Unsubscriber
    where
        F: Fn(&ControllerError) + Send + Sync + 'static,
    {
        self.errors.subscribe(observer)
    }

    pub fn observer_count(&self) -> usize {
        self.errors.subscribers_count()
    }

    pub fn throws_on_error(&self) -> bool {
        self.observer_count() == 0
    }

    pub fn route(&self, error: ControllerError) -> Result<(), ControllerError> {
        self.errors.notify(&error);
        if self.throws_on_error() {
            Err(error)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;

    #[test]
    fn surfaces_errors_without_observers() {
        let router = ErrorRouter::new();
        assert!(router.throws_on_error());
        assert_eq!(
            router.route(ControllerError::new("boom")),
            Err(ControllerError::new("boom"))
        );
    }

    #[test]
    fn observed_errors_are_notified_and_swallowed() {
        let router = ErrorRouter::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let subscription = router.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(router.route(ControllerError::new("boom")), Ok(()));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        subscription.unsubscribe();
        assert!(router.route(ControllerError::new("again")).is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
