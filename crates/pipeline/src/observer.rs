use crate::pipeline::FetchError;
use pipeline_types::DownloadMetadata;
use std::sync::{Arc, PoisonError, RwLock};
use url::Url;

/// Listener for download lifecycle events. Observers never take part in
/// fetch control flow.
///
/// Every `download_started` is followed by exactly one `download_finished`
/// or `download_failed` for the same URL.
pub trait PipelineObserver: Send + Sync {
    fn download_started(&self, _url: &Url) {}

    fn download_finished(&self, _metadata: &DownloadMetadata) {}

    fn download_failed(&self, _url: &Url, _error: &FetchError) {}
}

fn same_observer(a: &Arc<dyn PipelineObserver>, b: &Arc<dyn PipelineObserver>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Registered observers, notified synchronously in registration order.
#[derive(Clone, Default)]
pub struct ObserverRegistry {
    observers: Arc<RwLock<Vec<Arc<dyn PipelineObserver>>>>,
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("len", &self.len())
            .finish()
    }
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adding the same observer twice is a no-op.
    pub fn add(&self, observer: Arc<dyn PipelineObserver>) {
        let mut observers = self.observers.write().unwrap_or_else(PoisonError::into_inner);
        if !observers.iter().any(|existing| same_observer(existing, &observer)) {
            observers.push(observer);
        }
    }

    pub fn remove(&self, observer: &Arc<dyn PipelineObserver>) -> bool {
        let mut observers = self.observers.write().unwrap_or_else(PoisonError::into_inner);
        let before = observers.len();
        observers.retain(|existing| !same_observer(existing, observer));
        observers.len() != before
    }

    pub fn len(&self) -> usize {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Callbacks run on a snapshot so observers may add or remove observers.
    fn snapshot(&self) -> Vec<Arc<dyn PipelineObserver>> {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn download_started(&self, url: &Url) {
        for observer in self.snapshot() {
            observer.download_started(url);
        }
    }

    pub fn download_finished(&self, metadata: &DownloadMetadata) {
        for observer in self.snapshot() {
            observer.download_finished(metadata);
        }
    }

    pub fn download_failed(&self, url: &Url, error: &FetchError) {
        for observer in self.snapshot() {
            observer.download_failed(url, error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_types::Dimensions;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        name: &'static str,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl PipelineObserver for Recorder {
        fn download_started(&self, url: &Url) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{} started {}", self.name, url));
        }

        fn download_finished(&self, metadata: &DownloadMetadata) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{} finished {}", self.name, metadata.byte_size));
        }
    }

    struct Silent;

    impl PipelineObserver for Silent {}

    fn url() -> Url {
        Url::parse("https://example.com/a.png").unwrap()
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let registry = ObserverRegistry::new();
        registry.add(Arc::new(Recorder {
            name: "first",
            calls: calls.clone(),
        }));
        registry.add(Arc::new(Recorder {
            name: "second",
            calls: calls.clone(),
        }));
        registry.add(Arc::new(Silent));

        registry.download_started(&url());
        registry.download_finished(&DownloadMetadata::new(url(), 10, Dimensions::new(1, 1)));
        registry.download_failed(&url(), &FetchError::Cancelled);

        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                "first started https://example.com/a.png",
                "second started https://example.com/a.png",
                "first finished 10",
                "second finished 10",
            ]
        );
    }

    #[test]
    fn test_add_is_idempotent_and_remove_by_identity() {
        let registry = ObserverRegistry::new();
        let observer: Arc<dyn PipelineObserver> = Arc::new(Silent);
        let other: Arc<dyn PipelineObserver> = Arc::new(Silent);

        registry.add(observer.clone());
        registry.add(observer.clone());
        registry.add(other.clone());
        assert_eq!(registry.len(), 2);

        assert!(registry.remove(&observer));
        assert!(!registry.remove(&observer));
        assert_eq!(registry.len(), 1);
    }
}
