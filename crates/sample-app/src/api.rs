//! Remote API client notifications.

use std::{future::Future, sync::Arc};

/// Told when the API client begins and ends a unit of work.
pub trait ApiDelegate: Send + Sync {
    fn work_started(&self);
    fn work_finished(&self);
}

#[derive(Clone, Default)]
pub struct ApiClient {
    delegate: Option<Arc<dyn ApiDelegate>>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("has_delegate", &self.delegate.is_some())
            .finish()
    }
}

/// Pairs `work_started` with `work_finished` even if the work is dropped.
struct WorkGuard<'a>(&'a dyn ApiDelegate);

impl Drop for WorkGuard<'_> {
    fn drop(&mut self) {
        self.0.work_finished();
    }
}

impl ApiClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn ApiDelegate>) {
        self.delegate = Some(delegate);
    }

    pub fn delegate(&self) -> Option<&Arc<dyn ApiDelegate>> {
        self.delegate.as_ref()
    }

    /// Runs `work`, bracketing it with delegate notifications.
    pub async fn perform<F, T>(&self, work: F) -> T
    where
        F: Future<Output = T>,
    {
        let _guard = self.delegate.as_deref().map(|delegate| {
            delegate.work_started();
            WorkGuard(delegate)
        });

        work.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<&'static str>>);

    impl ApiDelegate for Recorder {
        fn work_started(&self) {
            self.0.lock().unwrap().push("started");
        }

        fn work_finished(&self) {
            self.0.lock().unwrap().push("finished");
        }
    }

    #[tokio::test]
    async fn test_work_is_bracketed() {
        let recorder = Arc::new(Recorder::default());
        let mut client = ApiClient::new();
        client.set_delegate(recorder.clone());

        let value = client.perform(async { 7 }).await;
        assert_eq!(value, 7);
        assert_eq!(*recorder.0.lock().unwrap(), vec!["started", "finished"]);
    }

    #[tokio::test]
    async fn test_dropped_work_still_finishes() {
        let recorder = Arc::new(Recorder::default());
        let mut client = ApiClient::new();
        client.set_delegate(recorder.clone());

        let stalled = tokio::time::timeout(
            std::time::Duration::from_millis(10),
            client.perform(std::future::pending::<()>()),
        )
        .await;

        assert!(stalled.is_err());
        assert_eq!(*recorder.0.lock().unwrap(), vec!["started", "finished"]);
    }

    #[tokio::test]
    async fn test_without_delegate() {
        assert_eq!(ApiClient::new().perform(async { "ok" }).await, "ok");
    }
}
