//! Per-URL fetch status, folded from the pipeline event stream.
//!
//! [`InspectorHandle::spawn`] keeps a task subscribed to the bus so the
//! fold keeps pace with the pipeline however many fetches run between two
//! snapshots.

use pipeline::PipelineEvent;
use shared::fetch_state::{FetchEvent, FetchState};
use std::collections::BTreeMap;
use tokio::sync::{
    broadcast::{
        self,
        error::{RecvError, TryRecvError},
    },
    mpsc, oneshot,
};

#[derive(Debug, Default)]
pub struct Inspector {
    states: BTreeMap<String, FetchState>,
    missed: u64,
}

impl Inspector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &PipelineEvent) {
        let (url, fetch_event) = match event {
            PipelineEvent::FetchStarted { url, .. } => (url, None),
            PipelineEvent::FetchCompleted { url, source, .. } => (
                url,
                Some(FetchEvent::Complete {
                    from_cache: source.is_cache(),
                }),
            ),
            PipelineEvent::FetchFailed { url, error, .. } => {
                (url, Some(FetchEvent::Fail(error.clone())))
            }
            _ => return,
        };

        let state = self.states.entry(url.to_string()).or_default();
        let mut current = std::mem::take(state);
        // A new fetch of a settled URL starts over.
        if fetch_event.is_none() && current.is_finished() {
            current = FetchState::Idle;
        }
        *state = fetch_event
            .unwrap_or(FetchEvent::Start)
            .apply_to_state(current);
    }

    /// Applies every event queued on `events` without waiting.
    pub fn drain(&mut self, events: &mut broadcast::Receiver<PipelineEvent>) {
        loop {
            match events.try_recv() {
                Ok(event) => self.apply(&event),
                Err(TryRecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }

    fn record_lag(&mut self, skipped: u64) {
        tracing::warn!("Inspector missed {skipped} pipeline events");
        self.missed += skipped;
    }

    pub fn state(&self, url: &str) -> FetchState {
        self.states.get(url).cloned().unwrap_or_default()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &FetchState)> {
        self.states.iter().map(|(url, state)| (url.as_str(), state))
    }

    pub fn missed(&self) -> u64 {
        self.missed
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }

    fn snapshot(&self) -> Vec<(String, FetchState)> {
        self.entries()
            .map(|(url, state)| (url.to_string(), state.clone()))
            .collect()
    }
}

type SnapshotReply = oneshot::Sender<Vec<(String, FetchState)>>;

/// Handle to a task that folds bus events into an [`Inspector`].
#[derive(Debug, Clone)]
pub struct InspectorHandle {
    requests: mpsc::UnboundedSender<SnapshotReply>,
}

impl InspectorHandle {
    /// Spawns the inspector task on the current runtime.
    pub fn spawn(events: broadcast::Receiver<PipelineEvent>) -> Self {
        let (requests, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(events, rx));
        Self { requests }
    }

    /// Status of every URL seen so far, in URL order. Includes every event
    /// published before the call.
    pub async fn snapshot(&self) -> Vec<(String, FetchState)> {
        let (tx, rx) = oneshot::channel();
        if self.requests.send(tx).is_err() {
            tracing::warn!("Inspector task has stopped");
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }
}

async fn run(
    mut events: broadcast::Receiver<PipelineEvent>,
    mut requests: mpsc::UnboundedReceiver<SnapshotReply>,
) {
    let mut inspector = Inspector::new();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => inspector.apply(&event),
                Err(RecvError::Lagged(skipped)) => inspector.record_lag(skipped),
                Err(RecvError::Closed) => break,
            },
            request = requests.recv() => match request {
                Some(reply) => {
                    inspector.drain(&mut events);
                    let _ = reply.send(inspector.snapshot());
                }
                None => break,
            },
        }
    }

    tracing::debug!("Inspector task finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::EventBus;
    use pipeline_types::LoadSource;
    use url::Url;

    fn url() -> Url {
        Url::parse("https://images.example.com/a.png").unwrap()
    }

    fn started() -> PipelineEvent {
        PipelineEvent::FetchStarted {
            pipeline: "test".into(),
            url: url(),
        }
    }

    fn completed(source: LoadSource) -> PipelineEvent {
        PipelineEvent::FetchCompleted {
            pipeline: "test".into(),
            url: url(),
            source,
        }
    }

    #[test]
    fn test_tracks_lifecycle() {
        let mut inspector = Inspector::new();
        assert_eq!(inspector.state(url().as_str()), FetchState::Idle);

        inspector.apply(&started());
        assert_eq!(inspector.state(url().as_str()), FetchState::Loading);

        inspector.apply(&completed(LoadSource::DiskCache));
        assert_eq!(
            inspector.state(url().as_str()),
            FetchState::Ready { from_cache: true }
        );
    }

    #[test]
    fn test_failed_fetch_can_be_retried() {
        let mut inspector = Inspector::new();
        inspector.apply(&started());
        inspector.apply(&PipelineEvent::FetchFailed {
            pipeline: "test".into(),
            url: url(),
            error: "Fetch cancelled".into(),
        });
        assert!(inspector.state(url().as_str()).is_failed());

        inspector.apply(&started());
        assert_eq!(inspector.state(url().as_str()), FetchState::Loading);

        inspector.apply(&completed(LoadSource::Network));
        assert_eq!(
            inspector.state(url().as_str()),
            FetchState::Ready { from_cache: false }
        );
    }

    #[test]
    fn test_refetch_of_ready_url_restarts() {
        let mut inspector = Inspector::new();
        inspector.apply(&started());
        inspector.apply(&completed(LoadSource::Network));
        assert_eq!(
            inspector.state(url().as_str()),
            FetchState::Ready { from_cache: false }
        );

        inspector.apply(&started());
        assert_eq!(inspector.state(url().as_str()), FetchState::Loading);

        inspector.apply(&completed(LoadSource::MemoryCache));
        let state = inspector.state(url().as_str());
        assert_eq!(state, FetchState::Ready { from_cache: true });
        assert_eq!(state.to_string(), "Ready (cached)");
    }

    #[test]
    fn test_ignores_download_events() {
        let mut inspector = Inspector::new();
        inspector.apply(&PipelineEvent::DownloadStarted { url: url() });
        assert_eq!(inspector.entries().count(), 0);
    }

    #[test]
    fn test_drain_reports_lag() {
        let bus = EventBus::new(2);
        let mut events = bus.subscribe();
        for _ in 0..3 {
            bus.publish(started());
        }
        bus.publish(completed(LoadSource::Network));

        let mut inspector = Inspector::new();
        inspector.drain(&mut events);

        assert_eq!(inspector.missed(), 2);
        assert!(inspector.state(url().as_str()).is_ready());
    }

    #[tokio::test]
    async fn test_handle_keeps_up_with_small_bus() {
        let bus = EventBus::new(4);
        let inspector = InspectorHandle::spawn(bus.subscribe());

        let urls: Vec<Url> = (0..40)
            .map(|index| Url::parse(&format!("https://images.example.com/{index:02}.png")).unwrap())
            .collect();
        for url in &urls {
            bus.publish(PipelineEvent::FetchStarted {
                pipeline: "test".into(),
                url: url.clone(),
            });
            bus.publish(PipelineEvent::FetchCompleted {
                pipeline: "test".into(),
                url: url.clone(),
                source: LoadSource::Network,
            });
            tokio::task::yield_now().await;
        }

        let states = inspector.snapshot().await;
        assert_eq!(states.len(), 40);
        assert_eq!(states[0].0, urls[0].to_string());
        assert!(
            states
                .iter()
                .all(|(_, state)| *state == FetchState::Ready { from_cache: false })
        );
    }
}
