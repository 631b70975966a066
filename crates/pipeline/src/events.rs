use pipeline_types::{DownloadMetadata, LoadSource};
use tokio::sync::broadcast;
use url::Url;

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    FetchStarted {
        pipeline: String,
        url: Url,
    },
    FetchCompleted {
        pipeline: String,
        url: Url,
        source: LoadSource,
    },
    FetchFailed {
        pipeline: String,
        url: Url,
        error: String,
    },
    DownloadStarted {
        url: Url,
    },
    DownloadFinished(DownloadMetadata),
    DownloadFailed {
        url: Url,
        error: String,
    },
    MemoryCachesCleared {
        pipeline: String,
    },
}

/// Broadcast queue of [`PipelineEvent`]s.
///
/// `publish()` never blocks and drops events when nobody is subscribed.
/// Slow subscribers see `RecvError::Lagged` instead of stalling fetches.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("https://example.com/a.png").unwrap()
    }

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new(4);
        bus.publish(PipelineEvent::DownloadStarted { url: url() });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn each_subscriber_receives() {
        let bus = EventBus::new(4);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(PipelineEvent::MemoryCachesCleared {
            pipeline: "p".into(),
        });

        for rx in [&mut rx1, &mut rx2] {
            assert_eq!(
                rx.recv().await.unwrap(),
                PipelineEvent::MemoryCachesCleared {
                    pipeline: "p".into()
                }
            );
        }
    }

    #[tokio::test]
    async fn lagged_subscriber_gets_error() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for _ in 0..10 {
            bus.publish(PipelineEvent::DownloadStarted { url: url() });
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
    }
}
