//! Network activity indicator.
//!
//! One task owns the outstanding-operation count. Callers only ever send it
//! messages, so every mutation is applied in a single order no matter which
//! thread or task it came from.

use tokio::sync::{mpsc, oneshot, watch};

enum Command {
    Increment,
    Decrement,
    Flush(oneshot::Sender<i64>),
}

/// Cloneable handle to the activity counter task.
#[derive(Debug, Clone)]
pub struct NetworkActivity {
    commands: mpsc::UnboundedSender<Command>,
    visible: watch::Receiver<bool>,
}

impl NetworkActivity {
    /// Spawns the counter task on the current runtime.
    pub fn spawn() -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let (visible_tx, visible) = watch::channel(false);

        tokio::spawn(run(rx, visible_tx));

        Self { commands, visible }
    }

    pub fn increment(&self) {
        self.send(Command::Increment);
    }

    pub fn decrement(&self) {
        self.send(Command::Decrement);
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::warn!("Network activity task has stopped");
        }
    }

    /// Last published visibility. May lag behind messages still queued.
    pub fn is_visible(&self) -> bool {
        *self.visible.borrow()
    }

    /// Receiver that wakes whenever visibility flips.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.visible.clone()
    }

    /// Waits until every message sent before this call has been applied
    /// and returns the count at that point.
    pub async fn flush(&self) -> Option<i64> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(Command::Flush(tx)).ok()?;
        rx.await.ok()
    }

    pub async fn count(&self) -> Option<i64> {
        self.flush().await
    }
}

async fn run(mut commands: mpsc::UnboundedReceiver<Command>, visible: watch::Sender<bool>) {
    let mut count: i64 = 0;

    while let Some(command) = commands.recv().await {
        match command {
            Command::Increment => count += 1,
            Command::Decrement => {
                count -= 1;
                if count < 0 {
                    tracing::warn!("Network activity decremented below zero ({count})");
                }
            }
            Command::Flush(reply) => {
                let _ = reply.send(count);
                continue;
            }
        }

        visible.send_if_modified(|shown| {
            let now = count > 0;
            let changed = *shown != now;
            *shown = now;
            changed
        });
    }

    tracing::debug!("Network activity task finished");
}
