use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a single image fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FetchState {
    #[default]
    Idle,
    Loading,
    Ready {
        from_cache: bool,
    },
    Failed(String),
    Cancelled,
}

impl FetchState {
    pub fn is_loading(&self) -> bool {
        matches!(self, FetchState::Loading)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, FetchState::Ready { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, FetchState::Failed(_))
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            FetchState::Ready { .. } | FetchState::Failed(_) | FetchState::Cancelled
        )
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            FetchState::Failed(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn can_retry(&self) -> bool {
        matches!(self, FetchState::Failed(_) | FetchState::Cancelled)
    }
}

impl fmt::Display for FetchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchState::Idle => write!(f, "Idle"),
            FetchState::Loading => write!(f, "Loading"),
            FetchState::Ready { from_cache: true } => write!(f, "Ready (cached)"),
            FetchState::Ready { from_cache: false } => write!(f, "Ready"),
            FetchState::Failed(msg) => write!(f, "Failed: {}", msg),
            FetchState::Cancelled => write!(f, "Cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchEvent {
    Start,
    Complete { from_cache: bool },
    Fail(String),
    Cancel,
    Retry,
}

impl FetchEvent {
    pub fn apply_to_state(self, current_state: FetchState) -> FetchState {
        match (self, current_state) {
            (FetchEvent::Start, FetchState::Idle) => FetchState::Loading,
            (FetchEvent::Start, state) => state,
            (FetchEvent::Complete { from_cache }, FetchState::Loading) => {
                FetchState::Ready { from_cache }
            }
            (FetchEvent::Fail(msg), FetchState::Loading) => FetchState::Failed(msg),
            (FetchEvent::Cancel, FetchState::Idle | FetchState::Loading) => FetchState::Cancelled,
            (FetchEvent::Retry, state) if state.can_retry() => FetchState::Loading,
            // Finished fetches ignore late completions and failures
            (_, state) => state,
        }
    }
}
