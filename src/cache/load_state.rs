use std::fmt;

use tokio::sync::watch;

use super::error::CacheError;

/// Lifecycle of a record or list.
///
/// Only store and list logic moves a value between states; consumers observe
/// it through `load_state()` and the revision channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LoadState {
    /// Never requested.
    #[default]
    None,
    /// A fetch is in flight.
    Pending,
    /// Data present and valid.
    Done,
    /// The last load or write failed.
    Error(CacheError),
    /// Removed on the backend; the record left the identity map.
    Deleted,
}

impl LoadState {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted)
    }

    pub fn is_none_or_pending(&self) -> bool {
        matches!(self, Self::None | Self::Pending)
    }

    pub fn error(&self) -> Option<&CacheError> {
        match self {
            Self::Error(error) => Some(error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pending => "pending",
            Self::Done => "done",
            Self::Error(_) => "error",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(error) => write!(f, "error: {error}"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Waits on a revision channel until `current()` reports a settled state.
pub(crate) async fn wait_settled(
    mut revisions: watch::Receiver<u64>,
    current: impl Fn() -> LoadState,
) -> LoadState {
    loop {
        let state = current();
        if !state.is_none_or_pending() {
            return state;
        }
        if revisions.changed().await.is_err() {
            return current();
        }
    }
}
