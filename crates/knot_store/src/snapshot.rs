//! Snapshot model
//!
//! A snapshot is an immutable `{status, context, output, error}` value. Stores
//! only ever produce `active` snapshots; the terminal shapes exist so store
//! snapshots line up with other snapshot producers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Error carried by a snapshot in the `error` status
pub type SnapshotError = Arc<dyn std::error::Error + Send + Sync>;

/// Lifecycle status of a snapshot
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    Done,
    Error,
    Stopped,
}

#[derive(Clone)]
enum Lifecycle<O> {
    Active,
    Done(O),
    Error(SnapshotError),
    Stopped,
}

/// Immutable context plus lifecycle status
pub struct Snapshot<C, O = ()> {
    lifecycle: Lifecycle<O>,
    context: Arc<C>,
}

/// Snapshot shape produced by a store
pub type StoreSnapshot<C> = Snapshot<C, ()>;

impl<C, O> Snapshot<C, O> {
    /// Build an active snapshot
    pub fn active(context: C) -> Self {
        Self::active_shared(Arc::new(context))
    }

    /// Build an active snapshot around an already shared context
    pub fn active_shared(context: Arc<C>) -> Self {
        Self {
            lifecycle: Lifecycle::Active,
            context,
        }
    }

    /// Build a `done` snapshot carrying an output
    pub fn done(context: Arc<C>, output: O) -> Self {
        Self {
            lifecycle: Lifecycle::Done(output),
            context,
        }
    }

    /// Build an `error` snapshot
    pub fn errored(context: Arc<C>, error: SnapshotError) -> Self {
        Self {
            lifecycle: Lifecycle::Error(error),
            context,
        }
    }

    /// Build a `stopped` snapshot
    pub fn stopped(context: Arc<C>) -> Self {
        Self {
            lifecycle: Lifecycle::Stopped,
            context,
        }
    }

    /// Current lifecycle status
    pub fn status(&self) -> Status {
        match self.lifecycle {
            Lifecycle::Active => Status::Active,
            Lifecycle::Done(_) => Status::Done,
            Lifecycle::Error(_) => Status::Error,
            Lifecycle::Stopped => Status::Stopped,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Active)
    }

    /// The context value
    pub fn context(&self) -> &C {
        &self.context
    }

    /// Shared handle to the context, for reference-equality checks
    pub fn context_arc(&self) -> &Arc<C> {
        &self.context
    }

    /// Output value; only present when `done`
    pub fn output(&self) -> Option<&O> {
        match &self.lifecycle {
            Lifecycle::Done(output) => Some(output),
            _ => None,
        }
    }

    /// Error value; only present in the `error` status
    pub fn error(&self) -> Option<&SnapshotError> {
        match &self.lifecycle {
            Lifecycle::Error(error) => Some(error),
            _ => None,
        }
    }

    /// True when both snapshots share status and the same context allocation
    pub fn same_context(&self, other: &Self) -> bool {
        self.status() == other.status() && Arc::ptr_eq(&self.context, &other.context)
    }
}

impl<C, O: Clone> Clone for Snapshot<C, O> {
    fn clone(&self) -> Self {
        Self {
            lifecycle: self.lifecycle.clone(),
            context: Arc::clone(&self.context),
        }
    }
}

impl<C: fmt::Debug, O: fmt::Debug> fmt::Debug for Snapshot<C, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("status", &self.status())
            .field("context", &self.context)
            .field("output", &self.output())
            .field("error", &self.error().map(|e| e.to_string()))
            .finish()
    }
}

impl<C: PartialEq, O: PartialEq> PartialEq for Snapshot<C, O> {
    fn eq(&self, other: &Self) -> bool {
        self.status() == other.status()
            && self.output() == other.output()
            && self.context == other.context
    }
}
