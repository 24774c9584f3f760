//! Error Taxonomy and Render Results
//!
//! The engine distinguishes three very different kinds of "a render did not
//! produce a value":
//!
//! 1. Usage errors — a hook primitive was called with no active render
//!    scope, or a node description cannot be classified. These are
//!    unrecoverable and surface to the caller immediately.
//!
//! 2. Suspension — a required resource is not ready yet. This is control
//!    flow, not a failure. The render driver is expected to retry once the
//!    resource settles.
//!
//! 3. Resource failures — a resource settled rejected; reading it raises
//!    the rejection reason as a failure.
//!
//! Component bodies return `Result<T, RenderAbort>`, so both suspension and
//! failure propagate with `?`. The driver receives them as an explicit
//! [`RenderOutcome`] sum type instead of having to catch a thrown value and
//! sniff its shape.

use thiserror::Error;

use crate::suspense::resource::SuspendedResource;

/// Unrecoverable errors surfaced by the engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    /// A hook primitive was invoked with no active render scope.
    #[error("hook called outside of an active render scope")]
    OutsideRender,

    /// A node description could not be classified.
    #[error("unsupported node description: {0}")]
    UnsupportedNode(String),

    /// A suspended resource settled rejected; the reason is surfaced on read.
    #[error("resource failed: {0}")]
    ResourceFailed(String),
}

/// Abnormal exit from a component body.
///
/// `Suspended` is control flow — the driver should retry the render once the
/// carried resource settles. `Failed` is a true failure.
#[derive(Debug)]
pub enum RenderAbort {
    /// The render read a resource that has not settled yet.
    Suspended(SuspendedResource),

    /// The render hit an unrecoverable error.
    Failed(RenderError),
}

impl From<RenderError> for RenderAbort {
    fn from(err: RenderError) -> Self {
        RenderAbort::Failed(err)
    }
}

/// Result of one component invocation, as seen by the render driver.
#[derive(Debug)]
pub enum RenderOutcome<T> {
    /// The body ran to completion.
    Ready(T),

    /// The body suspended on an unsettled resource; retry when it settles.
    Suspended(SuspendedResource),

    /// The body failed.
    Failed(RenderError),
}

impl<T> RenderOutcome<T> {
    /// Returns the rendered value, if the body ran to completion.
    pub fn ready(self) -> Option<T> {
        match self {
            RenderOutcome::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, RenderOutcome::Ready(_))
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, RenderOutcome::Suspended(_))
    }
}
