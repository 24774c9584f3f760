//! Suspense
//!
//! Explicit async values a render can depend on. Reading a pending
//! [`Resource`] aborts the render with a settle handle; `watch` keeps a
//! component subscribed to a resource across emissions.

pub mod resource;
pub mod watch;

pub use resource::{Resource, ResourceId, ResourceStatus, SuspendedResource};
pub use watch::{watch, watch_sync};
