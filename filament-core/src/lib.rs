//! Filament Core
//!
//! This crate provides the hook-scheduling and update-lane engine for the
//! Filament UI runtime. It implements:
//!
//! - Positional hook storage with sync and deferred views
//! - Update queueing with lane-based priority
//! - Transitions, including async actions and pending-state tracking
//! - Suspense resources and resource watching
//! - Context propagation with targeted consumer re-renders
//!
//! The engine is host-agnostic: it decides *what* to re-render and *when*,
//! and hands the actual rendering back to a host-installed driver.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `hooks`: Positional hook storage and the hook primitives
//! - `schedule`: Lanes, render roots, scopes, and transitions
//! - `suspense`: Async resources and watching
//! - `node`: Classification of render node descriptions
//! - `error`: Error taxonomy and render outcomes
//!
//! # Example
//!
//! ```rust,ignore
//! use filament_core::{use_state, use_transition, RenderRoot, ComponentInstance};
//!
//! let root = RenderRoot::new();
//! let counter = ComponentInstance::mount(&root);
//!
//! // Inside a render pass:
//! let (count, set_count) = use_state(0)?;
//! let (pending, transition) = use_transition()?;
//!
//! // Urgent update from an event handler:
//! set_count.set(count + 1);
//!
//! // Low-priority update; the committed view stays intact until it lands:
//! transition.start(|| {
//!     set_count.set(count + 100);
//!     None
//! });
//! ```

pub mod error;
pub mod hooks;
pub mod node;
pub mod schedule;
pub mod suspense;

pub use error::{RenderAbort, RenderError, RenderOutcome};
pub use hooks::{
    create_context, use_callback, use_context, use_effect, use_id, use_imperative_handle,
    use_layout_effect, use_memo, use_reducer, use_reducer_with, use_ref, use_state,
    use_state_with, ComponentId, ComponentInstance, Context, ContextProvider, DepList, DepToken,
    Dispatcher, RefBinding, RefHandle, StateSetter,
};
pub use node::{classify, is_component, supports_hooks, NodeKind, NodeSpec};
pub use schedule::{
    deferred_updates, re_render, render_body, render_component, render_detached, start_transition,
    sync_updates, use_deferred_value, use_transition, AsyncAction, Lane, RenderRoot,
    TransitionHandle, UpdateSource,
};
pub use suspense::{watch, watch_sync, Resource, ResourceStatus, SuspendedResource};
