//! Scheduling
//!
//! Update sources and lanes, the render scope stack, the render root with
//! its deferred work and task queues, and transitions. Together these
//! decide *when* a component renders and *which* hook-list view that render
//! observes; the hook primitives themselves live in [`crate::hooks`].

pub mod lane;
pub mod root;
pub mod scope;
pub mod transition;

pub use lane::{
    current_transition, current_update_source, deferred_updates, sync_updates, with_transition,
    with_update_source, Lane, UpdateSource,
};
pub use root::{
    re_render, render_body, render_component, render_detached, DriverFn, RenderRoot, TaskToken,
};
pub use scope::{current_instance, is_rendering, RenderScope};
pub use transition::{
    start_transition, use_deferred_value, use_transition, AsyncAction, TransitionHandle,
    TransitionId, TransitionSlot, TransitionState,
};
