//! Update Lanes and Sources
//!
//! An update's *source* records who caused it: a plain render-time call, an
//! event-style immediate action, or a named transition. Its *lane* is the
//! priority class derived from the source — transition-sourced updates use
//! the deferred lane, everything else the sync lane. The lane selects both
//! the hook-list shadow an update materializes into and the scheduling path
//! a re-render takes.
//!
//! # Scoped Source Tracking
//!
//! The current source lives on a thread-local stack. Entering a scope pushes
//! an entry; the guard's `Drop` pops it, so the previous source is restored
//! on every exit path, including early returns and panics. The host
//! guarantees single-threaded, non-reentrant render passes, which is what
//! makes a thread-local acceptable here.

use std::cell::RefCell;
use std::sync::Arc;

use crate::schedule::transition::{predefined_deferred, TransitionSlot};

/// Priority class of an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    /// High priority; reads and writes the committed hook list.
    Sync,

    /// Low priority; reads and writes the deferred hook-list shadow.
    Deferred,
}

/// Who caused the current update.
#[derive(Clone)]
pub enum UpdateSource {
    /// A plain call with no explicit source.
    Default,

    /// An event-triggered immediate action. State setters under this source
    /// always re-render, side effects included.
    ImmediateAction,

    /// A named transition; state setters inherit its identity.
    Transition(Arc<TransitionSlot>),
}

thread_local! {
    static SOURCE_STACK: RefCell<Vec<UpdateSource>> = RefCell::new(Vec::new());
}

/// Guard that restores the previous update source when dropped.
struct SourceScope;

impl SourceScope {
    fn enter(source: UpdateSource) -> Self {
        SOURCE_STACK.with(|stack| stack.borrow_mut().push(source));
        SourceScope
    }
}

impl Drop for SourceScope {
    fn drop(&mut self) {
        SOURCE_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Run `f` with the given update source active.
pub fn with_update_source<R>(source: UpdateSource, f: impl FnOnce() -> R) -> R {
    let _scope = SourceScope::enter(source);
    f()
}

/// Run `f` with the given transition as the active update source, so state
/// setters invoked inside inherit its identity.
pub fn with_transition<R>(transition: Arc<TransitionSlot>, f: impl FnOnce() -> R) -> R {
    with_update_source(UpdateSource::Transition(transition), f)
}

/// The update source currently in effect.
pub fn current_update_source() -> UpdateSource {
    SOURCE_STACK.with(|stack| stack.borrow().last().cloned()).unwrap_or(UpdateSource::Default)
}

/// The transition currently in effect, if the source is a transition.
pub fn current_transition() -> Option<Arc<TransitionSlot>> {
    match current_update_source() {
        UpdateSource::Transition(transition) => Some(transition),
        _ => None,
    }
}

/// Lane implied by the current update source.
pub fn update_type() -> Lane {
    match current_update_source() {
        UpdateSource::Transition(_) => Lane::Deferred,
        _ => Lane::Sync,
    }
}

/// Run `f` with updates folded into the predefined deferred transition.
pub fn deferred_updates<R>(f: impl FnOnce() -> R) -> R {
    with_transition(predefined_deferred(), f)
}

/// Run `f` under the immediate-action source, so state setters re-render
/// unconditionally.
pub fn sync_updates<R>(f: impl FnOnce() -> R) -> R {
    with_update_source(UpdateSource::ImmediateAction, f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_source_outside_any_scope() {
        assert!(matches!(current_update_source(), UpdateSource::Default));
        assert_eq!(update_type(), Lane::Sync);
        assert!(current_transition().is_none());
    }

    #[test]
    fn scopes_nest_and_restore() {
        with_update_source(UpdateSource::ImmediateAction, || {
            assert!(matches!(
                current_update_source(),
                UpdateSource::ImmediateAction
            ));
            assert_eq!(update_type(), Lane::Sync);

            deferred_updates(|| {
                assert_eq!(update_type(), Lane::Deferred);
                assert!(current_transition().is_some());
            });

            // Inner scope exited; the immediate action is current again.
            assert!(matches!(
                current_update_source(),
                UpdateSource::ImmediateAction
            ));
        });
        assert!(matches!(current_update_source(), UpdateSource::Default));
    }

    #[test]
    fn transition_scope_exposes_its_slot() {
        let transition = TransitionSlot::standalone();
        let seen = with_transition(Arc::clone(&transition), || current_transition());
        assert!(Arc::ptr_eq(&seen.expect("transition should be current"), &transition));
    }

    #[test]
    fn sync_updates_sets_immediate_action() {
        sync_updates(|| {
            assert!(matches!(
                current_update_source(),
                UpdateSource::ImmediateAction
            ));
            assert_eq!(update_type(), Lane::Sync);
        });
    }
}
