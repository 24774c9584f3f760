//! State Hooks
//!
//! `use_state` and `use_reducer` over positional slots. The setter a
//! component receives is a small id-plus-index handle, not a reference into
//! the hook list — it stays valid across renders, travels into event
//! handlers and async work, and silently becomes a no-op once the owning
//! instance unmounts.
//!
//! # Update Routing
//!
//! A setter call captures the update source in effect at call time. The
//! actual slot write is queued as an [`UpdateTask`] tagged with the source's
//! transition (if any) and applied just before the instance's next render on
//! the matching lane, so a deferred write can never tear the committed sync
//! view.
//!
//! Value-form sets compare against the *committed* value and skip the
//! re-render when equal, unless the source is an immediate action — an
//! event handler asking for a render gets one. Closure-form sets and reducer
//! dispatches always re-render; their next value cannot be known until the
//! queue drains.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::RenderError;
use crate::hooks::record::{HookRecord, HookValue};
use crate::hooks::store::{lookup, ComponentId, UpdateTask};
use crate::schedule::lane::{self, Lane, UpdateSource};
use crate::schedule::root::re_render;
use crate::schedule::scope;

enum UpdatePayload<T> {
    Value(T),
    Compute(Box<dyn FnOnce(&T) -> T + Send>),
}

/// Stable handle for writing a state slot.
pub struct StateSetter<T> {
    owner: ComponentId,
    index: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for StateSetter<T> {
    fn clone(&self) -> Self {
        Self {
            owner: self.owner,
            index: self.index,
            _marker: PhantomData,
        }
    }
}

impl<T> StateSetter<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Set the slot to `value`. Skipped entirely when `value` equals the
    /// committed value, unless called under an immediate action.
    pub fn set(&self, value: T) {
        self.apply(UpdatePayload::Value(value));
    }

    /// Set the slot from the previous value. Always schedules a render.
    pub fn set_with(&self, f: impl FnOnce(&T) -> T + Send + 'static) {
        self.apply(UpdatePayload::Compute(Box::new(f)));
    }

    fn apply(&self, payload: UpdatePayload<T>) {
        let Some(instance) = lookup(self.owner) else { return };

        let source = lane::current_update_source();
        let transition = lane::current_transition();
        let lane = lane::update_type();
        let immediate = matches!(source, UpdateSource::ImmediateAction);

        // Equality guard against the committed view; the closure form has
        // nothing to compare yet.
        if let UpdatePayload::Value(next) = &payload {
            if !immediate {
                let unchanged = instance
                    .committed_state_value(self.index)
                    .and_then(|value| value.downcast_ref::<T>().map(|old| old == next))
                    .unwrap_or(false);
                if unchanged {
                    return;
                }
            }
        }

        if lane == Lane::Deferred {
            instance.root().note_deferred_update();
        }

        let index = self.index;
        let task_instance = Arc::clone(&instance);
        instance.queue_update(UpdateTask {
            transition_id: transition.map(|t| t.id()),
            updater: Box::new(move || {
                task_instance.set_state_value(lane, index, |old| match payload {
                    UpdatePayload::Value(next) => Arc::new(next) as HookValue,
                    UpdatePayload::Compute(f) => match old.downcast_ref::<T>() {
                        Some(prev) => Arc::new(f(prev)) as HookValue,
                        None => old,
                    },
                });
            }),
        });

        re_render(&instance);
    }
}

fn state_slot<T>(init: impl FnOnce() -> T) -> Result<(T, ComponentId, usize), RenderError>
where
    T: Clone + Send + Sync + 'static,
{
    let instance = scope::current_instance()?;
    let lane = instance.active_lane();
    let owner = instance.id();
    let index = instance.pointer();

    let value = instance.get_hook(
        lane,
        move || HookRecord::State {
            value: Arc::new(init()),
        },
        |_| false,
        |record| match record {
            HookRecord::State { value } => value.downcast_ref::<T>().cloned(),
            _ => None,
        },
    );

    // A mismatch here means hook call order changed between renders.
    let value = value.ok_or_else(|| {
        RenderError::UnsupportedNode("hook order changed: state slot holds a different type".into())
    })?;
    Ok((value, owner, index))
}

/// State hook. Returns the slot value for the active lane and a stable
/// setter handle.
pub fn use_state<T>(initial: T) -> Result<(T, StateSetter<T>), RenderError>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    use_state_with(move || initial)
}

/// State hook with a lazy initializer, run only when the slot is created.
pub fn use_state_with<T>(init: impl FnOnce() -> T) -> Result<(T, StateSetter<T>), RenderError>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    let (value, owner, index) = state_slot(init)?;
    Ok((
        value,
        StateSetter {
            owner,
            index,
            _marker: PhantomData,
        },
    ))
}

/// Stable handle for dispatching actions to a reducer slot.
pub struct Dispatcher<S, A> {
    owner: ComponentId,
    index: usize,
    reducer: Arc<dyn Fn(&S, A) -> S + Send + Sync>,
}

impl<S, A> Clone for Dispatcher<S, A> {
    fn clone(&self) -> Self {
        Self {
            owner: self.owner,
            index: self.index,
            reducer: Arc::clone(&self.reducer),
        }
    }
}

impl<S, A> Dispatcher<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    /// Run the reducer against the slot's current value. Always schedules a
    /// render; reducers are opaque, so there is no equality to guard on.
    pub fn dispatch(&self, action: A) {
        let Some(instance) = lookup(self.owner) else { return };

        let transition = lane::current_transition();
        let lane = lane::update_type();
        if lane == Lane::Deferred {
            instance.root().note_deferred_update();
        }

        let index = self.index;
        let reducer = Arc::clone(&self.reducer);
        let task_instance = Arc::clone(&instance);
        instance.queue_update(UpdateTask {
            transition_id: transition.map(|t| t.id()),
            updater: Box::new(move || {
                task_instance.set_state_value(lane, index, |old| {
                    match old.downcast_ref::<S>() {
                        Some(prev) => Arc::new(reducer(prev, action)) as HookValue,
                        None => old,
                    }
                });
            }),
        });

        re_render(&instance);
    }
}

/// Reducer hook over an initial state value.
pub fn use_reducer<S, A>(
    reducer: impl Fn(&S, A) -> S + Send + Sync + 'static,
    initial: S,
) -> Result<(S, Dispatcher<S, A>), RenderError>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    use_reducer_with(reducer, initial, |s| s)
}

/// Reducer hook with a lazy initializer applied to `initial_arg` when the
/// slot is created.
pub fn use_reducer_with<S, A, I>(
    reducer: impl Fn(&S, A) -> S + Send + Sync + 'static,
    initial_arg: I,
    init: impl FnOnce(I) -> S,
) -> Result<(S, Dispatcher<S, A>), RenderError>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    let (value, owner, index) = state_slot(move || init(initial_arg))?;
    Ok((
        value,
        Dispatcher {
            owner,
            index,
            reducer: Arc::new(reducer),
        },
    ))
}

/// Stable per-slot identifier, unique across the process. Useful for
/// accessibility attributes and keyed caches.
pub fn use_id() -> Result<String, RenderError> {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    let (id, _owner, _index) = state_slot(|| {
        format!("fil-{}", COUNTER.fetch_add(1, Ordering::Relaxed))
    })?;
    Ok(id)
}
