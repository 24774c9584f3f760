//! Ref Hooks
//!
//! A ref is a mutable cell with identity that outlives individual renders.
//! The cell stores `Arc<Option<T>>`, so "empty" is representable — an
//! imperative handle can be cleared without tearing the slot down.
//!
//! [`RefBinding`] is the ref-shaped parameter a component accepts from its
//! parent: either a slot to fill or a callback invoked with each new value.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::RenderError;
use crate::hooks::record::{Cleanup, DepToken, HookRecord, HookValue, RefCellSlot, RefSlot};
use crate::schedule::scope;

/// Typed handle to a ref cell.
pub struct RefHandle<T> {
    slot: RefSlot,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for RefHandle<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
            _marker: PhantomData,
        }
    }
}

impl<T> RefHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn from_slot(slot: RefSlot) -> Self {
        Self {
            slot,
            _marker: PhantomData,
        }
    }

    /// The current value, if set.
    pub fn current(&self) -> Option<T> {
        let value = self.slot.current.lock().clone();
        value
            .downcast_ref::<Option<T>>()
            .and_then(|inner| inner.clone())
    }

    pub fn set_current(&self, value: T) {
        *self.slot.current.lock() = Arc::new(Some(value)) as HookValue;
    }

    pub fn clear(&self) {
        *self.slot.current.lock() = Arc::new(None::<T>) as HookValue;
    }

    /// Identity token of the underlying cell, for dependency lists.
    pub fn identity(&self) -> DepToken {
        DepToken::of_ptr(&self.slot)
    }
}

/// Ref hook: a cell whose identity is stable for the life of the slot.
pub fn use_ref<T>(initial: Option<T>) -> Result<RefHandle<T>, RenderError>
where
    T: Clone + Send + Sync + 'static,
{
    let instance = scope::current_instance()?;
    let lane = instance.active_lane();

    let slot = instance.get_hook(
        lane,
        move || {
            HookRecord::Ref(Arc::new(RefCellSlot {
                current: parking_lot::Mutex::new(Arc::new(initial) as HookValue),
            }))
        },
        |_| false,
        |record| match record {
            HookRecord::Ref(slot) => Some(Arc::clone(slot)),
            _ => None,
        },
    );

    let slot = slot.ok_or_else(|| {
        RenderError::UnsupportedNode("hook order changed: ref slot holds a different kind".into())
    })?;
    Ok(RefHandle::from_slot(slot))
}

/// A ref passed into a component from outside: a slot to fill, or a
/// callback observing each value.
pub enum RefBinding<T> {
    Slot(RefHandle<T>),
    Callback(Arc<dyn Fn(Option<T>) -> Option<Cleanup> + Send + Sync>),
}

impl<T> Clone for RefBinding<T> {
    fn clone(&self) -> Self {
        match self {
            RefBinding::Slot(handle) => RefBinding::Slot(handle.clone()),
            RefBinding::Callback(f) => RefBinding::Callback(Arc::clone(f)),
        }
    }
}

impl<T> RefBinding<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Identity token for dependency lists: the cell for slot bindings, the
    /// closure allocation for callback bindings.
    pub fn identity(&self) -> DepToken {
        match self {
            RefBinding::Slot(handle) => handle.identity(),
            RefBinding::Callback(f) => DepToken::of_ptr(f),
        }
    }
}
