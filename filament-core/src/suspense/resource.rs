//! Resources
//!
//! A [`Resource`] is the engine's explicit model of an async value a render
//! can depend on: pending until it settles fulfilled or rejected, readable
//! from a component body, and observable by listeners. Reading a pending
//! resource aborts the render with a [`SuspendedResource`] handle — the
//! type-erased settle view the scheduler uses to arrange a retry without
//! knowing the value type.
//!
//! A fulfilled resource may emit again: re-emission re-notifies listeners,
//! which is what lets a resource model a stream of values rather than a
//! one-shot promise. Settle waiters, by contrast, fire exactly once, on the
//! first settlement.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::trace;

use crate::error::{RenderAbort, RenderError};

/// Unique identifier for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(u64);

impl ResourceId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }

    #[cfg(test)]
    pub(crate) fn raw_for_tests(value: u64) -> Self {
        Self(value)
    }
}

/// Where a resource is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceStatus<T> {
    Pending,
    Fulfilled(T),
    Rejected(String),
}

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct ResourceInner<T> {
    id: ResourceId,
    status: Mutex<ResourceStatus<T>>,
    /// One-shot callbacks fired on first settlement.
    waiters: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
    /// Persistent listeners notified on every fulfillment.
    listeners: Mutex<IndexMap<u64, Listener<T>>>,
    next_listener_key: AtomicU64,
}

/// Type-erased settle view of a resource. What the scheduler holds onto
/// while a render is suspended.
trait SettleWatch: Send + Sync {
    fn resource_id(&self) -> ResourceId;
    fn is_settled(&self) -> bool;
    fn on_settle(&self, f: Box<dyn FnOnce() + Send>);
}

impl<T: Send + Sync> SettleWatch for ResourceInner<T> {
    fn resource_id(&self) -> ResourceId {
        self.id
    }

    fn is_settled(&self) -> bool {
        !matches!(*self.status.lock(), ResourceStatus::Pending)
    }

    fn on_settle(&self, f: Box<dyn FnOnce() + Send>) {
        if self.is_settled() {
            f();
        } else {
            self.waiters.lock().push(f);
        }
    }
}

/// An async value a render can depend on.
pub struct Resource<T> {
    inner: Arc<ResourceInner<T>>,
}

impl<T> Clone for Resource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Resource<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn with_status(status: ResourceStatus<T>) -> Self {
        Self {
            inner: Arc::new(ResourceInner {
                id: ResourceId::new(),
                status: Mutex::new(status),
                waiters: Mutex::new(Vec::new()),
                listeners: Mutex::new(IndexMap::new()),
                next_listener_key: AtomicU64::new(1),
            }),
        }
    }

    pub fn pending() -> Self {
        Self::with_status(ResourceStatus::Pending)
    }

    /// A resource born settled. Reads never suspend.
    pub fn fulfilled(value: T) -> Self {
        Self::with_status(ResourceStatus::Fulfilled(value))
    }

    pub fn id(&self) -> ResourceId {
        self.inner.id
    }

    pub fn status(&self) -> ResourceStatus<T> {
        self.inner.status.lock().clone()
    }

    /// Fulfill with `value`, waking settle waiters on the first settlement
    /// and notifying listeners on every emission.
    ///
    /// Emitting on a rejected resource is ignored; rejection is final.
    pub fn emit(&self, value: T) {
        let first_settle = {
            let mut status = self.inner.status.lock();
            match *status {
                ResourceStatus::Rejected(_) => return,
                ResourceStatus::Pending => {
                    *status = ResourceStatus::Fulfilled(value.clone());
                    true
                }
                ResourceStatus::Fulfilled(_) => {
                    *status = ResourceStatus::Fulfilled(value.clone());
                    false
                }
            }
        };

        if first_settle {
            trace!(id = self.inner.id.raw(), "resource fulfilled");
            self.wake_waiters();
        }

        let listeners: Vec<Listener<T>> =
            self.inner.listeners.lock().values().cloned().collect();
        for listener in listeners {
            listener(&value);
        }
    }

    /// Alias of [`Resource::emit`] for one-shot promise-style callers.
    pub fn resolve(&self, value: T) {
        self.emit(value);
    }

    /// Reject with `reason`. Final: later emissions are ignored. A repeat
    /// rejection is also ignored.
    pub fn reject(&self, reason: impl Into<String>) {
        {
            let mut status = self.inner.status.lock();
            if !matches!(*status, ResourceStatus::Pending) {
                return;
            }
            *status = ResourceStatus::Rejected(reason.into());
        }
        trace!(id = self.inner.id.raw(), "resource rejected");
        self.wake_waiters();
    }

    fn wake_waiters(&self) {
        let waiters: Vec<_> = self.inner.waiters.lock().drain(..).collect();
        for waiter in waiters {
            waiter();
        }
    }

    /// Read the value from a render body.
    ///
    /// Pending aborts the render with a suspension handle; rejected raises
    /// the reason as a failure.
    pub fn read(&self) -> Result<T, RenderAbort> {
        match &*self.inner.status.lock() {
            ResourceStatus::Fulfilled(value) => Ok(value.clone()),
            ResourceStatus::Rejected(reason) => Err(RenderAbort::Failed(
                RenderError::ResourceFailed(reason.clone()),
            )),
            ResourceStatus::Pending => Err(RenderAbort::Suspended(self.suspended())),
        }
    }

    /// Type-erased settle handle for this resource.
    pub fn suspended(&self) -> SuspendedResource {
        SuspendedResource {
            inner: Arc::clone(&self.inner) as Arc<dyn SettleWatch>,
        }
    }

    /// Register a persistent listener; returns a key for removal.
    pub fn subscribe(&self, listener: Listener<T>) -> u64 {
        let key = self.inner.next_listener_key.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().insert(key, listener);
        key
    }

    pub fn unsubscribe(&self, key: u64) {
        self.inner.listeners.lock().shift_remove(&key);
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }
}

/// Handle carried by a suspended render: enough to identify the resource
/// and schedule work for when it settles, without knowing its value type.
pub struct SuspendedResource {
    inner: Arc<dyn SettleWatch>,
}

impl Clone for SuspendedResource {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for SuspendedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuspendedResource")
            .field("resource_id", &self.inner.resource_id())
            .field("settled", &self.inner.is_settled())
            .finish()
    }
}

impl SuspendedResource {
    pub fn resource_id(&self) -> ResourceId {
        self.inner.resource_id()
    }

    pub fn is_settled(&self) -> bool {
        self.inner.is_settled()
    }

    /// Run `f` when the resource settles; immediately if it already has.
    pub fn on_settle(&self, f: impl FnOnce() + Send + 'static) {
        self.inner.on_settle(Box::new(f));
    }
}
