//! Context
//!
//! A context carries a shared value from a provider component to any
//! descendant that asks for it, without threading the value through
//! intermediate props. Consumers subscribe to their nearest provider via a
//! layout effect; when the provider's value changes by reference, only the
//! subscribed consumers are re-rendered — components between provider and
//! consumer are untouched.
//!
//! Subscribers live in an [`IndexMap`] keyed by component id: notification
//! order is subscription order, and a consumer holds at most one
//! subscription per provider however many times it re-renders.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tracing::trace;

use crate::error::RenderError;
use crate::hooks::effect::use_layout_effect;
use crate::hooks::record::{Cleanup, DepList, HookValue};
use crate::hooks::store::{lookup, ComponentId};
use crate::schedule::root::re_render;
use crate::schedule::scope;

/// Unique identifier for a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A context definition: identity plus the default value used when no
/// provider is installed above a consumer.
pub struct Context<T> {
    id: ContextId,
    default: Arc<T>,
}

impl<T> Clone for Context<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            default: Arc::clone(&self.default),
        }
    }
}

impl<T> Context<T> {
    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn default_value(&self) -> &Arc<T> {
        &self.default
    }
}

/// Define a new context with its default value.
pub fn create_context<T>(default: T) -> Context<T>
where
    T: Send + Sync + 'static,
{
    Context {
        id: ContextId::new(),
        default: Arc::new(default),
    }
}

type ConsumerCallback = Arc<dyn Fn() + Send + Sync>;

/// Shared state of one installed provider: the current value and the
/// ordered consumer subscriptions.
pub struct ProviderState {
    value: RwLock<HookValue>,
    subs: Mutex<IndexMap<ComponentId, ConsumerCallback>>,
}

impl ProviderState {
    fn new(value: HookValue) -> Arc<Self> {
        Arc::new(Self {
            value: RwLock::new(value),
            subs: Mutex::new(IndexMap::new()),
        })
    }

    pub fn current(&self) -> HookValue {
        Arc::clone(&self.value.read())
    }

    /// Subscribe a consumer. A repeat subscription from the same component
    /// keeps its original position and replaces the callback.
    pub fn subscribe(&self, consumer: ComponentId, callback: ConsumerCallback) {
        self.subs.lock().insert(consumer, callback);
    }

    pub fn unsubscribe(&self, consumer: ComponentId) {
        self.subs.lock().shift_remove(&consumer);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subs.lock().len()
    }

    fn notify(&self) {
        let callbacks: Vec<ConsumerCallback> = self.subs.lock().values().cloned().collect();
        trace!(consumers = callbacks.len(), "context value changed");
        for callback in callbacks {
            callback();
        }
    }
}

/// Provider side of a context, owned by the component that installs it.
pub struct ContextProvider<T> {
    context: Context<T>,
    state: Arc<ProviderState>,
}

impl<T> Clone for ContextProvider<T> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> ContextProvider<T>
where
    T: Send + Sync + 'static,
{
    pub fn new(context: &Context<T>, initial: T) -> Self {
        Self {
            context: context.clone(),
            state: ProviderState::new(Arc::new(initial) as HookValue),
        }
    }

    /// Register this provider on the given instance, making it visible to
    /// `use_context` calls rendered under that instance.
    pub fn install(&self, owner: &crate::hooks::store::ComponentInstance) {
        owner.set_provider(self.context.id, Arc::clone(&self.state));
    }

    /// Replace the provided value. Consumers are notified only when the new
    /// value is a different allocation — reference comparison, not equality.
    pub fn set_shared(&self, value: Arc<T>) {
        let value = value as HookValue;
        {
            let current = self.state.value.read();
            if Arc::ptr_eq(&*current, &value) {
                return;
            }
        }
        *self.state.value.write() = value;
        self.state.notify();
    }

    pub fn set_value(&self, value: T) {
        self.set_shared(Arc::new(value));
    }

    pub fn state(&self) -> &Arc<ProviderState> {
        &self.state
    }
}

fn provider_for(
    instance: &crate::hooks::store::ComponentInstance,
    id: ContextId,
) -> Option<Arc<ProviderState>> {
    instance.provider(id)
}

/// Consume a context value.
///
/// Reads the nearest provider installed on the rendering instance, falling
/// back to the context default. Subscribes through a layout effect keyed on
/// the provider's identity: when the provider pushes a value that differs
/// by reference from the one this consumer last rendered with, the consumer
/// is marked dirty and re-rendered under the current update source.
pub fn use_context<T>(context: &Context<T>) -> Result<Arc<T>, RenderError>
where
    T: Send + Sync + 'static,
{
    let instance = scope::current_instance()?;
    let consumer = instance.id();
    let id = context.id;

    let provider = provider_for(&instance, id);
    let value: HookValue = match &provider {
        Some(state) => state.current(),
        None => Arc::clone(context.default_value()) as HookValue,
    };

    let mut deps = DepList::new();
    if let Some(state) = &provider {
        deps.push(crate::hooks::record::DepToken::of_ptr(state));
    }

    let effect_provider = provider.clone();
    use_layout_effect(Some(deps), move || {
        let Some(state) = &effect_provider else { return None };

        let callback_state = Arc::clone(state);
        state.subscribe(
            consumer,
            Arc::new(move || {
                let Some(instance) = lookup(consumer) else { return };
                let fresh = callback_state.current();
                let stale = instance
                    .cached_context_value(id)
                    .map(|cached| Arc::ptr_eq(&cached, &fresh))
                    .unwrap_or(false);
                if stale {
                    return;
                }
                instance.mark_dirty();
                re_render(&instance);
            }),
        );

        let cleanup_state = Arc::clone(state);
        Some(Box::new(move || cleanup_state.unsubscribe(consumer)) as Cleanup)
    })?;

    instance.cache_context_value(id, Arc::clone(&value));

    value.downcast::<T>().map_err(|_| {
        RenderError::UnsupportedNode("context value holds a different type".into())
    })
}
