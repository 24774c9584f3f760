//! Transitions
//!
//! A transition is a named, stateful batch of updates that may include
//! asynchronous work and exposes a pending flag to consumers. State setters
//! invoked while a transition is the current update source are tagged with
//! its identity and materialize on the deferred lane, so the committed sync
//! view stays untouched until the transition's work lands.
//!
//! # Lifecycle
//!
//! A transition record is created on first use of [`use_transition`] in a
//! component (or per call for the standalone [`start_transition`]), mutated
//! on every `start` invocation — reset to the `Start` state, pending
//! suspense cleared, prior timer cancelled — and retired only when the
//! owning instance is torn down.
//!
//! # Async Actions
//!
//! A start callback may hand back an [`AsyncAction`], the engine's explicit
//! stand-in for a returned thenable. The transition then surfaces its
//! pending flag immediately (so a loading state is visible before the async
//! result), counts overlapping actions, and clears pending only when every
//! outstanding action has settled. Rejections are logged, never rethrown
//! into rendering: one failing transition cannot crash unrelated work.
//!
//! Restarting a transition while an action is still in flight does *not*
//! reset the counter — the superseded action's eventual settlement still
//! decrements it, and pending clears only at zero. An in-flight action
//! itself is never cancelled.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::error;

use crate::error::RenderError;
use crate::hooks::record::{DepList, DepToken, HookRecord};
use crate::hooks::state::use_state;
use crate::hooks::store::{lookup, ComponentId};
use crate::schedule::lane::{self, UpdateSource};
use crate::schedule::root::{re_render, RenderRoot, TaskToken};
use crate::schedule::scope;
use crate::suspense::resource::{ResourceId, SuspendedResource};

/// Unique identifier for a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransitionId(u64);

impl TransitionId {
    fn new() -> Self {
        // 0 is reserved for the predefined deferred transition.
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Where a transition is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionState {
    /// Created, never started.
    Initial,

    /// `start` has been invoked at least once since creation or the last
    /// quiescent window.
    Start,
}

/// Backing record of a transition.
///
/// Shared by reference between the sync and deferred hook lists — never
/// cloned — so its bookkeeping is single-sourced regardless of which lane
/// observes it.
pub struct TransitionSlot {
    id: TransitionId,
    owner: Option<ComponentId>,
    state: Mutex<TransitionState>,
    is_pending: AtomicBool,
    try_count: AtomicU32,
    pending_suspense: Mutex<SmallVec<[ResourceId; 2]>>,
    is_running_async_action: AtomicBool,
    async_action_count: AtomicU32,
    timer: Mutex<Option<TaskToken>>,
}

impl TransitionSlot {
    fn new(id: TransitionId, owner: Option<ComponentId>, state: TransitionState) -> Arc<Self> {
        Arc::new(Self {
            id,
            owner,
            state: Mutex::new(state),
            is_pending: AtomicBool::new(false),
            try_count: AtomicU32::new(0),
            pending_suspense: Mutex::new(SmallVec::new()),
            is_running_async_action: AtomicBool::new(false),
            async_action_count: AtomicU32::new(0),
            timer: Mutex::new(None),
        })
    }

    /// A transition bound to a component instance, as created by
    /// [`use_transition`].
    pub(crate) fn owned(owner: ComponentId) -> Arc<Self> {
        Self::new(TransitionId::new(), Some(owner), TransitionState::Initial)
    }

    /// A short-lived transition with no owning component.
    pub fn standalone() -> Arc<Self> {
        Self::new(TransitionId::new(), None, TransitionState::Start)
    }

    pub fn id(&self) -> TransitionId {
        self.id
    }

    pub fn is_pending(&self) -> bool {
        self.is_pending.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> TransitionState {
        *self.state.lock()
    }

    pub fn try_count(&self) -> u32 {
        self.try_count.load(Ordering::SeqCst)
    }

    pub fn async_action_count(&self) -> u32 {
        self.async_action_count.load(Ordering::SeqCst)
    }

    pub fn is_running_async_action(&self) -> bool {
        self.is_running_async_action.load(Ordering::SeqCst)
    }

    pub fn pending_suspense_count(&self) -> usize {
        self.pending_suspense.lock().len()
    }

    /// Cancel the pending retry timer, if one is scheduled.
    pub(crate) fn clear_timer(&self) {
        if let Some(token) = self.timer.lock().take() {
            token.cancel();
        }
    }

    /// Surface the pending flag and re-render the owning component under
    /// the given source. The flag is not a state slot, so the instance is
    /// force-marked dirty.
    fn update_pending_state(self: &Arc<Self>, pending: bool, source: &UpdateSource) {
        self.is_pending.store(pending, Ordering::SeqCst);

        let Some(owner) = self.owner else { return };
        let Some(instance) = lookup(owner) else { return };

        instance.mark_dirty();
        match source {
            UpdateSource::Transition(_) => {
                lane::with_transition(Arc::clone(self), || re_render(&instance));
            }
            other => {
                lane::with_update_source(other.clone(), || re_render(&instance));
            }
        }
    }

    /// Record a suspension raised while rendering under this transition and
    /// arrange a retry once the resource settles.
    ///
    /// The retry is scheduled onto the root task queue; its cancel token
    /// becomes the transition's timer, so restarting the transition discards
    /// a stale retry.
    pub(crate) fn track_suspense(
        self: &Arc<Self>,
        handle: &SuspendedResource,
        root: &Arc<RenderRoot>,
    ) {
        {
            let mut pending = self.pending_suspense.lock();
            if pending.contains(&handle.resource_id()) {
                return;
            }
            pending.push(handle.resource_id());
        }

        let Some(owner) = self.owner else { return };

        let transition = Arc::clone(self);
        let root = Arc::clone(root);
        let resource_id = handle.resource_id();
        handle.on_settle(move || {
            let Some(instance) = lookup(owner) else { return };
            transition
                .pending_suspense
                .lock()
                .retain(|id| *id != resource_id);
            transition.try_count.fetch_add(1, Ordering::SeqCst);

            let retry_transition = Arc::clone(&transition);
            let retry_root = Arc::clone(&root);
            let token = root.schedule_task(Box::new(move || {
                lane::with_transition(Arc::clone(&retry_transition), || {
                    instance.mark_dirty();
                    re_render(&instance);
                    retry_root.process_deferred_work();
                });
            }));
            *transition.timer.lock() = Some(token);
        });
    }

    /// Clear the pending flag once nothing keeps this transition alive: no
    /// outstanding async action and no unsettled suspension. Called after a
    /// deferred drain that ran under this transition.
    pub(crate) fn settle_if_idle(self: &Arc<Self>) {
        if self.is_pending()
            && self.async_action_count.load(Ordering::SeqCst) == 0
            && !self.is_running_async_action()
            && self.pending_suspense.lock().is_empty()
        {
            self.update_pending_state(false, &UpdateSource::Default);
        }
    }
}

/// The predefined transition that backs the plain deferred lane:
/// deferred-tagged updates that were not issued under any named transition
/// fold into this one.
pub(crate) fn predefined_deferred() -> Arc<TransitionSlot> {
    static PREDEFINED: OnceLock<Arc<TransitionSlot>> = OnceLock::new();
    Arc::clone(PREDEFINED.get_or_init(|| {
        TransitionSlot::new(TransitionId(0), None, TransitionState::Start)
    }))
}

type SettleResult = Result<(), String>;

/// An explicit handle for asynchronous work started inside a transition —
/// the engine's stand-in for a returned thenable. Settles at most once.
pub struct AsyncAction {
    inner: Arc<ActionInner>,
}

struct ActionInner {
    settled: Mutex<Option<SettleResult>>,
    waiters: Mutex<Vec<Box<dyn FnOnce(&SettleResult) + Send>>>,
}

impl Clone for AsyncAction {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for AsyncAction {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncAction {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ActionInner {
                settled: Mutex::new(None),
                waiters: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn resolve(&self) {
        self.settle(Ok(()));
    }

    pub fn reject(&self, reason: impl Into<String>) {
        self.settle(Err(reason.into()));
    }

    pub fn is_settled(&self) -> bool {
        self.inner.settled.lock().is_some()
    }

    fn settle(&self, result: SettleResult) {
        {
            let mut settled = self.inner.settled.lock();
            if settled.is_some() {
                return;
            }
            *settled = Some(result.clone());
        }
        let waiters: Vec<_> = self.inner.waiters.lock().drain(..).collect();
        for waiter in waiters {
            waiter(&result);
        }
    }

    /// Register a settlement callback; invoked immediately if already
    /// settled.
    pub fn on_settle(&self, f: impl FnOnce(&SettleResult) + Send + 'static) {
        let settled = self.inner.settled.lock().clone();
        match settled {
            Some(result) => f(&result),
            None => self.inner.waiters.lock().push(Box::new(f)),
        }
    }
}

/// Component-facing handle returned by [`use_transition`].
pub struct TransitionHandle {
    slot: Arc<TransitionSlot>,
}

impl Clone for TransitionHandle {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl TransitionHandle {
    pub fn is_pending(&self) -> bool {
        self.slot.is_pending()
    }

    pub fn slot(&self) -> &Arc<TransitionSlot> {
        &self.slot
    }

    /// Start (or restart) the transition.
    ///
    /// `cb` runs with this transition as the current update source, so any
    /// state setter invoked synchronously inside is tagged with it. If `cb`
    /// hands back an [`AsyncAction`], pending is surfaced immediately and
    /// the deferred work loop is kicked so a loading state is visible
    /// without waiting for the async result.
    pub fn start(&self, cb: impl FnOnce() -> Option<AsyncAction>) {
        let slot = &self.slot;
        let initial_source = lane::current_update_source();
        let root = slot.owner.and_then(lookup).map(|instance| Arc::clone(instance.root()));

        // Restart: back to the start state, prior suspense and timer
        // discarded. The async-action counter is deliberately left alone.
        *slot.state.lock() = TransitionState::Start;
        slot.pending_suspense.lock().clear();
        slot.is_running_async_action.store(false, Ordering::SeqCst);
        slot.clear_timer();

        let result = lane::with_transition(Arc::clone(slot), cb);

        // Checked after cb ran: did this window leave deferred work
        // outstanding?
        let has_outstanding_deferred = root
            .as_ref()
            .map(|root| root.has_deferred_work())
            .unwrap_or(false);

        if let Some(action) = result {
            slot.async_action_count.fetch_add(1, Ordering::SeqCst);
            slot.is_running_async_action.store(true, Ordering::SeqCst);
            slot.update_pending_state(true, &UpdateSource::Transition(Arc::clone(slot)));

            if let Some(root) = &root {
                lane::with_transition(Arc::clone(slot), || root.process_deferred_work());
            }

            let slot = Arc::clone(slot);
            let initial_source = initial_source.clone();
            action.on_settle(move |result| {
                if let Err(reason) = result {
                    error!(%reason, "async transition action failed");
                }
                let remaining = slot.async_action_count.fetch_sub(1, Ordering::SeqCst) - 1;
                if remaining == 0 {
                    slot.is_running_async_action.store(false, Ordering::SeqCst);
                    slot.update_pending_state(false, &initial_source);
                }
            });
        } else if has_outstanding_deferred {
            // A synchronous callback only surfaces pending when its updates
            // landed in a window with deferred work already outstanding —
            // otherwise the indicator would flash for no visible reason.
            slot.update_pending_state(true, &initial_source);
        }
    }
}

/// Transition hook: returns the pending flag and a start handle.
///
/// The backing record is created once per slot and kept stable by identity
/// for the life of the instance.
pub fn use_transition() -> Result<(bool, TransitionHandle), RenderError> {
    let instance = scope::current_instance()?;
    let lane = instance.active_lane();
    let owner = instance.id();

    let slot = instance.get_hook(
        lane,
        move || HookRecord::Transition(TransitionSlot::owned(owner)),
        |_| false,
        |hook| match hook {
            HookRecord::Transition(slot) => Some(Arc::clone(slot)),
            _ => None,
        },
    );

    let slot = slot.ok_or_else(|| {
        RenderError::UnsupportedNode(
            "hook order changed: transition slot holds a different kind".into(),
        )
    })?;
    Ok((slot.is_pending(), TransitionHandle { slot }))
}

/// Standalone transition entry point: same lane tagging as the hook form,
/// without the component-bound pending surfacing. A rejected async action is
/// reported, not rethrown, so it cannot crash the caller.
pub fn start_transition(cb: impl FnOnce() -> Option<AsyncAction>) {
    let slot = TransitionSlot::standalone();
    let result = lane::with_transition(slot, cb);

    if let Some(action) = result {
        action.on_settle(|result| {
            if let Err(reason) = result {
                error!(%reason, "uncaught error in transition");
            }
        });
    }
}

/// Deferred-value hook.
///
/// Seeds local state with `initial` if supplied, else the first `value`.
/// Whenever `value` changes, a transition-wrapped state update is scheduled
/// to the new value, so the previously rendered value stays visible under
/// the sync lane until the deferred re-render completes.
pub fn use_deferred_value<T>(value: T, initial: Option<T>) -> Result<T, RenderError>
where
    T: Clone + PartialEq + std::hash::Hash + Send + Sync + 'static,
{
    let seed = initial.unwrap_or_else(|| value.clone());
    let (current, setter) = use_state(seed)?;

    let mut deps = DepList::new();
    deps.push(DepToken::of_hash(&value));

    crate::hooks::effect::use_effect(Some(deps), move || {
        let value = value.clone();
        let setter = setter.clone();
        start_transition(move || {
            setter.set(value);
            None
        });
        None
    })?;

    Ok(current)
}
