//! Component Instances and Hook Storage
//!
//! A [`ComponentInstance`] is the engine-side identity of one mounted
//! functional component: its positional hook slots, its queued updates, and
//! its context bookkeeping. Instances are handed out as `Arc`s and tracked
//! in a process-wide registry by id, so setters and schedulers can reach an
//! instance without holding a strong reference that would keep an unmounted
//! component alive.
//!
//! # How Slot Addressing Works
//!
//! During a render pass, hook primitives claim slots by advancing a
//! render-local pointer; call order is the only addressing scheme. The
//! pointer is reset by [`ComponentInstance::prepare_for_render`], so a
//! component that calls its hooks in a stable order gets stable slots.
//!
//! # Lane Shadowing
//!
//! The committed hook list is the sync list. A deferred render first
//! shadows it ([`ComponentInstance::clone_hooks`], applying the per-kind
//! policy in [`HookRecord::clone_for_deferred`]) and then reads and writes
//! the shadow, leaving the committed view untouched until the deferred pass
//! commits — at which point the shadow is promoted wholesale.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::hooks::context::{ContextId, ProviderState};
use crate::hooks::record::{
    deps_changed, DepList, EffectFn, EffectKind, EffectSlot, HookRecord, HookValue,
};
use crate::schedule::lane::Lane;
use crate::schedule::root::RenderRoot;
use crate::schedule::transition::TransitionId;
use crate::suspense::resource::ResourceId;

/// Unique identifier for a mounted component instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentId(u64);

impl ComponentId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

fn registry() -> &'static DashMap<ComponentId, Weak<ComponentInstance>> {
    static REGISTRY: OnceLock<DashMap<ComponentId, Weak<ComponentInstance>>> = OnceLock::new();
    REGISTRY.get_or_init(DashMap::new)
}

/// Resolve an instance id to a live instance, if it is still mounted.
pub fn lookup(id: ComponentId) -> Option<Arc<ComponentInstance>> {
    registry().get(&id).and_then(|entry| entry.upgrade())
}

/// An update queued against an instance, to be applied just before its next
/// render on the matching lane.
pub struct UpdateTask {
    /// `Some` when the update was issued under a transition; such updates
    /// drain only before deferred-lane renders.
    pub transition_id: Option<TransitionId>,
    pub updater: Box<dyn FnOnce() + Send>,
}

/// Engine-side state of one mounted functional component.
pub struct ComponentInstance {
    id: ComponentId,
    root: Arc<RenderRoot>,
    sync_hooks: Mutex<Vec<HookRecord>>,
    deferred_hooks: Mutex<Vec<HookRecord>>,
    pointer: AtomicUsize,
    render_count: AtomicU32,
    dirty: AtomicBool,
    pending_updates: Mutex<Vec<UpdateTask>>,
    providers: Mutex<HashMap<ContextId, Arc<ProviderState>>>,
    context_values: Mutex<HashMap<ContextId, HookValue>>,
    subscriptions: Mutex<HashMap<ResourceId, Box<dyn FnOnce() + Send>>>,
    torn_down: AtomicBool,
}

impl ComponentInstance {
    /// Mount a fresh instance under `root` and register it for id lookup.
    pub fn mount(root: &Arc<RenderRoot>) -> Arc<Self> {
        let instance = Arc::new(Self {
            id: ComponentId::new(),
            root: Arc::clone(root),
            sync_hooks: Mutex::new(Vec::new()),
            deferred_hooks: Mutex::new(Vec::new()),
            pointer: AtomicUsize::new(0),
            render_count: AtomicU32::new(0),
            dirty: AtomicBool::new(false),
            pending_updates: Mutex::new(Vec::new()),
            providers: Mutex::new(HashMap::new()),
            context_values: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
            torn_down: AtomicBool::new(false),
        });
        registry().insert(instance.id, Arc::downgrade(&instance));
        debug!(id = instance.id.raw(), "mounted component instance");
        instance
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn root(&self) -> &Arc<RenderRoot> {
        &self.root
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Next slot index the render pointer will claim.
    pub fn pointer(&self) -> usize {
        self.pointer.load(Ordering::SeqCst)
    }

    /// Invocations of this instance within the current logical pass.
    pub fn render_count(&self) -> u32 {
        self.render_count.load(Ordering::SeqCst)
    }

    /// Lane of the render pass currently in flight on this instance's root.
    pub fn active_lane(&self) -> Lane {
        self.root.update_type()
    }

    fn hooks(&self, lane: Lane) -> &Mutex<Vec<HookRecord>> {
        match lane {
            Lane::Sync => &self.sync_hooks,
            Lane::Deferred => &self.deferred_hooks,
        }
    }

    /// Rebuild the deferred shadow from the committed list.
    ///
    /// Lock order is sync before deferred, everywhere in this module.
    pub(crate) fn clone_hooks(&self) {
        let sync = self.sync_hooks.lock();
        let mut deferred = self.deferred_hooks.lock();
        let render_count = self.render_count();

        let shadow: Vec<HookRecord> = sync
            .iter()
            .enumerate()
            .map(|(i, record)| record.clone_for_deferred(deferred.get(i), render_count))
            .collect();
        *deferred = shadow;
    }

    /// Make sure the deferred shadow exists before a deferred-lane write
    /// that arrives outside a render pass.
    pub(crate) fn ensure_deferred(&self) {
        let needs_clone = {
            let sync = self.sync_hooks.lock();
            let deferred = self.deferred_hooks.lock();
            deferred.is_empty() && !sync.is_empty()
        };
        if needs_clone {
            self.clone_hooks();
        }
    }

    /// Claim the next slot on `lane` and resolve it to a value.
    ///
    /// The slot is (re)initialized with `create` when it does not exist yet
    /// or when `should_update` says the existing record is stale; `reduce`
    /// then projects the final record to the caller's result. `create` runs
    /// with no hook-list lock held, so it may touch other engine state.
    pub fn get_hook<R>(
        &self,
        lane: Lane,
        create: impl FnOnce() -> HookRecord,
        should_update: impl FnOnce(&HookRecord) -> bool,
        reduce: impl FnOnce(&HookRecord) -> R,
    ) -> R {
        if lane == Lane::Deferred {
            self.ensure_deferred();
        }
        let index = self.pointer.fetch_add(1, Ordering::SeqCst);

        let needs_create = {
            let list = self.hooks(lane).lock();
            match list.get(index) {
                Some(record) => should_update(record),
                None => true,
            }
        };

        if needs_create {
            let record = create();
            let mut list = self.hooks(lane).lock();
            if index < list.len() {
                list[index] = record;
            } else {
                list.push(record);
            }
        }

        let list = self.hooks(lane).lock();
        reduce(&list[index])
    }

    /// Claim the next slot as an effect.
    ///
    /// The cleanup and scheduling cells of a previous effect in the same
    /// slot are carried over, so a pending cleanup is never orphaned by a
    /// re-render; dependency change is decided here, at render time.
    pub fn push_effect(
        &self,
        lane: Lane,
        kind: EffectKind,
        callback: EffectFn,
        deps: Option<DepList>,
    ) {
        if lane == Lane::Deferred {
            self.ensure_deferred();
        }
        let index = self.pointer.fetch_add(1, Ordering::SeqCst);

        let mut list = self.hooks(lane).lock();
        let previous = match list.get(index) {
            Some(HookRecord::Effect(prev)) => Some(prev),
            _ => None,
        };

        let changed = deps_changed(deps.as_ref(), previous.and_then(|p| p.deps.as_ref()));
        let slot = EffectSlot {
            kind,
            callback,
            cleanup: previous
                .map(|p| Arc::clone(&p.cleanup))
                .unwrap_or_else(|| Arc::new(Mutex::new(None))),
            deps,
            deps_changed: changed,
            scheduled: previous
                .map(|p| Arc::clone(&p.scheduled))
                .unwrap_or_else(|| Arc::new(Mutex::new(None))),
        };

        let record = HookRecord::Effect(slot);
        if index < list.len() {
            list[index] = record;
        } else {
            list.push(record);
        }
    }

    /// Queue an update to be applied before this instance's next render on
    /// the matching lane.
    pub fn queue_update(&self, task: UpdateTask) {
        self.pending_updates.lock().push(task);
    }

    /// Apply queued updates whose lane matches, in arrival order. Updates
    /// for the other lane stay queued.
    pub(crate) fn flush_pending_updates(&self, lane: Lane) {
        let drained: Vec<UpdateTask> = self.pending_updates.lock().drain(..).collect();

        let mut kept = Vec::new();
        let mut to_run = Vec::new();
        for task in drained {
            let deferred = task.transition_id.is_some();
            if deferred == (lane == Lane::Deferred) {
                to_run.push(task);
            } else {
                kept.push(task);
            }
        }
        self.pending_updates.lock().extend(kept);

        for task in to_run {
            (task.updater)();
        }
    }

    /// Reset slot addressing for a new render pass on `lane`, shadow the
    /// hook list for deferred passes, and apply matching queued updates.
    ///
    /// The shadow is rebuilt only on the first render of a logical pass: a
    /// retry after a suspended deferred render must keep the shadow it
    /// already drained its updates into.
    pub fn prepare_for_render(&self, lane: Lane) {
        self.pointer.store(0, Ordering::SeqCst);
        let count = self.render_count.fetch_add(1, Ordering::SeqCst) + 1;
        if lane == Lane::Deferred && count == 1 {
            self.clone_hooks();
        }
        self.flush_pending_updates(lane);
    }

    /// Seal the render pass that just ran on `lane`.
    ///
    /// A deferred commit promotes the shadow to the committed list; a sync
    /// commit invalidates the shadow outright, since it was derived from a
    /// committed view that no longer exists.
    pub fn commit(&self, lane: Lane) {
        {
            let mut sync = self.sync_hooks.lock();
            let mut deferred = self.deferred_hooks.lock();
            match lane {
                Lane::Deferred => {
                    if !deferred.is_empty() {
                        *sync = std::mem::take(&mut *deferred);
                    }
                }
                Lane::Sync => {
                    deferred.clear();
                }
            }
        }
        self.render_count.store(0, Ordering::SeqCst);
        self.dirty.store(false, Ordering::SeqCst);
    }

    /// The committed (sync-lane) value of the state slot at `index`.
    pub fn committed_state_value(&self, index: usize) -> Option<HookValue> {
        let sync = self.sync_hooks.lock();
        match sync.get(index) {
            Some(HookRecord::State { value }) => Some(Arc::clone(value)),
            _ => None,
        }
    }

    /// Replace the value of the state slot at `index` on `lane`.
    ///
    /// `update` runs with no lock held; it receives the current value and
    /// returns the next one.
    pub fn set_state_value(
        &self,
        lane: Lane,
        index: usize,
        update: impl FnOnce(HookValue) -> HookValue,
    ) {
        if lane == Lane::Deferred {
            self.ensure_deferred();
        }

        let current = {
            let list = self.hooks(lane).lock();
            match list.get(index) {
                Some(HookRecord::State { value }) => Arc::clone(value),
                _ => return,
            }
        };

        let next = update(current);

        let mut list = self.hooks(lane).lock();
        if let Some(HookRecord::State { value }) = list.get_mut(index) {
            *value = next;
        }
    }

    /// Snapshot of the hook list on `lane`. Records clone shallowly, so the
    /// snapshot observes the same underlying cells.
    pub fn hook_snapshot(&self, lane: Lane) -> Vec<HookRecord> {
        self.hooks(lane).lock().clone()
    }

    /// Record that this instance provides a context.
    pub fn set_provider(&self, id: ContextId, state: Arc<ProviderState>) {
        self.providers.lock().insert(id, state);
    }

    /// The provider state this instance installed for `id`, if any.
    pub fn provider(&self, id: ContextId) -> Option<Arc<ProviderState>> {
        self.providers.lock().get(&id).cloned()
    }

    /// Remember the context value this instance last consumed, for change
    /// comparison when the provider pushes a new one.
    pub fn cache_context_value(&self, id: ContextId, value: HookValue) {
        self.context_values.lock().insert(id, value);
    }

    pub fn cached_context_value(&self, id: ContextId) -> Option<HookValue> {
        self.context_values.lock().get(&id).cloned()
    }

    /// Whether this instance already watches the given resource.
    pub fn has_subscription(&self, id: ResourceId) -> bool {
        self.subscriptions.lock().contains_key(&id)
    }

    /// Store the unsubscribe closure for a resource watch; run at teardown.
    pub fn store_subscription(&self, id: ResourceId, unsubscribe: Box<dyn FnOnce() + Send>) {
        self.subscriptions.lock().insert(id, unsubscribe);
    }

    /// Unmount this instance: run effect cleanups, drop resource watches,
    /// and unregister from id lookup. Idempotent.
    pub fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }

        crate::hooks::effect::clean_effects(self, true);

        let subscriptions: Vec<_> = {
            let mut subs = self.subscriptions.lock();
            subs.drain().map(|(_, unsubscribe)| unsubscribe).collect()
        };
        for unsubscribe in subscriptions {
            unsubscribe();
        }

        registry().remove(&self.id);
        debug!(id = self.id.raw(), "tore down component instance");
    }
}
