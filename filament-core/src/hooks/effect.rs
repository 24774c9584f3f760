//! Effect Hooks
//!
//! Effects are collected during render and run in a separate pass, driven
//! by the host after a render completes: layout effects synchronously,
//! deferred effects through the root task queue. A re-render that lands
//! before a scheduled deferred effect has run cancels the stale invocation
//! — at most one run is outstanding per slot.
//!
//! Cleanups run before the slot's next invocation and at unmount, exactly
//! once each; the cleanup cell is shared across lane shadows so a deferred
//! re-render cannot orphan a pending cleanup.

use std::sync::Arc;

use crate::error::RenderError;
use crate::hooks::record::{Cleanup, DepList, EffectKind, HookRecord};
use crate::hooks::refs::RefBinding;
use crate::hooks::store::ComponentInstance;
use crate::schedule::lane::Lane;
use crate::schedule::scope;

fn effect_base(
    kind: EffectKind,
    deps: Option<DepList>,
    callback: impl Fn() -> Option<Cleanup> + Send + Sync + 'static,
) -> Result<(), RenderError> {
    let instance = scope::current_instance()?;
    let lane = instance.active_lane();
    instance.push_effect(lane, kind, Arc::new(callback), deps);
    Ok(())
}

/// Effect hook, run after paint via the host task queue.
pub fn use_effect(
    deps: Option<DepList>,
    callback: impl Fn() -> Option<Cleanup> + Send + Sync + 'static,
) -> Result<(), RenderError> {
    effect_base(EffectKind::Deferred, deps, callback)
}

/// Effect hook, run synchronously in the commit pass.
pub fn use_layout_effect(
    deps: Option<DepList>,
    callback: impl Fn() -> Option<Cleanup> + Send + Sync + 'static,
) -> Result<(), RenderError> {
    effect_base(EffectKind::Layout, deps, callback)
}

/// Expose an imperative value through a parent-supplied ref binding.
///
/// Re-binds when `deps` change or when the binding itself is replaced — the
/// binding's identity token is appended to the dependency list. Slot
/// bindings are cleared on cleanup; callback bindings are told about the
/// removal with `None`, unless they returned their own cleanup.
pub fn use_imperative_handle<T>(
    binding: RefBinding<T>,
    deps: Option<DepList>,
    create: impl Fn() -> T + Send + Sync + 'static,
) -> Result<(), RenderError>
where
    T: Clone + Send + Sync + 'static,
{
    let mut full_deps = deps.unwrap_or_default();
    full_deps.push(binding.identity());

    use_layout_effect(Some(full_deps), move || match &binding {
        RefBinding::Slot(handle) => {
            handle.set_current(create());
            let handle = handle.clone();
            Some(Box::new(move || handle.clear()) as Cleanup)
        }
        RefBinding::Callback(f) => match f(Some(create())) {
            Some(cleanup) => Some(cleanup),
            None => {
                let f = Arc::clone(f);
                Some(Box::new(move || {
                    f(None);
                }) as Cleanup)
            }
        },
    })
}

/// Run the effects collected by the render pass that just finished on the
/// instance's active lane.
pub fn run_effects(instance: &ComponentInstance) {
    let lane = instance.active_lane();
    let snapshot = instance.hook_snapshot(lane);

    for record in snapshot {
        let HookRecord::Effect(slot) = record else { continue };
        if !slot.deps_changed {
            continue;
        }

        match slot.kind {
            EffectKind::Layout => {
                if let Some(cleanup) = slot.cleanup.lock().take() {
                    cleanup();
                }
                let next_cleanup = (slot.callback)();
                *slot.cleanup.lock() = next_cleanup;
            }
            EffectKind::Deferred => {
                // Supersede a still-pending run of this slot.
                if let Some(token) = slot.scheduled.lock().take() {
                    token.cancel();
                }

                let callback = Arc::clone(&slot.callback);
                let cleanup = Arc::clone(&slot.cleanup);
                let scheduled = Arc::clone(&slot.scheduled);
                let token = instance.root().schedule_task(Box::new(move || {
                    if let Some(prev) = cleanup.lock().take() {
                        prev();
                    }
                    let next = callback();
                    *cleanup.lock() = next;
                    scheduled.lock().take();
                }));
                *slot.scheduled.lock() = Some(token);
            }
        }
    }
}

/// Run effect cleanups.
///
/// Between renders (`unmount == false`) only slots whose dependencies
/// changed are cleaned, ahead of their re-run. At unmount every slot is
/// cleaned against the committed list, pending scheduled runs are canceled,
/// and transition retry timers are cancelled with them.
pub fn clean_effects(instance: &ComponentInstance, unmount: bool) {
    let lane = if unmount { Lane::Sync } else { instance.active_lane() };
    let snapshot = instance.hook_snapshot(lane);

    for record in snapshot {
        match record {
            HookRecord::Effect(slot) => {
                if !(unmount || slot.deps_changed) {
                    continue;
                }
                if unmount {
                    if let Some(token) = slot.scheduled.lock().take() {
                        token.cancel();
                    }
                }
                if let Some(cleanup) = slot.cleanup.lock().take() {
                    cleanup();
                }
            }
            HookRecord::Transition(transition) if unmount => {
                transition.clear_timer();
            }
            _ => {}
        }
    }
}
