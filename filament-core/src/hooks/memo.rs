//! Memoization Hooks
//!
//! `use_memo` caches a computed value in its slot and recomputes only when
//! the dependency list changes, per the shallow comparison in
//! [`deps_changed`]. `use_callback` is the same slot specialized to a
//! shared closure, so consumers can compare handler identity across renders
//! with `Arc::ptr_eq`.

use std::sync::Arc;

use crate::error::RenderError;
use crate::hooks::record::{deps_changed, DepList, HookRecord};
use crate::schedule::scope;

/// Memo hook: recompute `create` only when `deps` changed.
///
/// A `None` dependency list recomputes on every render, matching the
/// missing-list rule for effects.
pub fn use_memo<T>(deps: Option<DepList>, create: impl FnOnce() -> T) -> Result<T, RenderError>
where
    T: Clone + Send + Sync + 'static,
{
    let instance = scope::current_instance()?;
    let lane = instance.active_lane();

    let create_deps = deps.clone();
    let value = instance.get_hook(
        lane,
        move || HookRecord::Memo {
            value: Arc::new(create()),
            deps: create_deps,
        },
        |record| match record {
            HookRecord::Memo { deps: old, .. } => deps_changed(deps.as_ref(), old.as_ref()),
            _ => true,
        },
        |record| match record {
            HookRecord::Memo { value, .. } => value.downcast_ref::<T>().cloned(),
            _ => None,
        },
    );

    value.ok_or_else(|| {
        RenderError::UnsupportedNode("hook order changed: memo slot holds a different type".into())
    })
}

/// Callback hook: a closure with identity stable across renders until its
/// dependencies change.
pub fn use_callback<F>(deps: Option<DepList>, callback: F) -> Result<Arc<F>, RenderError>
where
    F: Send + Sync + 'static,
{
    use_memo(deps, move || Arc::new(callback))
}
