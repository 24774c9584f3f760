//! Hook Records
//!
//! A hook record is one positionally-addressed memory slot in a component
//! instance. The record is a tagged union over hook kinds — state, ref,
//! memo/callback, effect, transition — rather than duck-typed property
//! sniffing, so the per-kind clone policy below is exhaustive by
//! construction.
//!
//! # Lane Shadowing
//!
//! Every instance keeps two parallel lists of these records: the committed
//! "sync" list and a "deferred" shadow used while a transition render is in
//! flight. The shadow is produced by [`HookRecord::clone_for_deferred`],
//! which applies a per-kind policy:
//!
//! - state and memo records copy the record one level deep (the stored
//!   values themselves stay shared `Arc`s),
//! - transition records are shared by reference — a transition's pending
//!   and async bookkeeping must be single-sourced however it is read,
//! - ref records are shared by reference only on a second-or-later render
//!   within the same logical pass, so `.current` identity survives
//!   re-entrant renders while each logical render still gets its own
//!   by-value snapshot.

use std::any::Any;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::schedule::root::TaskToken;
use crate::schedule::transition::TransitionSlot;

/// A type-erased hook value.
pub type HookValue = Arc<dyn Any + Send + Sync>;

/// A cleanup returned by an effect body.
pub type Cleanup = Box<dyn FnOnce() + Send>;

/// An effect body. Returns an optional cleanup to run before the next
/// invocation of the same slot, or on unmount.
pub type EffectFn = Arc<dyn Fn() -> Option<Cleanup> + Send + Sync>;

/// One entry in a dependency list.
///
/// Dependencies are compared by token equality, the moral equivalent of the
/// shallow per-element identity comparison hook dependencies use elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepToken(u64);

impl DepToken {
    /// Token derived from a value's hash.
    pub fn of_hash<T: Hash + ?Sized>(value: &T) -> Self {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        DepToken(hasher.finish())
    }

    /// Token derived from an `Arc`'s allocation identity.
    pub fn of_ptr<T: ?Sized>(value: &Arc<T>) -> Self {
        DepToken(Arc::as_ptr(value) as *const () as u64)
    }

    /// Token from a raw value, for callers that manage identity themselves.
    pub fn raw(value: u64) -> Self {
        DepToken(value)
    }
}

/// A dependency list. Short in practice, so kept inline.
pub type DepList = SmallVec<[DepToken; 4]>;

/// Shallow dependency comparison.
///
/// A hook with no previous dependency list, no new one, or a previous list
/// of different length is always considered changed.
pub fn deps_changed(deps: Option<&DepList>, old: Option<&DepList>) -> bool {
    match (deps, old) {
        (Some(deps), Some(old)) => {
            deps.len() != old.len() || deps.iter().zip(old.iter()).any(|(a, b)| a != b)
        }
        _ => true,
    }
}

/// Backing cell of a ref hook. Shared by `Arc` so identity can be preserved
/// across lane shadowing.
pub struct RefCellSlot {
    pub current: Mutex<HookValue>,
}

/// Shared handle to a ref hook's cell.
pub type RefSlot = Arc<RefCellSlot>;

/// When an effect body runs relative to the commit pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectKind {
    /// Runs synchronously during the commit pass.
    Layout,

    /// Scheduled onto the host task queue, after the next paint opportunity.
    Deferred,
}

/// An effect hook slot. Effects are accumulated during render and invoked
/// in a separate pass.
pub struct EffectSlot {
    pub kind: EffectKind,

    /// The effect body for this render.
    pub callback: EffectFn,

    /// Cleanup left behind by the previous run, shared across lane shadows
    /// so it runs exactly once.
    pub cleanup: Arc<Mutex<Option<Cleanup>>>,

    pub deps: Option<DepList>,

    /// Whether `deps` differ from the previous render's. Decided at render
    /// time; the run pass only reads it.
    pub deps_changed: bool,

    /// Cancel token of a scheduled-but-not-yet-run invocation, used to
    /// deduplicate deferred effect runs.
    pub scheduled: Arc<Mutex<Option<TaskToken>>>,
}

impl Clone for EffectSlot {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            callback: Arc::clone(&self.callback),
            cleanup: Arc::clone(&self.cleanup),
            deps: self.deps.clone(),
            deps_changed: self.deps_changed,
            scheduled: Arc::clone(&self.scheduled),
        }
    }
}

/// One hook slot, tagged by kind.
pub enum HookRecord {
    /// `use_state` / `use_reducer`: the committed value.
    State { value: HookValue },

    /// `use_ref`: a shared mutable cell.
    Ref(RefSlot),

    /// `use_memo` / `use_callback`: cached value gated by dependencies.
    Memo {
        value: HookValue,
        deps: Option<DepList>,
    },

    /// `use_effect` / `use_layout_effect`.
    Effect(EffectSlot),

    /// `use_transition`: long-lived, shared across both lane lists.
    Transition(Arc<TransitionSlot>),
}

impl Clone for HookRecord {
    fn clone(&self) -> Self {
        match self {
            HookRecord::State { value } => HookRecord::State {
                value: Arc::clone(value),
            },
            HookRecord::Ref(slot) => HookRecord::Ref(Arc::clone(slot)),
            HookRecord::Memo { value, deps } => HookRecord::Memo {
                value: Arc::clone(value),
                deps: deps.clone(),
            },
            HookRecord::Effect(slot) => HookRecord::Effect(slot.clone()),
            HookRecord::Transition(slot) => HookRecord::Transition(Arc::clone(slot)),
        }
    }
}

impl HookRecord {
    /// Produce this record's entry in the deferred shadow list.
    ///
    /// `existing` is the slot currently occupying the same index in the
    /// deferred list, if any; `render_count` is the number of invocations
    /// of the owning instance within the current logical pass.
    pub fn clone_for_deferred(
        &self,
        existing: Option<&HookRecord>,
        render_count: u32,
    ) -> HookRecord {
        match self {
            HookRecord::State { value } => HookRecord::State {
                value: Arc::clone(value),
            },
            HookRecord::Memo { value, deps } => HookRecord::Memo {
                value: Arc::clone(value),
                deps: deps.clone(),
            },
            HookRecord::Effect(slot) => HookRecord::Effect(slot.clone()),
            // Never cloned: pending/async state must stay consistent
            // however it is read.
            HookRecord::Transition(slot) => HookRecord::Transition(Arc::clone(slot)),
            HookRecord::Ref(slot) => {
                if render_count > 1 {
                    // Re-entrant render within one pass: retain the identity
                    // consumers may already hold.
                    if let Some(HookRecord::Ref(prev)) = existing {
                        return HookRecord::Ref(Arc::clone(prev));
                    }
                    HookRecord::Ref(Arc::clone(slot))
                } else {
                    HookRecord::Ref(Arc::new(RefCellSlot {
                        current: Mutex::new(slot.current.lock().clone()),
                    }))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn deps_changed_rules() {
        let a: DepList = smallvec![DepToken::raw(1), DepToken::raw(2)];
        let same: DepList = smallvec![DepToken::raw(1), DepToken::raw(2)];
        let different: DepList = smallvec![DepToken::raw(1), DepToken::raw(3)];
        let shorter: DepList = smallvec![DepToken::raw(1)];

        assert!(!deps_changed(Some(&a), Some(&same)));
        assert!(deps_changed(Some(&a), Some(&different)));
        assert!(deps_changed(Some(&a), Some(&shorter)));

        // Missing lists always count as changed.
        assert!(deps_changed(None, Some(&a)));
        assert!(deps_changed(Some(&a), None));
        assert!(deps_changed(None, None));
    }

    #[test]
    fn dep_token_of_hash_is_stable() {
        assert_eq!(DepToken::of_hash("abc"), DepToken::of_hash("abc"));
        assert_ne!(DepToken::of_hash("abc"), DepToken::of_hash("abd"));
    }

    #[test]
    fn transition_records_are_shared_across_lanes() {
        let slot = TransitionSlot::standalone();
        let record = HookRecord::Transition(Arc::clone(&slot));

        let shadow = record.clone_for_deferred(None, 1);
        match shadow {
            HookRecord::Transition(cloned) => assert!(Arc::ptr_eq(&cloned, &slot)),
            _ => panic!("expected a transition record"),
        }
    }

    #[test]
    fn ref_records_copy_on_first_render_of_a_pass() {
        let slot: RefSlot = Arc::new(RefCellSlot {
            current: Mutex::new(Arc::new(10i32) as HookValue),
        });
        let record = HookRecord::Ref(Arc::clone(&slot));

        let shadow = record.clone_for_deferred(None, 1);
        match shadow {
            HookRecord::Ref(copied) => {
                assert!(!Arc::ptr_eq(&copied, &slot));
                let value = copied.current.lock().clone();
                assert_eq!(value.downcast_ref::<i32>(), Some(&10));
            }
            _ => panic!("expected a ref record"),
        }
    }

    #[test]
    fn ref_records_retain_identity_on_reentrant_render() {
        let slot: RefSlot = Arc::new(RefCellSlot {
            current: Mutex::new(Arc::new(1i32) as HookValue),
        });
        let record = HookRecord::Ref(Arc::clone(&slot));

        // No existing deferred entry: share the sync cell itself.
        let shadow = record.clone_for_deferred(None, 2);
        match shadow {
            HookRecord::Ref(shared) => assert!(Arc::ptr_eq(&shared, &slot)),
            _ => panic!("expected a ref record"),
        }

        // With an existing deferred entry: keep that one.
        let existing_slot: RefSlot = Arc::new(RefCellSlot {
            current: Mutex::new(Arc::new(2i32) as HookValue),
        });
        let existing = HookRecord::Ref(Arc::clone(&existing_slot));
        let shadow = record.clone_for_deferred(Some(&existing), 2);
        match shadow {
            HookRecord::Ref(kept) => assert!(Arc::ptr_eq(&kept, &existing_slot)),
            _ => panic!("expected a ref record"),
        }
    }

    #[test]
    fn state_records_share_the_value_arc() {
        let value: HookValue = Arc::new(String::from("committed"));
        let record = HookRecord::State {
            value: Arc::clone(&value),
        };
        match record.clone_for_deferred(None, 1) {
            HookRecord::State { value: copied } => assert!(Arc::ptr_eq(&copied, &value)),
            _ => panic!("expected a state record"),
        }
    }
}
