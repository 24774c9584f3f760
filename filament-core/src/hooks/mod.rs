//! Hook Primitives
//!
//! Positional hook storage and the primitives built on top of it: state and
//! reducers, memoized values and callbacks, refs and imperative handles,
//! effects, and context. Slots are addressed by call order within a render
//! pass, so the one rule components must follow is calling their hooks in a
//! stable order.

pub mod context;
pub mod effect;
pub mod memo;
pub mod record;
pub mod refs;
pub mod state;
pub mod store;

pub use context::{create_context, use_context, Context, ContextProvider, ProviderState};
pub use effect::{clean_effects, run_effects, use_effect, use_imperative_handle, use_layout_effect};
pub use memo::{use_callback, use_memo};
pub use record::{deps_changed, Cleanup, DepList, DepToken, EffectKind, HookRecord, HookValue};
pub use refs::{use_ref, RefBinding, RefHandle};
pub use state::{
    use_id, use_reducer, use_reducer_with, use_state, use_state_with, Dispatcher, StateSetter,
};
pub use store::{lookup, ComponentId, ComponentInstance, UpdateTask};
