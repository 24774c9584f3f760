//! Render Scope
//!
//! Tracks which component instance is currently being rendered, so hook
//! primitives can find their slot storage without threading an explicit
//! handle through every call. A thread-local stack with a drop guard, same
//! shape as the update-source stack: the previous scope is restored on
//! every exit path.
//!
//! Calling a hook primitive with no scope active is a usage error and fails
//! fast with [`RenderError::OutsideRender`].

use std::cell::RefCell;
use std::sync::Arc;

use crate::error::RenderError;
use crate::hooks::store::ComponentInstance;

thread_local! {
    static SCOPE_STACK: RefCell<Vec<Arc<ComponentInstance>>> = RefCell::new(Vec::new());
}

/// Guard marking an instance as the current render target.
///
/// Dropping the guard pops the instance, restoring whatever was being
/// rendered before — nested renders (a component rendering a child
/// synchronously) unwind correctly.
pub struct RenderScope;

impl RenderScope {
    pub fn enter(instance: Arc<ComponentInstance>) -> Self {
        SCOPE_STACK.with(|stack| stack.borrow_mut().push(instance));
        RenderScope
    }
}

impl Drop for RenderScope {
    fn drop(&mut self) {
        SCOPE_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// The instance currently being rendered.
pub fn current_instance() -> Result<Arc<ComponentInstance>, RenderError> {
    SCOPE_STACK
        .with(|stack| stack.borrow().last().cloned())
        .ok_or(RenderError::OutsideRender)
}

/// Whether any render is in progress on this thread.
pub fn is_rendering() -> bool {
    SCOPE_STACK.with(|stack| !stack.borrow().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::root::RenderRoot;

    #[test]
    fn no_scope_is_a_usage_error() {
        assert!(!is_rendering());
        assert_eq!(
            current_instance().err(),
            Some(RenderError::OutsideRender)
        );
    }

    #[test]
    fn scopes_nest_and_restore() {
        let root = RenderRoot::new();
        let outer = ComponentInstance::mount(&root);
        let inner = ComponentInstance::mount(&root);

        {
            let _outer_scope = RenderScope::enter(Arc::clone(&outer));
            assert_eq!(current_instance().unwrap().id(), outer.id());

            {
                let _inner_scope = RenderScope::enter(Arc::clone(&inner));
                assert_eq!(current_instance().unwrap().id(), inner.id());
            }

            assert_eq!(current_instance().unwrap().id(), outer.id());
        }

        assert!(!is_rendering());
    }
}
