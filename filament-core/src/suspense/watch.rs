//! Resource Watching
//!
//! `watch` reads a resource from a render body and keeps the component
//! subscribed to it: every later emission re-renders the watcher, on the
//! deferred lane by default or synchronously via `watch_sync`. The
//! subscription is established at most once per resource and component —
//! re-renders reuse it — and is dropped when the component unmounts.

use std::sync::Arc;

use crate::error::RenderAbort;
use crate::hooks::store::lookup;
use crate::schedule::lane;
use crate::schedule::root::re_render;
use crate::schedule::scope;
use crate::suspense::resource::Resource;

fn watch_base<T>(resource: &Resource<T>, sync: bool) -> Result<T, RenderAbort>
where
    T: Clone + Send + Sync + 'static,
{
    let instance = scope::current_instance()?;

    if !instance.has_subscription(resource.id()) {
        let owner = instance.id();
        let key = resource.subscribe(Arc::new(move |_| {
            let Some(watcher) = lookup(owner) else { return };
            watcher.mark_dirty();
            if sync {
                lane::sync_updates(|| re_render(&watcher));
            } else {
                lane::deferred_updates(|| re_render(&watcher));
            }
        }));

        let subscribed = resource.clone();
        instance.store_subscription(
            resource.id(),
            Box::new(move || subscribed.unsubscribe(key)),
        );
    }

    resource.read()
}

/// Read `resource` and re-render on later emissions via the deferred lane,
/// so a stream of values coalesces with other low-priority work.
pub fn watch<T>(resource: &Resource<T>) -> Result<T, RenderAbort>
where
    T: Clone + Send + Sync + 'static,
{
    watch_base(resource, false)
}

/// Read `resource` and re-render on later emissions immediately, bypassing
/// the deferred queue. For values the user is directly looking at.
pub fn watch_sync<T>(resource: &Resource<T>) -> Result<T, RenderAbort>
where
    T: Clone + Send + Sync + 'static,
{
    watch_base(resource, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderOutcome;
    use crate::hooks::store::ComponentInstance;
    use crate::schedule::lane::Lane;
    use crate::schedule::root::{render_body, render_component, RenderRoot};

    fn watch_render(
        instance: &Arc<ComponentInstance>,
        resource: &Resource<i32>,
        sync: bool,
    ) -> RenderOutcome<i32> {
        let outcome = render_component(instance, Lane::Sync, || {
            render_body(|| if sync { watch_sync(resource) } else { watch(resource) })
        });
        if outcome.is_ready() {
            instance.commit(Lane::Sync);
        }
        outcome
    }

    #[test]
    fn pending_watch_suspends_but_still_subscribes() {
        let root = RenderRoot::new();
        let instance = ComponentInstance::mount(&root);
        let resource = Resource::<i32>::pending();

        let outcome = watch_render(&instance, &resource, false);
        assert!(outcome.is_suspended());
        assert_eq!(resource.listener_count(), 1);

        instance.teardown();
    }

    #[test]
    fn re_renders_reuse_the_subscription() {
        let root = RenderRoot::new();
        let instance = ComponentInstance::mount(&root);
        let resource = Resource::fulfilled(1i32);

        for _ in 0..3 {
            let outcome = watch_render(&instance, &resource, false);
            assert_eq!(outcome.ready(), Some(1));
        }
        assert_eq!(resource.listener_count(), 1);

        instance.teardown();
    }

    #[test]
    fn emissions_queue_deferred_re_renders() {
        let root = RenderRoot::new();
        let instance = ComponentInstance::mount(&root);
        let resource = Resource::fulfilled(1i32);

        watch_render(&instance, &resource, false);
        assert!(!instance.is_dirty());

        resource.emit(2);
        assert!(instance.is_dirty());
        assert!(root.has_deferred_work());

        instance.teardown();
    }

    #[test]
    fn sync_watch_re_renders_through_the_driver_immediately() {
        use std::sync::atomic::{AtomicI32, Ordering};

        let root = RenderRoot::new();
        let driven = Arc::new(AtomicI32::new(0));
        let driven_clone = Arc::clone(&driven);
        root.set_driver(Arc::new(move |_, lane| {
            assert_eq!(lane, Lane::Sync);
            driven_clone.fetch_add(1, Ordering::SeqCst);
        }));

        let instance = ComponentInstance::mount(&root);
        let resource = Resource::fulfilled(1i32);

        watch_render(&instance, &resource, true);
        resource.emit(2);

        assert_eq!(driven.load(Ordering::SeqCst), 1);
        instance.teardown();
    }

    #[test]
    fn teardown_removes_the_listener() {
        let root = RenderRoot::new();
        let instance = ComponentInstance::mount(&root);
        let resource = Resource::fulfilled(1i32);

        watch_render(&instance, &resource, false);
        assert_eq!(resource.listener_count(), 1);

        instance.teardown();
        assert_eq!(resource.listener_count(), 0);

        // Emitting after teardown re-renders nobody.
        resource.emit(9);
    }
}
