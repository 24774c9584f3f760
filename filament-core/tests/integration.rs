//! End-to-end tests driving the engine the way a host would: a driver that
//! renders component bodies, runs their effects, and commits, with the test
//! standing in for the event loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use filament_core::error::RenderAbort;
use filament_core::hooks::effect::run_effects;
use filament_core::schedule::lane;
use filament_core::schedule::root::{render_body, render_component};
use filament_core::{
    create_context, use_context, use_deferred_value, use_effect, use_memo, use_state,
    use_transition, ComponentId, ComponentInstance, ContextProvider, DepToken, Lane, RenderRoot,
    Resource, TransitionHandle,
};

type Body = Arc<dyn Fn() -> Result<(), RenderAbort> + Send + Sync>;

/// Minimal host: maps instances to bodies and installs a driver that
/// renders, runs effects, and commits. Render attempts are logged as
/// `(component, lane, completed)`.
struct Host {
    root: Arc<RenderRoot>,
    bodies: Arc<Mutex<HashMap<ComponentId, Body>>>,
    log: Arc<Mutex<Vec<(ComponentId, Lane, bool)>>>,
}

impl Host {
    fn new() -> Self {
        let bodies: Arc<Mutex<HashMap<ComponentId, Body>>> = Arc::new(Mutex::new(HashMap::new()));
        let log: Arc<Mutex<Vec<(ComponentId, Lane, bool)>>> = Arc::new(Mutex::new(Vec::new()));
        let root = RenderRoot::new();

        let driver_bodies = Arc::clone(&bodies);
        let driver_log = Arc::clone(&log);
        root.set_driver(Arc::new(move |id, lane| {
            let Some(instance) = filament_core::hooks::lookup(id) else {
                return;
            };
            let Some(body) = driver_bodies.lock().get(&id).cloned() else {
                return;
            };

            let outcome = render_component(&instance, lane, || render_body(|| body()));
            let completed = outcome.is_ready();
            if completed {
                run_effects(&instance);
                instance.commit(lane);
            }
            driver_log.lock().push((id, lane, completed));
        }));

        Host { root, bodies, log }
    }

    fn mount(&self, body: impl Fn() -> Result<(), RenderAbort> + Send + Sync + 'static) -> Arc<ComponentInstance> {
        let instance = ComponentInstance::mount(&self.root);
        self.bodies.lock().insert(instance.id(), Arc::new(body));
        self.render_sync(&instance);
        instance
    }

    fn render_sync(&self, instance: &Arc<ComponentInstance>) {
        let body = self.bodies.lock().get(&instance.id()).cloned().expect("body");
        let outcome = render_component(instance, Lane::Sync, || render_body(|| body()));
        if outcome.is_ready() {
            run_effects(instance);
            instance.commit(Lane::Sync);
        }
        self.log.lock().push((instance.id(), Lane::Sync, outcome.is_ready()));
    }

    fn renders_of(&self, instance: &Arc<ComponentInstance>) -> Vec<(Lane, bool)> {
        self.log
            .lock()
            .iter()
            .filter(|(id, _, _)| *id == instance.id())
            .map(|(_, lane, ok)| (*lane, *ok))
            .collect()
    }
}

#[test]
fn hook_slots_stay_positionally_stable_across_renders() {
    let host = Host::new();
    let values = Arc::new(Mutex::new(Vec::new()));
    let setters = Arc::new(Mutex::new(None));

    let body_values = Arc::clone(&values);
    let body_setters = Arc::clone(&setters);
    let instance = host.mount(move || {
        let (a, set_a) = use_state(1i32)?;
        let (b, _set_b) = use_state("x".to_string())?;
        let doubled = use_memo(Some(smallvec::smallvec![DepToken::of_hash(&a)]), || a * 2)?;

        body_values.lock().push((a, b, doubled));
        *body_setters.lock() = Some(set_a);
        Ok(())
    });

    let set_a = setters.lock().clone().expect("setter captured");
    set_a.set(5);

    assert_eq!(
        *values.lock(),
        vec![(1, "x".to_string(), 2), (5, "x".to_string(), 10)]
    );
    instance.teardown();
}

#[test]
fn setting_the_committed_value_again_skips_the_render() {
    let host = Host::new();
    let renders = Arc::new(AtomicI32::new(0));
    let setters = Arc::new(Mutex::new(None));

    let body_renders = Arc::clone(&renders);
    let body_setters = Arc::clone(&setters);
    let instance = host.mount(move || {
        body_renders.fetch_add(1, Ordering::SeqCst);
        let (_, set) = use_state(1i32)?;
        *body_setters.lock() = Some(set);
        Ok(())
    });
    assert_eq!(renders.load(Ordering::SeqCst), 1);

    let set = setters.lock().clone().expect("setter captured");
    set.set(1);
    assert_eq!(renders.load(Ordering::SeqCst), 1);

    // An event-sourced set of the same value still renders.
    lane::sync_updates(|| set.set(1));
    assert_eq!(renders.load(Ordering::SeqCst), 2);

    instance.teardown();
}

#[test]
fn transition_with_no_updates_never_turns_pending() {
    let host = Host::new();
    let handle: Arc<Mutex<Option<TransitionHandle>>> = Arc::new(Mutex::new(None));

    let body_handle = Arc::clone(&handle);
    let instance = host.mount(move || {
        let (_pending, transition) = use_transition()?;
        *body_handle.lock() = Some(transition);
        Ok(())
    });

    let transition = handle.lock().clone().expect("transition captured");
    transition.start(|| None);

    assert!(!transition.is_pending());
    instance.teardown();
}

#[test]
fn transition_updates_keep_the_committed_view_until_the_deferred_pass() {
    let host = Host::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::new(Mutex::new(None));

    let body_seen = Arc::clone(&seen);
    let body_captured = Arc::clone(&captured);
    let instance = host.mount(move || {
        let (value, set) = use_state(1i32)?;
        let (pending, transition) = use_transition()?;
        body_seen.lock().push((value, pending));
        *body_captured.lock() = Some((set, transition));
        Ok(())
    });

    let (set, transition) = captured.lock().clone().expect("hooks captured");
    transition.start(|| {
        set.set(100);
        None
    });

    // The pending re-render still shows the committed value.
    assert!(transition.is_pending());
    assert_eq!(seen.lock().last().cloned(), Some((1, true)));

    lane::with_transition(Arc::clone(transition.slot()), || {
        host.root.process_deferred_work();
    });

    assert!(!transition.is_pending());
    assert_eq!(seen.lock().last().cloned(), Some((100, false)));
    instance.teardown();
}

#[test]
fn overlapping_async_actions_hold_pending_until_all_settle() {
    use filament_core::AsyncAction;

    let host = Host::new();
    let captured = Arc::new(Mutex::new(None));

    let body_captured = Arc::clone(&captured);
    let instance = host.mount(move || {
        let (_pending, transition) = use_transition()?;
        *body_captured.lock() = Some(transition);
        Ok(())
    });

    let transition = captured.lock().clone().expect("transition captured");
    let first = AsyncAction::new();
    let second = AsyncAction::new();

    let action = first.clone();
    transition.start(move || Some(action));
    assert!(transition.is_pending());
    assert_eq!(transition.slot().async_action_count(), 1);

    // Restarting while the first action is in flight does not reset the
    // counter.
    let action = second.clone();
    transition.start(move || Some(action));
    assert_eq!(transition.slot().async_action_count(), 2);

    first.resolve();
    assert!(transition.is_pending());

    second.resolve();
    assert!(!transition.is_pending());
    assert_eq!(transition.slot().async_action_count(), 0);

    instance.teardown();
}

#[test]
fn deferred_value_shows_the_old_value_then_the_new_one() {
    let host = Host::new();
    let input = Arc::new(Mutex::new("a".to_string()));
    let shown = Arc::new(Mutex::new(Vec::new()));

    let body_input = Arc::clone(&input);
    let body_shown = Arc::clone(&shown);
    let instance = host.mount(move || {
        let current = body_input.lock().clone();
        let value = use_deferred_value(current, None)?;
        body_shown.lock().push(value);
        Ok(())
    });
    host.root.flush_tasks();
    assert_eq!(*shown.lock(), vec!["a"]);

    // New input: the sync render keeps showing the old value.
    *input.lock() = "b".to_string();
    host.render_sync(&instance);
    assert_eq!(shown.lock().last().map(String::as_str), Some("a"));

    // The effect starts a transition to the new value; the deferred pass
    // catches up.
    host.root.flush_tasks();
    host.root.process_deferred_work();
    assert_eq!(shown.lock().last().map(String::as_str), Some("b"));

    instance.teardown();
}

#[test]
fn suspended_transition_retries_when_the_resource_settles() {
    let host = Host::new();
    let resources: Arc<Vec<Resource<String>>> = Arc::new(vec![
        Resource::fulfilled("one".to_string()),
        Resource::<String>::pending(),
    ]);
    let shown = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::new(Mutex::new(None));

    let body_resources = Arc::clone(&resources);
    let body_shown = Arc::clone(&shown);
    let body_captured = Arc::clone(&captured);
    let instance = host.mount(move || {
        let (which, set_which) = use_state(0usize)?;
        let (_pending, transition) = use_transition()?;
        *body_captured.lock() = Some((set_which, transition));

        let value = body_resources[which].read()?;
        body_shown.lock().push(value);
        Ok(())
    });
    assert_eq!(*shown.lock(), vec!["one"]);

    let (set_which, transition) = captured.lock().clone().expect("hooks captured");
    transition.start(|| {
        set_which.set(1);
        None
    });
    assert!(transition.is_pending());

    // The deferred pass suspends on the pending resource; nothing commits.
    lane::with_transition(Arc::clone(transition.slot()), || {
        host.root.process_deferred_work();
    });
    assert_eq!(shown.lock().last().map(String::as_str), Some("one"));
    assert!(transition.is_pending());
    assert_eq!(transition.slot().pending_suspense_count(), 1);

    // Settlement schedules a retry; the retry commits the new value and the
    // pending flag clears.
    resources[1].resolve("two".to_string());
    assert_eq!(transition.slot().try_count(), 1);
    host.root.flush_tasks();

    assert_eq!(shown.lock().last().map(String::as_str), Some("two"));
    assert!(!transition.is_pending());

    let renders = host.renders_of(&instance);
    assert!(renders.contains(&(Lane::Deferred, false)));
    assert!(renders.contains(&(Lane::Deferred, true)));

    instance.teardown();
}

#[test]
fn watched_resources_re_render_watchers_per_emission() {
    let host = Host::new();
    let resource = Resource::fulfilled(1i32);
    let shown = Arc::new(Mutex::new(Vec::new()));

    let body_resource = resource.clone();
    let body_shown = Arc::clone(&shown);
    let instance = host.mount(move || {
        let value = filament_core::watch(&body_resource)?;
        body_shown.lock().push(value);
        Ok(())
    });
    assert_eq!(*shown.lock(), vec![1]);
    assert_eq!(resource.listener_count(), 1);

    resource.emit(2);
    host.root.process_deferred_work();
    assert_eq!(shown.lock().last(), Some(&2));

    // Re-renders did not stack subscriptions.
    resource.emit(3);
    host.root.process_deferred_work();
    assert_eq!(resource.listener_count(), 1);
    assert_eq!(shown.lock().last(), Some(&3));

    instance.teardown();
    assert_eq!(resource.listener_count(), 0);
}

#[test]
fn context_changes_re_render_only_subscribed_consumers() {
    let host = Host::new();
    let theme = create_context("light".to_string());
    let provider = ContextProvider::new(&theme, "light".to_string());

    let consumer_renders = Arc::new(AtomicI32::new(0));
    let bystander_renders = Arc::new(AtomicI32::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let consumer_instance = ComponentInstance::mount(&host.root);
    provider.install(&consumer_instance);

    let body_theme = theme.clone();
    let body_renders = Arc::clone(&consumer_renders);
    let body_seen = Arc::clone(&seen);
    host.bodies.lock().insert(
        consumer_instance.id(),
        Arc::new(move || {
            body_renders.fetch_add(1, Ordering::SeqCst);
            let value = use_context(&body_theme)?;
            body_seen.lock().push((*value).clone());
            Ok(())
        }),
    );
    host.render_sync(&consumer_instance);

    let body_renders = Arc::clone(&bystander_renders);
    let bystander = host.mount(move || {
        body_renders.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    provider.set_value("dark".to_string());
    assert_eq!(seen.lock().last().map(String::as_str), Some("dark"));
    assert_eq!(consumer_renders.load(Ordering::SeqCst), 2);
    assert_eq!(bystander_renders.load(Ordering::SeqCst), 1);

    consumer_instance.teardown();
    assert_eq!(provider.state().subscriber_count(), 0);
    bystander.teardown();
}

#[test]
fn effects_run_after_commit_and_clean_up_on_unmount() {
    let host = Host::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    let body_order = Arc::clone(&order);
    let instance = host.mount(move || {
        let order = Arc::clone(&body_order);
        order.lock().push("render");
        use_effect(Some(smallvec::smallvec![]), move || {
            order.lock().push("effect");
            let order = Arc::clone(&order);
            Some(Box::new(move || order.lock().push("cleanup")) as _)
        })?;
        Ok(())
    });

    assert_eq!(*order.lock(), vec!["render"]);
    host.root.flush_tasks();
    assert_eq!(*order.lock(), vec!["render", "effect"]);

    instance.teardown();
    assert_eq!(*order.lock(), vec!["render", "effect", "cleanup"]);
}
