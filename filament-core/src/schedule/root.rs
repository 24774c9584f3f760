//! Render Root
//!
//! The root owns everything shared by the instances mounted under it: the
//! current lane a render pass is materializing into, the deferred work
//! queue, the host task queue, and the driver callback that actually renders
//! a component when the engine decides one is dirty.
//!
//! # How Scheduling Works
//!
//! Sync-lane re-renders go straight through the driver. Deferred-lane
//! re-renders are queued (deduplicated per instance) and drained by
//! [`RenderRoot::process_deferred_work`], which the host calls when it has
//! idle time — the engine never spins a thread of its own. Two logical
//! timestamps, taken from a process-wide monotonic clock, record when
//! deferred work was last produced and last completed; "is there deferred
//! work outstanding" is just a comparison of the two.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::trace;

use crate::error::{RenderAbort, RenderOutcome};
use crate::hooks::store::{ComponentId, ComponentInstance};
use crate::schedule::lane::{self, Lane};
use crate::schedule::scope::RenderScope;

/// Monotonic logical clock shared by every root in the process.
pub fn tick() -> u64 {
    static CLOCK: AtomicU64 = AtomicU64::new(1);
    CLOCK.fetch_add(1, Ordering::Relaxed)
}

/// Cancel handle for a scheduled task.
pub struct TaskToken {
    canceled: Arc<AtomicBool>,
}

impl Clone for TaskToken {
    fn clone(&self) -> Self {
        Self {
            canceled: Arc::clone(&self.canceled),
        }
    }
}

impl TaskToken {
    fn new() -> Self {
        Self {
            canceled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}

struct Task {
    token: TaskToken,
    run: Box<dyn FnOnce() + Send>,
}

/// Host-supplied callback that renders one component on one lane.
pub type DriverFn = Arc<dyn Fn(ComponentId, Lane) + Send + Sync>;

/// Shared scheduling state for a tree of mounted instances.
pub struct RenderRoot {
    update_type: Mutex<Lane>,
    deferred_update_time: AtomicU64,
    last_deferred_complete_time: AtomicU64,
    deferred_queue: Mutex<Vec<ComponentId>>,
    tasks: Mutex<VecDeque<Task>>,
    driver: RwLock<Option<DriverFn>>,
}

impl RenderRoot {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            update_type: Mutex::new(Lane::Sync),
            deferred_update_time: AtomicU64::new(0),
            last_deferred_complete_time: AtomicU64::new(0),
            deferred_queue: Mutex::new(Vec::new()),
            tasks: Mutex::new(VecDeque::new()),
            driver: RwLock::new(None),
        })
    }

    /// Install the host's render driver. Re-renders requested before a
    /// driver is installed mark the instance dirty and are picked up by the
    /// host's next pass.
    pub fn set_driver(&self, driver: DriverFn) {
        *self.driver.write() = Some(driver);
    }

    /// The lane the current render pass materializes into.
    pub fn update_type(&self) -> Lane {
        *self.update_type.lock()
    }

    pub(crate) fn set_update_type(&self, lane: Lane) {
        *self.update_type.lock() = lane;
    }

    /// Whether deferred work has been produced that has not yet completed.
    pub fn has_deferred_work(&self) -> bool {
        self.last_deferred_complete_time.load(Ordering::SeqCst)
            < self.deferred_update_time.load(Ordering::SeqCst)
    }

    /// Record that a deferred-lane update was produced.
    pub(crate) fn note_deferred_update(&self) {
        self.deferred_update_time.store(tick(), Ordering::SeqCst);
    }

    /// Queue a callback onto the host task queue; returns its cancel token.
    pub fn schedule_task(&self, run: Box<dyn FnOnce() + Send>) -> TaskToken {
        let token = TaskToken::new();
        self.tasks.lock().push_back(Task {
            token: token.clone(),
            run,
        });
        token
    }

    /// Run queued tasks in FIFO order, skipping canceled ones. Tasks queued
    /// while flushing run in the same flush.
    pub fn flush_tasks(&self) {
        loop {
            let task = self.tasks.lock().pop_front();
            let Some(task) = task else { break };
            if !task.token.is_canceled() {
                (task.run)();
            }
        }
    }

    /// Queue an instance for a deferred-lane re-render, at most once.
    pub(crate) fn enqueue_deferred(&self, id: ComponentId) {
        let mut queue = self.deferred_queue.lock();
        if !queue.contains(&id) {
            queue.push(id);
        }
        drop(queue);
        self.note_deferred_update();
    }

    /// Drain the deferred queue through the driver, then mark the deferred
    /// window complete.
    ///
    /// Completion time advances even when the queue was empty, so a window
    /// whose only work was already superseded still closes. When the drain
    /// ran under a transition, the transition gets a chance to clear its
    /// pending flag.
    pub fn process_deferred_work(&self) {
        let queue: Vec<ComponentId> = std::mem::take(&mut *self.deferred_queue.lock());
        trace!(count = queue.len(), "processing deferred work");

        let driver = self.driver.read().clone();
        if let Some(driver) = driver {
            for id in queue {
                driver(id, Lane::Deferred);
            }
        }

        self.last_deferred_complete_time.store(tick(), Ordering::SeqCst);

        if let Some(transition) = lane::current_transition() {
            transition.settle_if_idle();
        }
    }
}

/// Request a re-render of `instance` on the lane implied by the current
/// update source.
///
/// Sync-lane requests go through the driver immediately; deferred-lane
/// requests are queued for the next [`RenderRoot::process_deferred_work`].
pub fn re_render(instance: &Arc<ComponentInstance>) {
    instance.mark_dirty();
    let root = instance.root();

    match lane::update_type() {
        Lane::Sync => {
            let driver = root.driver.read().clone();
            if let Some(driver) = driver {
                driver(instance.id(), Lane::Sync);
            }
        }
        Lane::Deferred => {
            root.enqueue_deferred(instance.id());
        }
    }
}

/// Run one render pass of `instance` on `lane`.
///
/// Prepares the hook store (pointer reset, lane shadow, queued updates),
/// then runs `body` with the instance as the current render scope. A
/// suspension raised under a transition is recorded on that transition so a
/// retry fires when the resource settles.
pub fn render_component<T>(
    instance: &Arc<ComponentInstance>,
    lane: Lane,
    body: impl FnOnce() -> RenderOutcome<T>,
) -> RenderOutcome<T> {
    let root = instance.root();
    root.set_update_type(lane);

    let _scope = RenderScope::enter(Arc::clone(instance));
    instance.prepare_for_render(lane);

    let outcome = body();

    if let RenderOutcome::Suspended(handle) = &outcome {
        if let Some(transition) = lane::current_transition() {
            transition.track_suspense(handle, root);
        }
    }

    outcome
}

/// Run `body` against a throwaway instance on the sync lane, tearing the
/// instance down afterwards. Used for one-shot evaluation of hook-using
/// code outside any mounted tree.
pub fn render_detached<T>(body: impl FnOnce() -> RenderOutcome<T>) -> RenderOutcome<T> {
    let root = RenderRoot::new();
    let instance = ComponentInstance::mount(&root);
    let outcome = render_component(&instance, Lane::Sync, body);
    instance.teardown();
    outcome
}

/// Convenience wrapper for bodies that surface suspension and failure
/// through [`RenderAbort`] rather than building a [`RenderOutcome`] by hand.
pub fn render_body<T>(body: impl FnOnce() -> Result<T, RenderAbort>) -> RenderOutcome<T> {
    match body() {
        Ok(value) => RenderOutcome::Ready(value),
        Err(RenderAbort::Suspended(handle)) => RenderOutcome::Suspended(handle),
        Err(RenderAbort::Failed(err)) => RenderOutcome::Failed(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn clock_is_monotonic() {
        let a = tick();
        let b = tick();
        assert!(b > a);
    }

    #[test]
    fn tasks_run_fifo_and_respect_cancellation() {
        let root = RenderRoot::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let log_a = Arc::clone(&log);
        root.schedule_task(Box::new(move || log_a.lock().push("a")));
        let log_b = Arc::clone(&log);
        let token = root.schedule_task(Box::new(move || log_b.lock().push("b")));
        let log_c = Arc::clone(&log);
        root.schedule_task(Box::new(move || log_c.lock().push("c")));

        token.cancel();
        root.flush_tasks();

        assert_eq!(*log.lock(), vec!["a", "c"]);
    }

    #[test]
    fn deferred_window_opens_and_closes() {
        let root = RenderRoot::new();
        assert!(!root.has_deferred_work());

        root.note_deferred_update();
        assert!(root.has_deferred_work());

        root.process_deferred_work();
        assert!(!root.has_deferred_work());
    }

    #[test]
    fn deferred_queue_deduplicates() {
        let root = RenderRoot::new();
        let calls = Arc::new(AtomicI32::new(0));

        let calls_clone = Arc::clone(&calls);
        root.set_driver(Arc::new(move |_, lane| {
            assert_eq!(lane, Lane::Deferred);
            calls_clone.fetch_add(1, Ordering::SeqCst);
        }));

        let instance = ComponentInstance::mount(&root);
        root.enqueue_deferred(instance.id());
        root.enqueue_deferred(instance.id());
        root.process_deferred_work();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        instance.teardown();
    }

    #[test]
    fn detached_render_evaluates_hooks_once() {
        let outcome = render_detached(|| {
            render_body(|| {
                let (value, _set) = crate::hooks::state::use_state(7i32)?;
                Ok(value)
            })
        });
        assert_eq!(outcome.ready(), Some(7));
    }
}
