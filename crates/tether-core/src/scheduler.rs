#![forbid(unsafe_code)]

//! Delivery contexts: where guarded emissions are allowed to run.
//!
//! Bindings never lock around state that is shared with their observers.
//! Instead every guarded emission is forced onto one designated context, so all
//! mutations for a binding happen in sequence on that context.
//!
//! - [`Trampoline`] runs work synchronously on the calling thread. Nested
//!   schedules are queued and drained in order instead of recursing. This is
//!   the context tests use.
//! - [`DeliveryQueue`] is the single UI-affine context. Any thread may schedule
//!   onto it; the host's loop runs the work with
//!   [`run_pending`](DeliveryQueue::run_pending).
//!
//! # Process default
//!
//! [`DeliveryContext::current`] returns the installed default. Hosts call
//! [`DeliveryContext::install_default`] once at startup; until then the default
//! is the lazily created [`main_queue`].

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use arc_swap::ArcSwapOption;

/// Unit of work handed to a scheduler.
pub type Task = Box<dyn FnOnce() + Send>;

/// Executes tasks on some execution context.
pub trait Scheduler: Send + Sync {
    /// Queue or run `task`. Tasks scheduled from one thread run in the order
    /// they were scheduled.
    fn schedule(&self, task: Task);
}

// ---------------------------------------------------------------------------
// Trampoline
// ---------------------------------------------------------------------------

thread_local! {
    static TRAMPOLINE_QUEUE: RefCell<VecDeque<Task>> = const { RefCell::new(VecDeque::new()) };
    static TRAMPOLINE_ACTIVE: Cell<bool> = const { Cell::new(false) };
}

/// Synchronous, per-thread trampoline.
///
/// The outermost `schedule` call runs its task inline and then drains anything
/// the task scheduled. Inner calls only enqueue.
#[derive(Debug, Default, Clone, Copy)]
pub struct Trampoline;

impl Scheduler for Trampoline {
    fn schedule(&self, task: Task) {
        if TRAMPOLINE_ACTIVE.with(Cell::get) {
            TRAMPOLINE_QUEUE.with(|q| q.borrow_mut().push_back(task));
            return;
        }

        TRAMPOLINE_ACTIVE.with(|a| a.set(true));
        let _reset = ActiveReset;
        task();
        while let Some(next) = TRAMPOLINE_QUEUE.with(|q| q.borrow_mut().pop_front()) {
            next();
        }
    }
}

/// Clears the trampoline flag even if a task panics.
struct ActiveReset;

impl Drop for ActiveReset {
    fn drop(&mut self) {
        TRAMPOLINE_ACTIVE.with(|a| a.set(false));
        TRAMPOLINE_QUEUE.with(|q| q.borrow_mut().clear());
    }
}

// ---------------------------------------------------------------------------
// DeliveryQueue
// ---------------------------------------------------------------------------

/// Queue-backed context drained by its owner.
///
/// Cloning shares the queue.
#[derive(Clone, Default)]
pub struct DeliveryQueue {
    tasks: Arc<Mutex<VecDeque<Task>>>,
}

impl DeliveryQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run queued tasks until the queue is empty, including tasks scheduled
    /// while draining. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            // Pop under the lock, run outside it.
            let task = self
                .tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            match task {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => break,
            }
        }
        if ran > 0 {
            tracing::trace!(ran, "delivery queue drained");
        }
        ran
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no tasks are queued.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }
}

impl Scheduler for DeliveryQueue {
    fn schedule(&self, task: Task) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(task);
    }
}

impl fmt::Debug for DeliveryQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryQueue")
            .field("pending", &self.pending())
            .finish()
    }
}

/// The process-wide UI-affine queue used when no default has been installed.
pub fn main_queue() -> &'static DeliveryQueue {
    static MAIN: OnceLock<DeliveryQueue> = OnceLock::new();
    MAIN.get_or_init(DeliveryQueue::new)
}

// ---------------------------------------------------------------------------
// DeliveryContext
// ---------------------------------------------------------------------------

static DEFAULT_CONTEXT: ArcSwapOption<DeliveryContext> = ArcSwapOption::const_empty();

/// Cloneable handle naming the context guarded emissions are delivered on.
#[derive(Clone)]
pub struct DeliveryContext {
    scheduler: Arc<dyn Scheduler>,
    label: &'static str,
}

impl DeliveryContext {
    /// Synchronous trampoline on the emitting thread.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            scheduler: Arc::new(Trampoline),
            label: "immediate",
        }
    }

    /// Deliver through `queue`.
    #[must_use]
    pub fn queue(queue: &DeliveryQueue) -> Self {
        Self {
            scheduler: Arc::new(queue.clone()),
            label: "queue",
        }
    }

    /// Deliver through an arbitrary scheduler.
    #[must_use]
    pub fn from_scheduler(scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            scheduler,
            label: "custom",
        }
    }

    /// The installed process default, or [`main_queue`] if none was installed.
    #[must_use]
    pub fn current() -> Self {
        match DEFAULT_CONTEXT.load_full() {
            Some(ctx) => (*ctx).clone(),
            None => Self {
                scheduler: Arc::new(main_queue().clone()),
                label: "main",
            },
        }
    }

    /// Install the process default, returning the previous one.
    pub fn install_default(ctx: DeliveryContext) -> Option<DeliveryContext> {
        let previous = DEFAULT_CONTEXT.swap(Some(Arc::new(ctx)));
        previous.map(|p| (*p).clone())
    }

    /// Remove the installed default so [`current`](Self::current) falls back
    /// to [`main_queue`].
    pub fn reset_default() {
        DEFAULT_CONTEXT.store(None);
    }

    /// Schedule `task` on this context.
    pub fn schedule(&self, task: impl FnOnce() + Send + 'static) {
        self.scheduler.schedule(Box::new(task));
    }

    /// Short name for logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        self.label
    }
}

impl Default for DeliveryContext {
    fn default() -> Self {
        Self::current()
    }
}

impl fmt::Debug for DeliveryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryContext")
            .field("label", &self.label)
            .finish()
    }
}
