use std::fmt;

/// Identifies a scheduled [`Job`] so it can be cancelled before it runs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub u64);

/// Dedupe key for [`crate::Scheduler::schedule_once`].
///
/// Allocated per owner with [`crate::Scheduler::once_key`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct OnceKey(pub u64);

/// Deferred-execution queues of the cooperative run loop.
///
/// `Actions` and `AfterRender` drain at the end of the current pass, in that
/// order. `NextTick` runs on the following tick, after the current pass has
/// fully settled.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Queue {
    Actions,
    AfterRender,
    NextTick,
}

/// A deferred unit of work executed by the [`crate::Scheduler`].
///
/// Jobs in the same queue run in insertion order.
pub struct Job {
    pub id: JobId,
    pub queue: Queue,
    pub label: &'static str,
    pub(crate) once: Option<OnceKey>,
    pub(crate) run: Box<dyn FnOnce()>,
}

impl Job {
    pub(crate) fn new(
        id: JobId,
        queue: Queue,
        label: &'static str,
        once: Option<OnceKey>,
        run: Box<dyn FnOnce()>,
    ) -> Self {
        Self {
            id,
            queue,
            label,
            once,
            run,
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("queue", &self.queue)
            .field("label", &self.label)
            .field("once", &self.once)
            .finish_non_exhaustive()
    }
}
