use std::cell::RefCell;

use tracing::trace;

use crate::job::{Job, JobId, OnceKey, Queue};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TickSummary {
    pub tick: u64,
    pub ran_jobs: usize,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    next_key: u64,
    ticks: u64,
    jobs: Vec<Job>,
}

impl State {
    fn pop_front(&mut self, queue: Queue) -> Option<Job> {
        let idx = self.jobs.iter().position(|j| j.queue == queue)?;
        Some(self.jobs.remove(idx))
    }
}

/// Single-threaded cooperative run loop.
///
/// All binding logic executes on one logical thread; deferral is expressed by
/// scheduling closures onto a [`Queue`] instead of blocking. The scheduler is
/// shared behind an `Rc` and uses interior mutability so that running jobs may
/// schedule or cancel further jobs.
///
/// Ordering contract:
/// - Within a queue, jobs run in insertion order.
/// - [`Scheduler::end_pass`] drains `Actions` before `AfterRender`; a job that
///   schedules into `Actions` during the drain runs before any remaining
///   `AfterRender` job.
/// - [`Scheduler::tick`] settles the current pass, then runs the `NextTick` jobs
///   that were pending when the tick began, then settles again.
#[derive(Debug, Default)]
pub struct Scheduler {
    state: RefCell<State>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh dedupe key for [`Scheduler::schedule_once`].
    pub fn once_key(&self) -> OnceKey {
        let mut state = self.state.borrow_mut();
        let key = OnceKey(state.next_key);
        state.next_key = state.next_key.wrapping_add(1);
        key
    }

    pub fn schedule(
        &self,
        queue: Queue,
        label: &'static str,
        run: impl FnOnce() + 'static,
    ) -> JobId {
        self.push(queue, label, None, Box::new(run))
    }

    /// Schedules `run` unless a job with the same `key` is already pending on
    /// `queue`, in which case that job's closure is replaced and its id kept.
    pub fn schedule_once(
        &self,
        queue: Queue,
        key: OnceKey,
        label: &'static str,
        run: impl FnOnce() + 'static,
    ) -> JobId {
        let mut state = self.state.borrow_mut();
        if let Some(job) = state
            .jobs
            .iter_mut()
            .find(|j| j.queue == queue && j.once == Some(key))
        {
            job.run = Box::new(run);
            return job.id;
        }
        drop(state);
        self.push(queue, label, Some(key), Box::new(run))
    }

    fn push(
        &self,
        queue: Queue,
        label: &'static str,
        once: Option<OnceKey>,
        run: Box<dyn FnOnce()>,
    ) -> JobId {
        let mut state = self.state.borrow_mut();
        let id = JobId(state.next_id);
        state.next_id = state.next_id.wrapping_add(1);
        state.jobs.push(Job::new(id, queue, label, once, run));
        trace!(?queue, label, id = id.0, "scheduled job");
        id
    }

    /// Cancels a pending job. Returns `false` if it already ran or was cancelled.
    pub fn cancel(&self, id: JobId) -> bool {
        let mut state = self.state.borrow_mut();
        if let Some(idx) = state.jobs.iter().position(|j| j.id == id) {
            let job = state.jobs.remove(idx);
            trace!(label = job.label, id = id.0, "cancelled job");
            return true;
        }
        false
    }

    pub fn is_pending(&self, id: JobId) -> bool {
        self.state.borrow().jobs.iter().any(|j| j.id == id)
    }

    pub fn pending(&self, queue: Queue) -> usize {
        self.state
            .borrow()
            .jobs
            .iter()
            .filter(|j| j.queue == queue)
            .count()
    }

    pub fn is_idle(&self) -> bool {
        self.state.borrow().jobs.is_empty()
    }

    /// Number of completed ticks.
    pub fn ticks(&self) -> u64 {
        self.state.borrow().ticks
    }

    /// Drains the current pass: `Actions`, then `AfterRender`.
    ///
    /// Returns the number of jobs that ran.
    pub fn end_pass(&self) -> usize {
        let mut ran = 0usize;
        loop {
            let next = {
                let mut state = self.state.borrow_mut();
                state
                    .pop_front(Queue::Actions)
                    .or_else(|| state.pop_front(Queue::AfterRender))
            };
            let Some(job) = next else {
                break;
            };
            self.run_job(job);
            ran += 1;
        }
        ran
    }

    /// Advances the run loop by one tick.
    pub fn tick(&self) -> TickSummary {
        let mut ran = self.end_pass();

        let due: Vec<JobId> = self
            .state
            .borrow()
            .jobs
            .iter()
            .filter(|j| j.queue == Queue::NextTick)
            .map(|j| j.id)
            .collect();

        for id in due {
            let job = {
                let mut state = self.state.borrow_mut();
                match state.jobs.iter().position(|j| j.id == id) {
                    Some(idx) => state.jobs.remove(idx),
                    // Cancelled by an earlier job in this tick.
                    None => continue,
                }
            };
            self.run_job(job);
            ran += 1;
        }

        ran += self.end_pass();

        let mut state = self.state.borrow_mut();
        state.ticks += 1;
        TickSummary {
            tick: state.ticks,
            ran_jobs: ran,
        }
    }

    /// Ticks until no job is pending, up to `max_ticks`.
    ///
    /// Returns the number of ticks run.
    pub fn run_until_idle(&self, max_ticks: usize) -> usize {
        let mut ticks = 0usize;
        while !self.is_idle() && ticks < max_ticks {
            self.tick();
            ticks += 1;
        }
        ticks
    }

    fn run_job(&self, job: Job) {
        trace!(queue = ?job.queue, label = job.label, id = job.id.0, "running job");
        (job.run)();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::Scheduler;
    use crate::job::Queue;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Box<dyn FnOnce()>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let log2 = Rc::clone(&log);
        let push = move |m: &'static str| -> Box<dyn FnOnce()> {
            let log = Rc::clone(&log2);
            Box::new(move || log.borrow_mut().push(m))
        };
        (log, push)
    }

    #[test]
    fn actions_run_before_after_render() {
        let sched = Scheduler::new();
        let (log, push) = recorder();
        sched.schedule(Queue::AfterRender, "b", push("render"));
        sched.schedule(Queue::Actions, "a", push("actions"));

        assert_eq!(sched.end_pass(), 2);
        assert_eq!(*log.borrow(), vec!["actions", "render"]);
    }

    #[test]
    fn next_tick_waits_for_tick() {
        let sched = Scheduler::new();
        let (log, push) = recorder();
        sched.schedule(Queue::NextTick, "t", push("tick"));
        sched.schedule(Queue::AfterRender, "r", push("render"));

        sched.end_pass();
        assert_eq!(*log.borrow(), vec!["render"]);
        assert_eq!(sched.pending(Queue::NextTick), 1);

        let summary = sched.tick();
        assert_eq!(summary.tick, 1);
        assert_eq!(*log.borrow(), vec!["render", "tick"]);
        assert!(sched.is_idle());
    }

    #[test]
    fn jobs_scheduled_during_a_tick_wait_for_the_next_one() {
        let sched = Rc::new(Scheduler::new());
        let log = Rc::new(RefCell::new(Vec::new()));

        let inner_sched = Rc::clone(&sched);
        let inner_log = Rc::clone(&log);
        sched.schedule(Queue::NextTick, "outer", move || {
            inner_log.borrow_mut().push("outer");
            let l = Rc::clone(&inner_log);
            inner_sched.schedule(Queue::NextTick, "inner", move || l.borrow_mut().push("inner"));
        });

        sched.tick();
        assert_eq!(*log.borrow(), vec!["outer"]);
        sched.tick();
        assert_eq!(*log.borrow(), vec!["outer", "inner"]);
    }

    #[test]
    fn schedule_once_replaces_pending_job() {
        let sched = Scheduler::new();
        let (log, push) = recorder();
        let key = sched.once_key();

        let a = sched.schedule_once(Queue::Actions, key, "commit", push("first"));
        let b = sched.schedule_once(Queue::Actions, key, "commit", push("second"));
        assert_eq!(a, b);
        assert_eq!(sched.pending(Queue::Actions), 1);

        sched.end_pass();
        assert_eq!(*log.borrow(), vec!["second"]);
    }

    #[test]
    fn cancel_skips_job() {
        let sched = Scheduler::new();
        let (log, push) = recorder();
        let a = sched.schedule(Queue::AfterRender, "a", push("a"));
        sched.schedule(Queue::AfterRender, "b", push("b"));

        assert!(sched.cancel(a));
        assert!(!sched.cancel(a));
        sched.end_pass();
        assert_eq!(*log.borrow(), vec!["b"]);
    }

    #[test]
    fn run_until_idle_is_bounded() {
        let sched = Scheduler::new();
        let (_log, push) = recorder();
        sched.schedule(Queue::NextTick, "a", push("a"));
        assert_eq!(sched.run_until_idle(10), 1);
        assert_eq!(sched.run_until_idle(10), 0);
    }
}
