use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use tracing::{debug, trace, warn};

use crate::clock::Clock;

/// Fewest task slots a day can have.
pub const MIN_TASKS: usize = 1;
/// Most task slots a day can have.
pub const MAX_TASKS: usize = 10;

/// Identifier of a task. Unique within a session and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// A single task slot of the day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub text: String,
    pub completed: bool,
    pub time_spent: u64, // in seconds
    pub is_tracking: bool,
    pub start_time: Option<i64>, // epoch milliseconds
}

/// The state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Tracking,
    Completed,
}

impl Task {
    fn blank(id: TaskId) -> Task {
        Task {
            id,
            text: String::new(),
            completed: false,
            time_spent: 0,
            is_tracking: false,
            start_time: None,
        }
    }

    /// Whether the label has anything besides whitespace.
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }

    /// A task holds work when dropping it would lose something the user
    /// typed or tracked.
    pub fn holds_work(&self) -> bool {
        self.has_text() || self.completed || self.is_tracking || self.time_spent > 0
    }

    pub fn state(&self) -> TaskState {
        if self.completed {
            TaskState::Completed
        } else if self.is_tracking {
            TaskState::Tracking
        } else {
            TaskState::Idle
        }
    }

    /// Focus seconds at instant `now` (epoch milliseconds). For a tracking
    /// task this is derived from the anchor and never goes below the last
    /// recorded value, even if the wall clock stepped back.
    pub fn elapsed_at(&self, now: i64) -> u64 {
        match (self.is_tracking, self.start_time) {
            (true, Some(start)) => {
                let derived = (now - start).max(0) / 1000;
                (derived as u64).max(self.time_spent)
            }
            _ => self.time_spent,
        }
    }

    /// Stop accruing time, keeping the elapsed value at `now`.
    fn freeze(&mut self, now: i64) {
        self.time_spent = self.elapsed_at(now);
        self.is_tracking = false;
        self.start_time = None;
    }
}

/// What to do with tail tasks when the desired count shrinks, or when a task
/// holding work is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResizePolicy {
    /// Drop surplus tasks whatever they hold.
    Truncate,
    /// Only drop blank tasks; stop at the first one holding work.
    KeepWork,
}

impl Default for ResizePolicy {
    fn default() -> Self {
        ResizePolicy::Truncate
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown resize policy '{0}', expected 'truncate' or 'keep-work'")]
pub struct UnknownPolicy(String);

impl FromStr for ResizePolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "truncate" => Ok(ResizePolicy::Truncate),
            "keep-work" => Ok(ResizePolicy::KeepWork),
            other => Err(UnknownPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for ResizePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResizePolicy::Truncate => write!(f, "truncate"),
            ResizePolicy::KeepWork => write!(f, "keep-work"),
        }
    }
}

/// Behaviour knobs for a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    pub initial_count: usize,
    pub resize_policy: ResizePolicy,
    /// Refuse to complete a task with no focus time.
    pub require_focus_time: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            initial_count: MIN_TASKS,
            resize_policy: ResizePolicy::Truncate,
            require_focus_time: true,
        }
    }
}

/// A change applied to the store, as told to listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Resized { from: usize, to: usize },
    Started { id: TaskId, stopped: Option<TaskId> },
    Paused(TaskId),
    Completed(TaskId),
    Uncompleted(TaskId),
    TextUpdated(TaskId),
    Added(TaskId),
    Deleted(TaskId),
    Ticked,
}

/// Something that re-renders after the store changes.
pub trait Listener {
    fn notify(&mut self, event: &StoreEvent, tasks: &[Task]);
}

impl<F> Listener for F
where
    F: FnMut(&StoreEvent, &[Task]),
{
    fn notify(&mut self, event: &StoreEvent, tasks: &[Task]) {
        self(event, tasks)
    }
}

/// Aggregates over the tasks that have text. Blank slots never count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub total_focus_time: u64, // in seconds
    pub completed_count: usize,
    pub total_tasks: usize,
}

impl Summary {
    pub fn of(tasks: &[Task]) -> Summary {
        tasks
            .iter()
            .filter(|task| task.has_text())
            .fold(Summary::default(), |mut summary, task| {
                summary.total_tasks += 1;
                if task.completed {
                    summary.completed_count += 1;
                    summary.total_focus_time += task.time_spent;
                }
                summary
            })
    }

    pub fn all_done(&self) -> bool {
        self.total_tasks > 0 && self.completed_count == self.total_tasks
    }
}

fn clamp_count(count: usize) -> usize {
    count.clamp(MIN_TASKS, MAX_TASKS)
}

fn ignored(operation: &str, id: TaskId, reason: &str) -> bool {
    debug!(%id, reason, "{} ignored", operation);
    false
}

/// Owns the day's tasks and every mutation on them.
///
/// Calls whose preconditions do not hold (unknown id, starting a completed
/// task, ...) change nothing, return `false` and notify nobody.
pub struct TaskTimerStore<C> {
    clock: C,
    tasks: Vec<Task>,
    desired_count: usize,
    next_id: u64,
    options: StoreOptions,
    listeners: Vec<Box<dyn Listener>>,
}

impl<C: Clock> TaskTimerStore<C> {
    pub fn new(clock: C, options: StoreOptions) -> Self {
        let count = clamp_count(options.initial_count);
        let mut store = TaskTimerStore {
            clock,
            tasks: Vec::with_capacity(MAX_TASKS),
            desired_count: count,
            next_id: 0,
            options,
            listeners: Vec::new(),
        };
        for _ in 0..count {
            let task = store.new_task();
            store.tasks.push(task);
        }
        store
    }

    /// Register a listener told about every applied mutation and every tick.
    pub fn subscribe<L: Listener + 'static>(&mut self, listener: L) {
        self.listeners.push(Box::new(listener));
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    /// Id of the task shown at 1-based `position`.
    pub fn id_at(&self, position: usize) -> Option<TaskId> {
        position
            .checked_sub(1)
            .and_then(|index| self.tasks.get(index))
            .map(|task| task.id)
    }

    /// 1-based display position of `id`.
    pub fn position_of(&self, id: TaskId) -> Option<usize> {
        self.index_of(id).map(|index| index + 1)
    }

    pub fn tracking(&self) -> Option<&Task> {
        self.tasks.iter().find(|task| task.is_tracking)
    }

    pub fn desired_count(&self) -> usize {
        self.desired_count
    }

    /// Focus seconds to show right now, derived from the clock rather than
    /// from the last tick.
    pub fn displayed_time(&self, id: TaskId) -> Option<u64> {
        let now = self.clock.now_millis();
        self.task(id).map(|task| task.elapsed_at(now))
    }

    pub fn summary(&self) -> Summary {
        Summary::of(&self.tasks)
    }

    pub fn total_focus_time(&self) -> u64 {
        self.summary().total_focus_time
    }

    pub fn completed_count(&self) -> usize {
        self.summary().completed_count
    }

    pub fn total_tasks(&self) -> usize {
        self.summary().total_tasks
    }

    pub fn all_done(&self) -> bool {
        self.summary().all_done()
    }

    /// Set the desired number of slots, clamped to [MIN_TASKS, MAX_TASKS].
    /// Growing appends blank tasks; shrinking trims the tail according to
    /// the resize policy.
    pub fn resize(&mut self, count: usize) -> bool {
        let target = clamp_count(count);
        let from = self.tasks.len();
        let previous_desired = self.desired_count;
        self.desired_count = target;

        if target > from {
            for _ in from..target {
                let task = self.new_task();
                self.tasks.push(task);
            }
        } else if target < from {
            match self.options.resize_policy {
                ResizePolicy::Truncate => {
                    let lost = self.tasks[target..]
                        .iter()
                        .filter(|task| task.holds_work())
                        .count();
                    if lost > 0 {
                        warn!(lost, "resize discarded tasks holding work");
                    }
                    self.tasks.truncate(target);
                }
                ResizePolicy::KeepWork => {
                    while self.tasks.len() > target
                        && self.tasks.last().map_or(false, |task| !task.holds_work())
                    {
                        self.tasks.pop();
                    }
                    if self.tasks.len() > target {
                        debug!(
                            kept = self.tasks.len() - target,
                            "resize stopped at a task holding work"
                        );
                    }
                }
            }
        }

        let to = self.tasks.len();
        if to == from && previous_desired == target {
            return false;
        }
        debug!(from, to, desired = target, "resized");
        self.emit(StoreEvent::Resized { from, to });
        true
    }

    /// Start accruing time on `id`, resuming from its recorded value. Any
    /// other tracking task is stopped in the same step.
    pub fn start_tracking(&mut self, id: TaskId) -> bool {
        let index = match self.index_of(id) {
            Some(index) => index,
            None => return ignored("start", id, "no such task"),
        };
        if self.tasks[index].completed {
            return ignored("start", id, "task is completed");
        }
        if self.tasks[index].is_tracking {
            return ignored("start", id, "already tracking");
        }

        let now = self.clock.now_millis();
        let stopped = self.activate(index, now);
        debug!(%id, ?stopped, "started tracking");
        self.emit(StoreEvent::Started { id, stopped });
        true
    }

    pub fn pause_tracking(&mut self, id: TaskId) -> bool {
        let now = self.clock.now_millis();
        let task = match self.tasks.iter_mut().find(|task| task.id == id) {
            Some(task) if task.is_tracking => task,
            Some(_) => return ignored("pause", id, "not tracking"),
            None => return ignored("pause", id, "no such task"),
        };
        task.freeze(now);
        debug!(%id, time_spent = task.time_spent, "paused tracking");
        self.emit(StoreEvent::Paused(id));
        true
    }

    /// Pause `id` if it is tracking, start it otherwise.
    pub fn toggle_tracking(&mut self, id: TaskId) -> bool {
        match self.task(id) {
            Some(task) if task.is_tracking => self.pause_tracking(id),
            Some(_) => self.start_tracking(id),
            None => ignored("toggle", id, "no such task"),
        }
    }

    pub fn complete_task(&mut self, id: TaskId) -> bool {
        let now = self.clock.now_millis();
        let require_focus_time = self.options.require_focus_time;
        let task = match self.tasks.iter_mut().find(|task| task.id == id) {
            Some(task) => task,
            None => return ignored("complete", id, "no such task"),
        };
        if task.completed {
            return ignored("complete", id, "already completed");
        }
        if require_focus_time && task.elapsed_at(now) == 0 {
            return ignored("complete", id, "no focus time yet");
        }
        task.freeze(now);
        task.completed = true;
        debug!(%id, time_spent = task.time_spent, "completed");
        self.emit(StoreEvent::Completed(id));
        true
    }

    /// Reopen a completed task. Its focus time starts over from zero and
    /// tracking is not restarted.
    pub fn uncomplete_task(&mut self, id: TaskId) -> bool {
        let task = match self.tasks.iter_mut().find(|task| task.id == id) {
            Some(task) if task.completed => task,
            Some(_) => return ignored("uncomplete", id, "not completed"),
            None => return ignored("uncomplete", id, "no such task"),
        };
        task.completed = false;
        task.time_spent = 0;
        debug!(%id, "uncompleted");
        self.emit(StoreEvent::Uncompleted(id));
        true
    }

    /// Replace the label verbatim.
    pub fn update_text<S: Into<String>>(&mut self, id: TaskId, text: S) -> bool {
        let task = match self.tasks.iter_mut().find(|task| task.id == id) {
            Some(task) => task,
            None => return ignored("update text", id, "no such task"),
        };
        task.text = text.into();
        trace!(%id, text = %task.text, "text updated");
        self.emit(StoreEvent::TextUpdated(id));
        true
    }

    /// Append a blank task, unless the day is already full.
    pub fn add_task(&mut self) -> Option<TaskId> {
        if self.tasks.len() >= MAX_TASKS {
            debug!(len = self.tasks.len(), "add ignored: task list is full");
            return None;
        }
        let task = self.new_task();
        let id = task.id;
        self.tasks.push(task);
        self.desired_count = self.tasks.len();
        debug!(%id, "added");
        self.emit(StoreEvent::Added(id));
        Some(id)
    }

    /// Remove `id`. The list never ends up empty: removing the last task
    /// leaves a fresh blank one in its place.
    pub fn delete_task(&mut self, id: TaskId) -> bool {
        let index = match self.index_of(id) {
            Some(index) => index,
            None => return ignored("delete", id, "no such task"),
        };
        if self.options.resize_policy == ResizePolicy::KeepWork
            && self.tasks[index].holds_work()
        {
            return ignored("delete", id, "task holds work");
        }
        let removed = self.tasks.remove(index);
        if removed.holds_work() {
            warn!(%id, "deleted a task holding work");
        }
        if self.tasks.is_empty() {
            let task = self.new_task();
            self.tasks.push(task);
        }
        self.desired_count = self.tasks.len().max(MIN_TASKS);
        debug!(%id, len = self.tasks.len(), "deleted");
        self.emit(StoreEvent::Deleted(id));
        true
    }

    /// Refresh the recorded time of the tracking task from the wall clock.
    pub fn tick(&mut self) {
        let now = self.clock.now_millis();
        for task in self.tasks.iter_mut().filter(|task| task.is_tracking) {
            task.time_spent = task.elapsed_at(now);
            trace!(id = %task.id, time_spent = task.time_spent, "tick");
        }
        self.emit(StoreEvent::Ticked);
    }

    fn new_task(&mut self) -> Task {
        self.next_id += 1;
        Task::blank(TaskId(self.next_id))
    }

    fn index_of(&self, id: TaskId) -> Option<usize> {
        self.tasks.iter().position(|task| task.id == id)
    }

    /// The only place tracking starts. Stops every other tracker, then
    /// anchors the target so its elapsed time resumes where it left off.
    fn activate(&mut self, index: usize, now: i64) -> Option<TaskId> {
        let mut stopped = None;
        for (i, task) in self.tasks.iter_mut().enumerate() {
            if i != index && task.is_tracking {
                task.freeze(now);
                stopped = Some(task.id);
            }
        }
        let task = &mut self.tasks[index];
        task.is_tracking = true;
        task.start_time = Some(now - task.time_spent as i64 * 1000);
        stopped
    }

    fn emit(&mut self, event: StoreEvent) {
        debug_assert!(self.invariants_hold(), "store invariants broken after {:?}", event);
        for listener in self.listeners.iter_mut() {
            listener.notify(&event, &self.tasks);
        }
    }

    fn invariants_hold(&self) -> bool {
        let tracking = self.tasks.iter().filter(|task| task.is_tracking).count();
        let records_ok = self.tasks.iter().all(|task| {
            if task.is_tracking {
                !task.completed && task.start_time.is_some()
            } else {
                task.start_time.is_none()
            }
        });
        tracking <= 1
            && records_ok
            && (MIN_TASKS..=MAX_TASKS).contains(&self.tasks.len())
    }
}
