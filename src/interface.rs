use std::io::Write;

use anyhow::{anyhow, Context, Result};
use prettytable::{format, Table};
use tracing::warn;

use crate::cli::Command;
use crate::clock::Clock;
use crate::model::{
    Listener, StoreEvent, Summary, Task, TaskId, TaskState, TaskTimerStore, MAX_TASKS,
};

const TEXT_WIDTH: usize = 40;
const CLEAR_LINE: &str = "\r\x1b[2K";

/// What the session should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Total focus time, e.g. "1h 2m 3s" or "2m 3s".
pub fn format_focus_time(seconds: u64) -> String {
    let hours = seconds / 3600;
    let mins = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{}h {}m {}s", hours, mins, secs)
    } else {
        format!("{}m {}s", mins, secs)
    }
}

/// Per-task timer, e.g. "07:05". Minutes are not wrapped into hours.
pub fn format_timer(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

fn state_label(state: TaskState) -> &'static str {
    match state {
        TaskState::Idle => "",
        TaskState::Tracking => "tracking",
        TaskState::Completed => "done",
    }
}

/// "2. Write report", or "2. (no text)" for a blank label.
fn label(tasks: &[Task], id: TaskId) -> String {
    match tasks.iter().position(|task| task.id == id) {
        Some(index) if tasks[index].has_text() => {
            format!("{}. {}", index + 1, tasks[index].text.trim())
        }
        Some(index) => format!("{}. (no text)", index + 1),
        None => id.to_string(),
    }
}

fn progress_line(summary: &Summary) -> String {
    format!(
        "Progress: {} / {}. Total focus time: {}.",
        summary.completed_count,
        summary.total_tasks,
        format_focus_time(summary.total_focus_time)
    )
}

fn task_at<C: Clock>(store: &TaskTimerStore<C>, position: usize) -> Result<TaskId> {
    store
        .id_at(position)
        .ok_or_else(|| anyhow!("No task at position {}.", position))
}

/// Why the store turned a command down, in the user's words.
fn refusal(command: &str, position: usize, task: &Task) -> String {
    match (command, task.state()) {
        ("start", TaskState::Completed) | ("toggle", TaskState::Completed) => format!(
            "Task {} is completed. Use 'redo {}' to work on it again.",
            position, position
        ),
        ("start", TaskState::Tracking) => format!("Task {} is already running.", position),
        ("pause", _) => format!("Task {} is not running.", position),
        ("done", TaskState::Completed) => format!("Task {} is already completed.", position),
        ("done", _) => format!(
            "Task {} has no focus time yet. Use 'start {}' first.",
            position, position
        ),
        ("redo", _) => format!("Task {} is not completed.", position),
        ("rm", _) => format!(
            "Task {} holds work and the resize policy keeps it.",
            position
        ),
        _ => format!("Nothing to do for task {}.", position),
    }
}

/// Run one command against the store. Feedback about applied changes comes
/// from the store's listeners; this only prints queries and refusals.
pub fn execute<C: Clock, W: Write>(
    store: &mut TaskTimerStore<C>,
    command: Command,
    out: &mut W,
) -> Result<Flow> {
    let (name, position, applied) = match command {
        Command::Quit => return Ok(Flow::Quit),
        Command::List => {
            list(store, out)?;
            return Ok(Flow::Continue);
        }
        Command::Summary => {
            summary(store, out)?;
            return Ok(Flow::Continue);
        }
        Command::Count { count } => {
            let before = store.tasks().len();
            store.resize(count);
            if store.tasks().len() > store.desired_count() {
                writeln!(
                    out,
                    "Kept {} task(s) holding work beyond the {} requested.",
                    store.tasks().len() - store.desired_count(),
                    store.desired_count()
                )?;
            } else if before == store.tasks().len() && count != store.desired_count() {
                writeln!(out, "The day has between 1 and {} task slots.", MAX_TASKS)?;
            }
            return Ok(Flow::Continue);
        }
        Command::Add { words } => {
            match store.add_task() {
                Some(id) if !words.is_empty() => {
                    store.update_text(id, words.join(" "));
                }
                Some(_) => {}
                None => writeln!(out, "The day already has {} tasks.", MAX_TASKS)?,
            }
            return Ok(Flow::Continue);
        }
        Command::Text { position, words } => {
            let id = task_at(store, position)?;
            store.update_text(id, words.join(" "));
            return Ok(Flow::Continue);
        }
        Command::Start { position } => {
            let id = task_at(store, position)?;
            ("start", position, store.start_tracking(id))
        }
        Command::Pause { position } => {
            let id = task_at(store, position)?;
            ("pause", position, store.pause_tracking(id))
        }
        Command::Toggle { position } => {
            let id = task_at(store, position)?;
            ("toggle", position, store.toggle_tracking(id))
        }
        Command::Done { position } => {
            let id = task_at(store, position)?;
            ("done", position, store.complete_task(id))
        }
        Command::Redo { position } => {
            let id = task_at(store, position)?;
            ("redo", position, store.uncomplete_task(id))
        }
        Command::Rm { position } => {
            let id = task_at(store, position)?;
            ("rm", position, store.delete_task(id))
        }
    };

    if !applied {
        if let Some(task) = store.id_at(position).and_then(|id| store.task(id)) {
            writeln!(out, "{}", refusal(name, position, task))?;
        }
    }
    Ok(Flow::Continue)
}

/// Print the tasks of the day as a table, followed by the progress.
pub fn list<C: Clock, W: Write>(store: &TaskTimerStore<C>, out: &mut W) -> Result<()> {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
    table.set_titles(row!["#", "task", "state", "time"]);

    for (index, task) in store.tasks().iter().enumerate() {
        let time = store.displayed_time(task.id).unwrap_or(task.time_spent);
        let time = if time > 0 || task.is_tracking {
            format_timer(time)
        } else {
            String::new()
        };
        table.add_row(row![
            r->index + 1,
            textwrap::fill(&task.text, TEXT_WIDTH),
            state_label(task.state()),
            r->time
        ]);
    }

    table.print(out).context("Failed to print the task list.")?;
    summary(store, out)
}

/// Print the day's aggregates and the running timer, if any.
pub fn summary<C: Clock, W: Write>(store: &TaskTimerStore<C>, out: &mut W) -> Result<()> {
    writeln!(out, "{}", progress_line(&store.summary()))?;
    if let Some(task) = store.tracking() {
        let position = store.position_of(task.id).unwrap_or_default();
        let time = store.displayed_time(task.id).unwrap_or(task.time_spent);
        writeln!(out, "Now tracking task {} at {}.", position, format_timer(time))?;
    }
    if store.all_done() {
        writeln!(out, "All tasks completed! Excellent work.")?;
    }
    Ok(())
}

/// Listener that tells the user what just changed. In live mode it also
/// keeps a status line with the running timer.
pub struct Renderer<W: Write> {
    out: W,
    live: bool,
    status_shown: bool,
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W, live: bool) -> Self {
        Renderer {
            out,
            live,
            status_shown: false,
        }
    }

    fn render(&mut self, event: &StoreEvent, tasks: &[Task]) -> Result<()> {
        let message = match event {
            StoreEvent::Ticked => return self.render_status(tasks),
            StoreEvent::Resized { from, to } if from == to => return Ok(()),
            StoreEvent::Resized { to, .. } => format!("The day has {} task slot(s).", to),
            StoreEvent::Started { id, stopped } => {
                let mut message = String::new();
                if let Some(stopped) = stopped {
                    message.push_str(&format!("Paused {}. ", label(tasks, *stopped)));
                }
                message.push_str(&format!("Tracking {}.", label(tasks, *id)));
                message
            }
            StoreEvent::Paused(id) => format!(
                "Paused {} at {}.",
                label(tasks, *id),
                format_timer(time_of(tasks, *id))
            ),
            StoreEvent::Completed(id) => {
                let mut message = format!(
                    "Completed {} in {}.",
                    label(tasks, *id),
                    format_focus_time(time_of(tasks, *id))
                );
                let summary = Summary::of(tasks);
                if summary.all_done() {
                    message.push_str(&format!(
                        "\nAll tasks completed! Total focus time: {}.",
                        format_focus_time(summary.total_focus_time)
                    ));
                }
                message
            }
            StoreEvent::Uncompleted(id) => format!("Reopened {}.", label(tasks, *id)),
            StoreEvent::TextUpdated(id) => format!("Updated {}.", label(tasks, *id)),
            StoreEvent::Added(id) => format!("Added {}.", label(tasks, *id)),
            StoreEvent::Deleted(_) => format!("Removed a task, {} left.", tasks.len()),
        };
        self.clear_status()?;
        writeln!(self.out, "{}", message)?;
        self.out.flush()?;
        Ok(())
    }

    fn render_status(&mut self, tasks: &[Task]) -> Result<()> {
        if !self.live {
            return Ok(());
        }
        match tasks.iter().find(|task| task.is_tracking) {
            Some(task) => {
                write!(
                    self.out,
                    "{}{} {}",
                    CLEAR_LINE,
                    label(tasks, task.id),
                    format_timer(task.time_spent)
                )?;
                self.status_shown = true;
            }
            None => self.clear_status()?,
        }
        self.out.flush()?;
        Ok(())
    }

    fn clear_status(&mut self) -> Result<()> {
        if self.status_shown {
            write!(self.out, "{}", CLEAR_LINE)?;
            self.status_shown = false;
        }
        Ok(())
    }
}

fn time_of(tasks: &[Task], id: TaskId) -> u64 {
    tasks
        .iter()
        .find(|task| task.id == id)
        .map_or(0, |task| task.time_spent)
}

impl<W: Write> Listener for Renderer<W> {
    fn notify(&mut self, event: &StoreEvent, tasks: &[Task]) {
        if let Err(err) = self.render(event, tasks) {
            warn!("Failed to render {:?}: {:#}", event, err);
        }
    }
}
