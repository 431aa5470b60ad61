//! Run timing model and Gantt chart rows.
//!
//! A `TaskRun` carries up to three timestamps (scheduled, execution start,
//! completion); any suffix may still be unknown while the run is queued or
//! executing. Duration and percent math treats a missing timestamp as "not
//! yet known", never as zero.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::warehouse::RunRow;

/// Lifecycle state of one task execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Succeeded,
    Running,
    Failed,
    Other(String),
}

impl RunState {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "SUCCEEDED" => RunState::Succeeded,
            "EXECUTING" | "RUNNING" => RunState::Running,
            "FAILED" => RunState::Failed,
            _ => RunState::Other(s.to_string()),
        }
    }

    pub fn is_succeeded(&self) -> bool {
        *self == RunState::Succeeded
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Succeeded => write!(f, "succeeded"),
            RunState::Running => write!(f, "running"),
            RunState::Failed => write!(f, "failed"),
            RunState::Other(s) => write!(f, "{}", s),
        }
    }
}

/// One execution instance of a task within an orchestration cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRun {
    pub run_id: String,
    pub task_name: String,
    pub state: RunState,
    pub scheduled: Option<DateTime<Utc>>,
    pub started: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
}

impl From<RunRow> for TaskRun {
    fn from(row: RunRow) -> Self {
        TaskRun {
            run_id: row.run_id,
            task_name: row.task_name,
            state: RunState::parse(&row.state),
            scheduled: row.scheduled,
            started: row.started,
            completed: row.completed,
        }
    }
}

impl TaskRun {
    /// Queue wait in milliseconds (scheduled to execution start), 0 while
    /// either end is unknown.
    pub fn queue_millis(&self) -> i64 {
        match (self.scheduled, self.started) {
            (Some(s), Some(t)) => (t - s).num_milliseconds(),
            _ => 0,
        }
    }

    /// Execution time in milliseconds (start to completion), 0 while either
    /// end is unknown.
    pub fn exec_millis(&self) -> i64 {
        match (self.started, self.completed) {
            (Some(t), Some(c)) => (c - t).num_milliseconds(),
            _ => 0,
        }
    }

    /// Integer share of total elapsed time spent queued. Only computed when
    /// the total is positive; everything else is 0.
    pub fn queue_percent(&self) -> i64 {
        let queue = self.queue_millis();
        let total = queue + self.exec_millis();
        if total > 0 {
            queue * 100 / total
        } else {
            0
        }
    }
}

/// One row of the browser-side Gantt chart.
///
/// Timestamps are epoch milliseconds; the page script turns them into
/// `Date` objects. `None` start/end with a zero duration is the placeholder
/// for a run that has not produced any timestamps yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartRow {
    pub id: String,
    pub name: String,
    pub resource: String,
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub duration: Option<i64>,
    pub percent: i64,
    pub dependencies: Option<String>,
}

fn millis(ts: Option<DateTime<Utc>>) -> Option<i64> {
    ts.map(|t| t.timestamp_millis())
}

/// Build the chart row for one run.
///
/// Simple mode uses only start/completion: runs with no start are skipped
/// (`None`), started-but-uncompleted runs render as in-progress (zero span,
/// 100 marker), completed runs span fully with a 0 marker.
///
/// Detailed mode uses all three timestamps: a run with none of them known
/// renders as a zero-duration placeholder; an uncompleted run spans whatever
/// prefix is known with the 100 in-progress marker; a fully timed run spans
/// scheduled to completion with the queue share as its percent.
pub fn chart_row(run: &TaskRun, predecessors: &[String], simple: bool) -> Option<ChartRow> {
    let dependencies = if predecessors.is_empty() {
        None
    } else {
        Some(predecessors.join(","))
    };
    let base = |start, end, duration, percent| ChartRow {
        id: run.task_name.clone(),
        name: run.task_name.clone(),
        resource: run.state.to_string(),
        start,
        end,
        duration,
        percent,
        dependencies: dependencies.clone(),
    };

    if simple {
        let started = run.started?;
        return Some(match run.completed {
            // Still executing: zero elapsed span, completion stands in for
            // the unknown end.
            None => base(Some(started.timestamp_millis()), Some(started.timestamp_millis()), None, 100),
            Some(completed) => base(
                Some(started.timestamp_millis()),
                Some(completed.timestamp_millis()),
                None,
                0,
            ),
        });
    }

    if run.scheduled.is_none() && run.started.is_none() && run.completed.is_none() {
        return Some(base(None, None, Some(0), 0));
    }
    match run.completed {
        None => {
            // Queued or executing: span the known prefix.
            let start = run.scheduled.or(run.started);
            let end = run.started.or(run.scheduled);
            Some(base(millis(start), millis(end), None, 100))
        }
        Some(completed) => {
            let start = run.scheduled.or(run.started).unwrap_or(completed);
            Some(base(
                Some(start.timestamp_millis()),
                Some(completed.timestamp_millis()),
                None,
                run.queue_percent(),
            ))
        }
    }
}
