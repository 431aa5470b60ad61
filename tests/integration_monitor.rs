//! Integration tests for monitor mode: a fake warehouse session drives the
//! polling loop and the report file is overwritten each cycle.

use std::time::Duration;

use anyhow::Result;
use chrono::{TimeZone, Utc};
use taskview::graph::TaskDirectory;
use taskview::monitor::{run_complete, watch};
use taskview::report;
use taskview::timeline::{chart_row, ChartRow, TaskRun};
use taskview::warehouse::{RunRow, Session, TaskRow};

/// In-memory session serving canned task and history rows.
struct FakeSession {
    tasks: Vec<TaskRow>,
    /// One history snapshot per fetch; the last snapshot repeats.
    history: Vec<Vec<RunRow>>,
    fetches: usize,
}

impl Session for FakeSession {
    fn list_tasks(&mut self) -> Result<Vec<TaskRow>> {
        Ok(self.tasks.clone())
    }

    fn task_history(&mut self, task_name: &str) -> Result<Vec<RunRow>> {
        Ok(self
            .history
            .last()
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.task_name == task_name)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn run_history(&mut self, _run_id: &str) -> Result<Vec<RunRow>> {
        let idx = self.fetches.min(self.history.len() - 1);
        self.fetches += 1;
        Ok(self.history[idx].clone())
    }
}

fn task_row(name: &str, predecessors: &str) -> TaskRow {
    TaskRow {
        created_on: "2024-01-15 10:30:00".to_string(),
        name: name.to_string(),
        id: format!("01a2-{}", name),
        warehouse: None,
        schedule: None,
        state: "started".to_string(),
        predecessors: predecessors.to_string(),
        allow_overlap: None,
    }
}

fn run_row(task: &str, state: &str, completed: bool) -> RunRow {
    let base = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
    RunRow {
        run_id: "1705312800000".to_string(),
        task_name: task.to_string(),
        state: state.to_string(),
        scheduled: Some(base),
        started: Some(base + chrono::Duration::seconds(1)),
        completed: completed.then(|| base + chrono::Duration::seconds(61)),
    }
}

fn fetch(session: &mut dyn Session) -> Result<Vec<TaskRun>> {
    Ok(session
        .run_history("1705312800000")?
        .into_iter()
        .map(TaskRun::from)
        .collect())
}

#[test]
fn test_monitor_performs_exactly_two_cycles() {
    // A single task whose run succeeds on the second fetch: the loop must
    // fetch and render exactly twice.
    let mut session = FakeSession {
        tasks: vec![task_row("LOAD", "[]")],
        history: vec![
            vec![run_row("LOAD", "EXECUTING", false)],
            vec![run_row("LOAD", "SUCCEEDED", true)],
        ],
        fetches: 0,
    };
    let directory = TaskDirectory::from_rows(&session.list_tasks().unwrap());

    let mut renders = 0;
    let cycles = watch(
        directory.len(),
        Duration::ZERO,
        || fetch(&mut session),
        |_| {
            renders += 1;
            Ok(())
        },
    )
    .unwrap();

    assert_eq!(cycles, 2);
    assert_eq!(renders, 2);
}

#[test]
fn test_monitor_waits_for_every_task() {
    // Two tasks but only one run fetched: not complete even though the one
    // run succeeded.
    let runs: Vec<TaskRun> = vec![run_row("LOAD", "SUCCEEDED", true).into()];
    assert!(!run_complete(&runs, 2));
    assert!(run_complete(&runs, 1));
}

#[test]
fn test_monitor_overwrites_report_each_cycle() {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = report::report_path(
        tmp.path(),
        "acme",
        "DB",
        "PUBLIC",
        Some("LOAD"),
        Some("1705312800000"),
    );

    let mut session = FakeSession {
        tasks: vec![task_row("LOAD", "[]")],
        history: vec![
            vec![run_row("LOAD", "EXECUTING", false)],
            vec![run_row("LOAD", "SUCCEEDED", true)],
        ],
        fetches: 0,
    };
    let directory = TaskDirectory::from_rows(&session.list_tasks().unwrap());

    watch(
        directory.len(),
        Duration::ZERO,
        || fetch(&mut session),
        |runs| {
            let rows: Vec<ChartRow> = runs
                .iter()
                .filter_map(|run| {
                    let preds = directory
                        .get(&run.task_name)
                        .map(|t| t.predecessors.clone())
                        .unwrap_or_default();
                    chart_row(run, &preds, false)
                })
                .collect();
            report::write_report(&path, &report::timeline_page(&rows, true)?)
        },
    )
    .unwrap();

    // The surviving file reflects the final, completed state.
    let html = std::fs::read_to_string(&path).unwrap();
    assert!(html.contains("\"resource\":\"succeeded\""));
    assert!(html.contains("<meta http-equiv=\"refresh\" content=\"3\">"));
}
