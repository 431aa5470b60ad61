use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context, Result};
use clap::Parser;

use taskview::config::Config;
use taskview::graph::TaskDirectory;
use taskview::monitor;
use taskview::render::{render_dot, Detail, Layout};
use taskview::report;
use taskview::timeline::{chart_row, ChartRow, TaskRun};
use taskview::warehouse::{connect, Session};

#[derive(Parser)]
#[command(name = "taskview")]
#[command(about = "Render Snowflake task dependency graphs and run timelines")]
#[command(version)]
struct Cli {
    /// Root task to focus on (omit to list all root tasks)
    task: Option<String>,

    /// Run id to render as a timeline (requires a task name)
    run_id: Option<String>,

    /// Top-to-bottom graph layout instead of left-to-right
    #[arg(long)]
    vertical: bool,

    /// Minimal graph nodes and simplified timeline semantics
    #[arg(long)]
    simple: bool,

    /// Keep re-rendering the timeline until the run completes
    #[arg(long)]
    monitor: bool,

    /// Profile name in profiles.toml
    #[arg(long, default_value = "default")]
    profile: String,

    /// Path to the profiles file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for generated reports
    #[arg(long, default_value = "output")]
    out_dir: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    let profile = config.get(&cli.profile)?.clone();
    let database = profile
        .database
        .clone()
        .context("profile is missing a database")?;
    let schema = profile
        .schema
        .clone()
        .context("profile is missing a schema")?;
    let mut session = connect(&profile)?;

    let rows = session.list_tasks()?;
    let directory = TaskDirectory::from_rows(&rows);
    let roots = directory.roots();
    if roots.is_empty() {
        println!(
            "There are no root tasks in the {}.{} database schema!",
            database, schema
        );
        process::exit(2);
    }

    let directory = match cli.task.as_deref() {
        None => {
            println!(
                "The root tasks in the {}.{} database schema:",
                database, schema
            );
            for name in &roots {
                println!("   {}", name);
            }
            directory
        }
        Some(task) => {
            if !roots.iter().any(|r| r == task) {
                println!(
                    "{} is not a root task in the {}.{} database schema!",
                    task, database, schema
                );
                process::exit(2);
            }
            directory.subgraph_rooted_at(task)?
        }
    };

    let path = report::report_path(
        &cli.out_dir,
        &profile.account,
        &database,
        &schema,
        cli.task.as_deref(),
        cli.run_id.as_deref(),
    );

    match (cli.task.as_deref(), cli.run_id.as_deref()) {
        (_, None) => {
            let layout = if cli.vertical {
                Layout::TopBottom
            } else {
                Layout::LeftRight
            };
            let detail = if cli.simple {
                Detail::Minimal
            } else {
                Detail::Full
            };
            let dot = render_dot(&directory, layout, detail);
            println!("\nGenerated DOT digraph:");
            println!("{}", dot);
            report::write_report(&path, &report::graph_page(&dot))?;
        }
        (Some(task), Some(run_id)) => {
            let runs = fetch_runs(&mut session, run_id)?;
            if runs.is_empty() {
                bail!(
                    "No run history for run id {} of task {}.{}",
                    run_id,
                    task,
                    recent_runs_hint(&mut session, task)
                );
            }
            if cli.monitor {
                monitor::watch(
                    directory.len(),
                    monitor::POLL_INTERVAL,
                    || fetch_runs(&mut session, run_id),
                    |runs| {
                        let rows = build_rows(&directory, runs, cli.simple);
                        report::write_report(&path, &report::timeline_page(&rows, true)?)
                    },
                )?;
            } else {
                let rows = build_rows(&directory, &runs, cli.simple);
                report::write_report(&path, &report::timeline_page(&rows, false)?)?;
            }
        }
        (None, Some(_)) => unreachable!("a run id always follows a task name"),
    }

    Ok(())
}

fn fetch_runs(session: &mut dyn Session, run_id: &str) -> Result<Vec<TaskRun>> {
    Ok(session
        .run_history(run_id)?
        .into_iter()
        .map(TaskRun::from)
        .collect())
}

/// Chart rows for the fetched runs, with each task's predecessor names for
/// dependency arrows. Runs skipped by simple mode produce no row.
fn build_rows(directory: &TaskDirectory, runs: &[TaskRun], simple: bool) -> Vec<ChartRow> {
    runs.iter()
        .filter_map(|run| {
            let predecessors = directory
                .get(&run.task_name)
                .map(|t| t.predecessors.clone())
                .unwrap_or_default();
            chart_row(run, &predecessors, simple)
        })
        .collect()
}

fn recent_runs_hint(session: &mut dyn Session, task: &str) -> String {
    match session.task_history(task) {
        Ok(history) if !history.is_empty() => {
            let ids: Vec<&str> = history.iter().take(10).map(|r| r.run_id.as_str()).collect();
            format!(" Recent run ids: {}", ids.join(", "))
        }
        _ => String::new(),
    }
}
