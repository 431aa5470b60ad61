//! Generated HTML report pages.
//!
//! The graph page embeds the DOT payload in a hidden textarea rendered by
//! d3-graphviz in the browser; the timeline page feeds serialized chart rows
//! to the Google Charts Gantt renderer. The monitor variant reloads itself
//! on the polling interval.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::timeline::ChartRow;

/// Seconds between page reloads in monitor mode, matching the poll interval.
const REFRESH_SECONDS: u64 = 3;

/// Report file path: `{out_dir}/{account}-{database}.{schema}[.{task}][-{run_id}].html`.
pub fn report_path(
    out_dir: &Path,
    account: &str,
    database: &str,
    schema: &str,
    task: Option<&str>,
    run_id: Option<&str>,
) -> PathBuf {
    let mut name = format!("{}-{}.{}", account, database, schema);
    if let Some(task) = task {
        name.push('.');
        name.push_str(task);
    }
    if let Some(run_id) = run_id {
        name.push('-');
        name.push_str(run_id);
    }
    name.push_str(".html");
    out_dir.join(name)
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// HTML page rendering a DOT digraph with d3-graphviz.
pub fn graph_page(dot: &str) -> String {
    format!(
        concat!(
            "<!DOCTYPE html>\n",
            "<meta charset=\"utf-8\">\n",
            "<body>\n",
            "<script src=\"https://d3js.org/d3.v5.min.js\"></script>\n",
            "<script src=\"https://unpkg.com/@hpcc-js/wasm@0.3.11/dist/index.min.js\"></script>\n",
            "<script src=\"https://unpkg.com/d3-graphviz@3.0.5/build/d3-graphviz.js\"></script>\n",
            "<div id=\"graph\" style=\"text-align: center;\"></div>\n",
            "<script>\n",
            "var graphviz = d3.select(\"#graph\").graphviz()\n",
            "   .on(\"initEnd\", () => {{ graphviz.renderDot(d3.select(\"#digraph\").text()); }});\n",
            "</script>\n",
            "<textarea id=\"digraph\" style=\"display:none;\">\n",
            "{dot}",
            "</textarea>\n",
        ),
        dot = escape_html(dot)
    )
}

/// HTML page rendering chart rows as a Gantt timeline.
///
/// Rows are injected as a JSON array, so task and warehouse names with
/// special characters survive intact. With `monitor` the page reloads itself
/// every poll interval.
pub fn timeline_page(rows: &[ChartRow], monitor: bool) -> Result<String> {
    let payload = serde_json::to_string(rows).context("Failed to serialize chart rows")?;
    let refresh = if monitor {
        format!(
            "<meta http-equiv=\"refresh\" content=\"{}\">\n",
            REFRESH_SECONDS
        )
    } else {
        String::new()
    };
    let height = rows.len() * 42 + 60;
    Ok(format!(
        concat!(
            "<!DOCTYPE html>\n",
            "<meta charset=\"utf-8\">\n",
            "{refresh}",
            "<body>\n",
            "<script src=\"https://www.gstatic.com/charts/loader.js\"></script>\n",
            "<div id=\"timeline\"></div>\n",
            "<script>\n",
            "var rows = {payload};\n",
            "google.charts.load('current', {{packages: ['gantt']}});\n",
            "google.charts.setOnLoadCallback(drawChart);\n",
            "function drawChart() {{\n",
            "  var data = new google.visualization.DataTable();\n",
            "  data.addColumn('string', 'Task ID');\n",
            "  data.addColumn('string', 'Task Name');\n",
            "  data.addColumn('string', 'Resource');\n",
            "  data.addColumn('date', 'Start');\n",
            "  data.addColumn('date', 'End');\n",
            "  data.addColumn('number', 'Duration');\n",
            "  data.addColumn('number', 'Percent Complete');\n",
            "  data.addColumn('string', 'Dependencies');\n",
            "  data.addRows(rows.map(function(r) {{\n",
            "    return [r.id, r.name, r.resource,\n",
            "      r.start == null ? null : new Date(r.start),\n",
            "      r.end == null ? null : new Date(r.end),\n",
            "      r.duration, r.percent, r.dependencies];\n",
            "  }}));\n",
            "  var chart = new google.visualization.Gantt(document.getElementById('timeline'));\n",
            "  chart.draw(data, {{height: {height}}});\n",
            "}}\n",
            "</script>\n",
        ),
        refresh = refresh,
        payload = payload,
        height = height
    ))
}

/// Write a report page, creating the output directory as needed.
pub fn write_report(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory {:?}", parent))?;
    }
    println!("Generating {} file...", path.display());
    fs::write(path, contents).with_context(|| format!("Failed to write report {:?}", path))
}
