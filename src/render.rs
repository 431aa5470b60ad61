//! DOT serialization of a task directory.

use crate::graph::{TaskDirectory, TaskState};

/// Graph orientation (Graphviz rankdir).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    LeftRight,
    TopBottom,
}

impl Layout {
    fn rankdir(self) -> &'static str {
        match self {
            Layout::LeftRight => "LR",
            Layout::TopBottom => "TB",
        }
    }
}

/// Node rendering mode: full info cards or bare colored boxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detail {
    Full,
    Minimal,
}

/// Fill color keyed by task state: suspended tasks stand out from the rest.
fn state_color(state: &TaskState) -> &'static str {
    match state {
        TaskState::Suspended => "lightgray",
        _ => "lightskyblue",
    }
}

/// Escape a value for use inside a double-quoted DOT string.
fn escape_dot(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Escape a value for use inside an HTML-like DOT label.
fn escape_label(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn card_field(lines: &mut Vec<String>, label: &str, value: &str) {
    lines.push(format!(
        "<tr><td align=\"left\"><font color=\"#000000\" point-size=\"12.0\"><i>{}</i>: {}</font></td></tr>",
        label,
        escape_label(value)
    ));
}

/// Serialize the directory as a DOT digraph: one node per task, one edge per
/// predecessor relation (predecessor to dependent). Output order follows the
/// directory, so equal input yields byte-equal output.
pub fn render_dot(dir: &TaskDirectory, layout: Layout, detail: Detail) -> String {
    let mut lines = Vec::new();
    lines.push("digraph tasks {".to_string());
    lines.push(format!(
        "  graph [ rankdir=\"{}\" bgcolor=\"#ffffff\" ]",
        layout.rankdir()
    ));
    match detail {
        Detail::Full => lines.push(
            "  node [ style=\"filled\" shape=\"Mrecord\" fillcolor=\"#f5f5f5\" color=\"#6c6c6c\" penwidth=\"1\" ]"
                .to_string(),
        ),
        Detail::Minimal => lines.push(
            "  node [ style=\"filled\" shape=\"box\" color=\"#6c6c6c\" penwidth=\"1\" ]".to_string(),
        ),
    }
    lines.push(
        "  edge [ penwidth=\"1\" color=\"#696969\" dir=\"forward\" style=\"solid\" ]".to_string(),
    );
    lines.push(String::new());

    for task in dir.tasks() {
        match detail {
            Detail::Minimal => {
                lines.push(format!(
                    "  \"{}\" [ label=\"{}\" fillcolor=\"{}\" ];",
                    escape_dot(&task.name),
                    escape_dot(&task.name),
                    state_color(&task.state)
                ));
            }
            Detail::Full => {
                lines.push(format!(
                    "  \"{}\" [ label=<<table style=\"rounded\" border=\"0\" cellborder=\"0\" cellspacing=\"0\" cellpadding=\"1\">",
                    escape_dot(&task.name)
                ));
                lines.push(format!(
                    "<tr><td bgcolor=\"{}\" align=\"center\"><font color=\"#000000\"><b>{}</b></font></td></tr>",
                    state_color(&task.state),
                    escape_label(&task.name)
                ));
                card_field(&mut lines, "state", &task.state.to_string());
                if let Some(ref warehouse) = task.warehouse {
                    card_field(&mut lines, "warehouse", warehouse);
                }
                card_field(&mut lines, "id", &task.id);
                card_field(&mut lines, "created on", &task.created_on);
                if let Some(allow_overlap) = task.allow_overlap {
                    card_field(&mut lines, "allow overlap", &allow_overlap.to_string());
                }
                if let Some(ref schedule) = task.schedule {
                    card_field(&mut lines, "schedule", schedule);
                }
                lines.push("</table>> ];".to_string());
            }
        }
    }

    lines.push(String::new());

    for task in dir.tasks() {
        for pred in &task.predecessors {
            lines.push(format!(
                "  \"{}\" -> \"{}\";",
                escape_dot(pred),
                escape_dot(&task.name)
            ));
        }
    }

    lines.push("}".to_string());
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Task;

    fn make_task(name: &str, state: TaskState, preds: &[&str]) -> Task {
        Task {
            name: name.to_string(),
            id: format!("id-{}", name),
            state,
            created_on: "2024-01-15 10:30:00".to_string(),
            warehouse: Some("COMPUTE_WH".to_string()),
            schedule: None,
            allow_overlap: None,
            predecessors: preds.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn make_dir() -> TaskDirectory {
        let mut dir = TaskDirectory::new();
        dir.insert(make_task("LOAD", TaskState::Started, &[]));
        dir.insert(make_task("TRANSFORM", TaskState::Suspended, &["LOAD"]));
        dir
    }

    #[test]
    fn test_minimal_nodes_and_edges() {
        let dot = render_dot(&make_dir(), Layout::LeftRight, Detail::Minimal);
        assert!(dot.starts_with("digraph tasks {"));
        assert!(dot.contains("rankdir=\"LR\""));
        assert!(dot.contains("\"LOAD\" [ label=\"LOAD\" fillcolor=\"lightskyblue\" ];"));
        assert!(dot.contains("\"TRANSFORM\" [ label=\"TRANSFORM\" fillcolor=\"lightgray\" ];"));
        assert!(dot.contains("\"LOAD\" -> \"TRANSFORM\";"));
        assert!(dot.trim_end().ends_with('}'));
    }

    #[test]
    fn test_vertical_layout() {
        let dot = render_dot(&make_dir(), Layout::TopBottom, Detail::Minimal);
        assert!(dot.contains("rankdir=\"TB\""));
    }

    #[test]
    fn test_full_cards_embed_attributes() {
        let dot = render_dot(&make_dir(), Layout::LeftRight, Detail::Full);
        assert!(dot.contains("<i>state</i>: started"));
        assert!(dot.contains("<i>warehouse</i>: COMPUTE_WH"));
        assert!(dot.contains("<i>id</i>: id-LOAD"));
        assert!(dot.contains("<i>created on</i>: 2024-01-15 10:30:00"));
        // Optional attributes are omitted when unknown.
        assert!(!dot.contains("allow overlap"));
        assert!(!dot.contains("<i>schedule</i>"));
    }

    #[test]
    fn test_full_cards_include_optional_attributes_when_known() {
        let mut dir = TaskDirectory::new();
        let mut task = make_task("LOAD", TaskState::Started, &[]);
        task.schedule = Some("USING CRON 0 * * * * UTC".to_string());
        task.allow_overlap = Some(true);
        dir.insert(task);
        let dot = render_dot(&dir, Layout::LeftRight, Detail::Full);
        assert!(dot.contains("<i>allow overlap</i>: true"));
        assert!(dot.contains("<i>schedule</i>: USING CRON 0 * * * * UTC"));
    }

    #[test]
    fn test_special_characters_are_escaped() {
        let mut dir = TaskDirectory::new();
        let mut task = make_task("WEIRD\"NAME", TaskState::Started, &[]);
        task.warehouse = Some("A<B&C".to_string());
        dir.insert(task);
        let dot = render_dot(&dir, Layout::LeftRight, Detail::Full);
        assert!(dot.contains("\"WEIRD\\\"NAME\""));
        assert!(dot.contains("A&lt;B&amp;C"));
    }

    #[test]
    fn test_output_is_deterministic() {
        let a = render_dot(&make_dir(), Layout::LeftRight, Detail::Full);
        let b = render_dot(&make_dir(), Layout::LeftRight, Detail::Full);
        assert_eq!(a, b);
    }
}
