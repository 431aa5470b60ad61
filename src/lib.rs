pub mod config;
pub mod graph;
pub mod monitor;
pub mod render;
pub mod report;
pub mod timeline;
pub mod warehouse;

pub use config::{Config, Profile};
pub use graph::{parse_predecessors, GraphError, Task, TaskDirectory, TaskState};
pub use monitor::{run_complete, watch, POLL_INTERVAL};
pub use render::{render_dot, Detail, Layout};
pub use timeline::{chart_row, ChartRow, RunState, TaskRun};
pub use warehouse::{connect, AuthMethod, RunRow, Session, SnowflakeSession, TaskRow};
