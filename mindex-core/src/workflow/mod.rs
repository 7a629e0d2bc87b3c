//! n8n workflow management: the engine that talks to one n8n instance, a
//! scheduler that runs it on a cadence, and a dual-instance drift monitor.

pub mod auto_monitor;
pub mod engine;
pub mod http_transport;
pub mod scheduler;

pub use auto_monitor::{AutoMonitorStatus, WorkflowAutoMonitor};
pub use engine::{clean_workflow_for_api, WorkflowDirs, WorkflowEngine};
pub use http_transport::HttpWorkflowTransport;
pub use scheduler::{WorkflowCallback, WorkflowEvent, WorkflowScheduler};
