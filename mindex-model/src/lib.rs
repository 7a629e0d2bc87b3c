//! Wire and domain types shared by every crate in the workspace.
//!
//! Nothing in here talks to a database, a broker, or the network — these are
//! the value types that cross those boundaries.

pub mod channel;
pub mod error;
pub mod pubsub;
pub mod raw_event;
pub mod timeline_event;
pub mod unified_entity;
pub mod workflow;

pub use channel::Channel;
pub use error::ModelError;
pub use pubsub::PubSubMessage;
pub use raw_event::{CollectorStats, RawEvent};
pub use timeline_event::TimelineEvent;
pub use unified_entity::UnifiedEntity;
pub use workflow::{
    ExecutionStats, SyncError, SyncResult, WorkflowCategory, WorkflowInfo, WorkflowStatus,
    WorkflowVersion,
};
