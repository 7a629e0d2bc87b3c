//! Trait surfaces the core implements and the orchestrator/hub/workflow
//! engine depend on, kept separate from `mindex-model` so mock
//! implementations don't need to pull in the concrete collectors.

pub mod collector;
pub mod pubsub_transport;
pub mod workflow_transport;

pub use collector::{Collector, CollectorError, RetryConfig};
pub use pubsub_transport::{PubSubError, PubSubTransport};
pub use workflow_transport::{WorkflowTransport, WorkflowTransportError};

#[cfg(any(test, feature = "test-util"))]
pub use collector::MockCollector;
#[cfg(any(test, feature = "test-util"))]
pub use pubsub_transport::MockPubSubTransport;
#[cfg(any(test, feature = "test-util"))]
pub use workflow_transport::MockWorkflowTransport;
