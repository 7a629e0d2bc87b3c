//! WebSocket stream routers: five fixed-channel routers share
//! [`common::StreamManager`], the entity router owns its own per-client
//! subscription lifecycle in [`entity`].

pub mod common;
pub mod crep;
pub mod devices;
pub mod entity;
pub mod scientific;
pub mod security;
pub mod topology;

use std::sync::Arc;

use mindex_core::{PubSubHub, RedisTransport};

use crep::CrepManager;
use devices::DevicesManager;
use entity::EntityRouter;
use scientific::ScientificManager;
use security::SecurityManager;
use topology::TopologyManager;

/// Every stream router's state, built once at startup and shared through
/// [`crate::app_state::AppState`].
pub struct StreamRegistry {
    pub topology: Arc<TopologyManager>,
    pub devices: Arc<DevicesManager>,
    pub crep: Arc<CrepManager>,
    pub scientific: Arc<ScientificManager>,
    pub security: Arc<SecurityManager>,
    pub entity: Arc<EntityRouter>,
}

impl StreamRegistry {
    pub fn new(hub: Arc<PubSubHub<RedisTransport>>) -> Arc<Self> {
        Arc::new(Self {
            topology: topology::build(hub.clone()),
            devices: devices::build(hub.clone()),
            crep: crep::build(hub.clone()),
            scientific: scientific::build(hub.clone()),
            security: security::build(hub.clone()),
            entity: EntityRouter::new(hub),
        })
    }
}
