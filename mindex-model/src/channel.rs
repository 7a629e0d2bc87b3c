use std::fmt;

/// Closed taxonomy of broker channels, plus the two dynamic families
/// (`entities:<s2_cell>` and the four `security:*` channels are fixed, but
/// `entities:<cell>` is parameterized by the s2 cell key).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    DevicesTelemetry,
    AgentsStatus,
    ExperimentsData,
    CrepLive,
    MemoryUpdates,
    WebsocketBroadcast,
    SystemAlerts,
    EntitiesLifecycle,
    EntitiesCell(String),
    SecurityIncidents,
    SecurityAlerts,
    SecurityIds,
    SecurityThreats,
}

impl Channel {
    pub const DEVICES_TELEMETRY: &'static str = "devices:telemetry";
    pub const AGENTS_STATUS: &'static str = "agents:status";
    pub const EXPERIMENTS_DATA: &'static str = "experiments:data";
    pub const CREP_LIVE: &'static str = "crep:live";
    pub const MEMORY_UPDATES: &'static str = "memory:updates";
    pub const WEBSOCKET_BROADCAST: &'static str = "websocket:broadcast";
    pub const SYSTEM_ALERTS: &'static str = "system:alerts";
    pub const ENTITIES_LIFECYCLE: &'static str = "entities:lifecycle";
    pub const SECURITY_INCIDENTS: &'static str = "security:incidents";
    pub const SECURITY_ALERTS: &'static str = "security:alerts";
    pub const SECURITY_IDS: &'static str = "security:ids";
    pub const SECURITY_THREATS: &'static str = "security:threats";

    pub fn entities_cell(cell: impl Into<String>) -> Self {
        Channel::EntitiesCell(cell.into())
    }

    /// Parses a raw broker channel name into the closed taxonomy, accepting
    /// the dynamic `entities:<cell>` family.
    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            Self::DEVICES_TELEMETRY => Channel::DevicesTelemetry,
            Self::AGENTS_STATUS => Channel::AgentsStatus,
            Self::EXPERIMENTS_DATA => Channel::ExperimentsData,
            Self::CREP_LIVE => Channel::CrepLive,
            Self::MEMORY_UPDATES => Channel::MemoryUpdates,
            Self::WEBSOCKET_BROADCAST => Channel::WebsocketBroadcast,
            Self::SYSTEM_ALERTS => Channel::SystemAlerts,
            Self::ENTITIES_LIFECYCLE => Channel::EntitiesLifecycle,
            Self::SECURITY_INCIDENTS => Channel::SecurityIncidents,
            Self::SECURITY_ALERTS => Channel::SecurityAlerts,
            Self::SECURITY_IDS => Channel::SecurityIds,
            Self::SECURITY_THREATS => Channel::SecurityThreats,
            other => other
                .strip_prefix("entities:")
                .map(|cell| Channel::EntitiesCell(cell.to_string()))?,
        })
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::DevicesTelemetry => write!(f, "{}", Self::DEVICES_TELEMETRY),
            Channel::AgentsStatus => write!(f, "{}", Self::AGENTS_STATUS),
            Channel::ExperimentsData => write!(f, "{}", Self::EXPERIMENTS_DATA),
            Channel::CrepLive => write!(f, "{}", Self::CREP_LIVE),
            Channel::MemoryUpdates => write!(f, "{}", Self::MEMORY_UPDATES),
            Channel::WebsocketBroadcast => write!(f, "{}", Self::WEBSOCKET_BROADCAST),
            Channel::SystemAlerts => write!(f, "{}", Self::SYSTEM_ALERTS),
            Channel::EntitiesLifecycle => write!(f, "{}", Self::ENTITIES_LIFECYCLE),
            Channel::EntitiesCell(cell) => write!(f, "entities:{cell}"),
            Channel::SecurityIncidents => write!(f, "{}", Self::SECURITY_INCIDENTS),
            Channel::SecurityAlerts => write!(f, "{}", Self::SECURITY_ALERTS),
            Channel::SecurityIds => write!(f, "{}", Self::SECURITY_IDS),
            Channel::SecurityThreats => write!(f, "{}", Self::SECURITY_THREATS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_static_channels() {
        for raw in [
            Channel::DEVICES_TELEMETRY,
            Channel::CREP_LIVE,
            Channel::SECURITY_IDS,
            Channel::ENTITIES_LIFECYCLE,
        ] {
            let parsed = Channel::parse(raw).expect("known channel");
            assert_eq!(parsed.to_string(), raw);
        }
    }

    #[test]
    fn parses_dynamic_entity_cell() {
        let parsed = Channel::parse("entities:abcdef1234567890").unwrap();
        assert_eq!(parsed, Channel::EntitiesCell("abcdef1234567890".into()));
        assert_eq!(parsed.to_string(), "entities:abcdef1234567890");
    }

    #[test]
    fn rejects_unknown_channel() {
        assert!(Channel::parse("bogus:channel").is_none());
    }
}
