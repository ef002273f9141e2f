use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::ProtocolTag;

/// Per-protocol toggle and wire params, `protocols.<tag>.*` in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,

    /// Expected peer identity string, when the directory doesn't supply one.
    #[serde(default)]
    pub identity: Option<String>,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            port: None,
            timeout: default_timeout(),
            identity: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtocolsConfig(pub HashMap<ProtocolTag, ProtocolSettings>);

impl Default for ProtocolsConfig {
    fn default() -> Self {
        let mut map = HashMap::new();
        for tag in ProtocolTag::ALL {
            // IVM has no registered prober; ship it disabled by default so
            // the Executor's "for which a prober exists" clause and config
            // agree without the operator having to know the implementation
            // detail.
            let enabled = tag != ProtocolTag::Ivm;
            map.insert(
                tag,
                ProtocolSettings {
                    enabled,
                    ..ProtocolSettings::default()
                },
            );
        }
        Self(map)
    }
}

impl ProtocolsConfig {
    pub fn get(&self, tag: ProtocolTag) -> ProtocolSettings {
        self.0.get(&tag).cloned().unwrap_or_default()
    }

    pub fn is_enabled(&self, tag: ProtocolTag) -> bool {
        self.0.get(&tag).map(|s| s.enabled).unwrap_or(false)
    }
}

impl serde::ser::Serialize for ProtocolTag {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::de::Deserialize<'de> for ProtocolTag {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use std::str::FromStr;
        let s = String::deserialize(deserializer)?;
        ProtocolTag::from_str(&s).map_err(serde::de::Error::custom)
    }
}
