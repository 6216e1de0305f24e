use serde::Deserialize;
use serde_json::{Map as JsonMap, Value as JsonValue};

/// Descriptor set published by the logic engine. Replaced wholesale on every
/// update, never patched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Logic {
    #[serde(default)]
    pub event_listeners: Vec<ListenerDescriptor>,
    #[serde(default)]
    pub intervals: Vec<IntervalDescriptor>,
}

impl Logic {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// How the message queue treats submissions that share an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStrategy {
    /// Run every submission, strictly in order, never overlapping.
    Fifo,
    /// A newer submission supersedes one that is still pending.
    Latest,
    /// Ignore new submissions while one is outstanding.
    Drop,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerDescriptor {
    pub id: String,
    pub selector: String,
    pub event: EventSpec,
    pub msg: JsonValue,
    pub queue_strategy: QueueStrategy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventSpec {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub config: EventConfig,
}

/// Per-listener event behaviour flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EventOptions {
    pub prevent_default: bool,
    pub stop_propagation: bool,
    pub match_parent_elements: bool,
}

/// The two config shapes the logic engine emits. Wrapped configs nest the
/// options under `event` next to extra data such as key filters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawEventConfig")]
pub enum EventConfig {
    Plain(EventOptions),
    Wrapped {
        event: EventOptions,
        extra: JsonMap<String, JsonValue>,
    },
}

impl Default for EventConfig {
    fn default() -> Self {
        Self::Plain(EventOptions::default())
    }
}

impl EventConfig {
    pub fn options(&self) -> &EventOptions {
        match self {
            Self::Plain(options) => options,
            Self::Wrapped { event, .. } => event,
        }
    }

    pub fn extra(&self) -> Option<&JsonMap<String, JsonValue>> {
        match self {
            Self::Plain(_) => None,
            Self::Wrapped { extra, .. } => Some(extra),
        }
    }
}

// The wrapper must be tried first: a plain config accepts any object.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawEventConfig {
    Wrapped {
        event: EventOptions,
        #[serde(flatten)]
        extra: JsonMap<String, JsonValue>,
    },
    Plain(EventOptions),
}

impl From<RawEventConfig> for EventConfig {
    fn from(raw: RawEventConfig) -> Self {
        match raw {
            RawEventConfig::Wrapped { event, extra } => Self::Wrapped { event, extra },
            RawEventConfig::Plain(options) => Self::Plain(options),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalDescriptor {
    pub id: String,
    /// Period in milliseconds.
    pub duration: u64,
    pub msg: JsonValue,
    pub queue_strategy: QueueStrategy,
}

impl IntervalDescriptor {
    /// Identity used when diffing: `id`, `msg` and `duration` concatenated.
    /// Any change to one of them counts as a different interval.
    pub fn key(&self) -> String {
        let msg = match &self.msg {
            JsonValue::String(label) => label.clone(),
            other => other.to_string(),
        };
        format!("{}{}{}", self.id, msg, self.duration)
    }
}
