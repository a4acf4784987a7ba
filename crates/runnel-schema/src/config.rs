//! Registry configuration

use runnel_log::TopicPartition;
use serde::{Deserialize, Serialize};

/// Configuration for the sequenced registry core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Identifier of this writing node, embedded in every persisted key.
    pub node_id: u32,

    /// Internal topic holding the registry's records (default: "_schemas").
    /// Single partition; its total order is what makes sequencing work.
    #[serde(default = "default_topic")]
    pub topic: String,

    /// How many times a mutation retries after losing an optimistic write
    /// race before failing (default: 5).
    #[serde(default = "default_max_write_retries")]
    pub max_write_retries: u32,
}

fn default_topic() -> String {
    "_schemas".to_string()
}

fn default_max_write_retries() -> u32 {
    5
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            node_id: 0,
            topic: default_topic(),
            max_write_retries: default_max_write_retries(),
        }
    }
}

impl RegistryConfig {
    pub fn new(node_id: u32) -> Self {
        Self {
            node_id,
            ..Default::default()
        }
    }

    /// Set a custom internal topic name
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Set the retry budget for optimistic writes
    pub fn with_max_write_retries(mut self, retries: u32) -> Self {
        self.max_write_retries = retries;
        self
    }

    /// The internal topic as a partition address (always partition 0).
    pub fn topic_partition(&self) -> TopicPartition {
        TopicPartition::new(self.topic.clone(), 0)
    }
}
