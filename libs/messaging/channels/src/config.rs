//! TOML configuration for channel registries
//!
//! ```toml
//! error_channel = "errors"
//!
//! [executor]
//! workers = 4
//! thread_name = "bus-worker"
//!
//! [channels.orders]
//! type = "executor"
//! load_balancer = "round_robin"
//! rejection_limit = 3
//!
//! [channels.errors]
//! type = "queue"
//! capacity = 1000
//! ```

use crate::{DispatcherPolicy, MessagingError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Top-level channel configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ChannelsConfig {
    /// Worker pool shared by every asynchronous channel
    pub executor: Option<ExecutorConfig>,

    /// Default destination for failures raised by asynchronous handlers
    pub error_channel: Option<String>,

    /// Map of channel name to channel configuration
    #[serde(default)]
    pub channels: BTreeMap<String, ChannelConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExecutorConfig {
    /// Number of worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Worker thread name prefix
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
}

fn default_workers() -> usize {
    4
}

fn default_thread_name() -> String {
    "channel-worker".to_string()
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            thread_name: default_thread_name(),
        }
    }
}

/// Supported channel types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    /// Point-to-point, handler runs in the sender's thread
    Direct,
    /// Point-to-point, handler runs on the worker pool
    Executor,
    /// Broadcast to every subscriber
    PublishSubscribe,
    /// FIFO buffer
    Queue,
    /// Priority-ordered buffer
    Priority,
    /// Buffer confined to the sending thread
    ThreadLocal,
}

impl ChannelType {
    /// Get human-readable name for error messages
    pub fn name(self) -> &'static str {
        match self {
            ChannelType::Direct => "direct",
            ChannelType::Executor => "executor",
            ChannelType::PublishSubscribe => "publish_subscribe",
            ChannelType::Queue => "queue",
            ChannelType::Priority => "priority",
            ChannelType::ThreadLocal => "thread_local",
        }
    }

    /// Channels whose handlers are pushed messages through a dispatcher
    pub fn is_subscribable(self) -> bool {
        matches!(
            self,
            ChannelType::Direct | ChannelType::Executor | ChannelType::PublishSubscribe
        )
    }

    fn is_unicast(self) -> bool {
        matches!(self, ChannelType::Direct | ChannelType::Executor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancerType {
    RoundRobin,
    None,
}

/// Configuration for a single channel
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChannelConfig {
    #[serde(rename = "type")]
    pub channel_type: ChannelType,

    /// Buffer size for queue and priority channels; unbounded when absent
    pub capacity: Option<usize>,

    pub load_balancer: Option<LoadBalancerType>,

    pub rejection_limit: Option<usize>,

    pub retry_interval_ms: Option<u64>,

    pub fail_on_rejection_limit: Option<bool>,

    pub failover: Option<bool>,

    /// Stamp broadcast copies with sequence headers
    pub apply_sequence: Option<bool>,

    /// Run publish-subscribe handlers on the worker pool
    pub use_executor: Option<bool>,

    #[serde(default)]
    pub track_history: bool,
}

impl ChannelConfig {
    /// Minimal configuration of the given type
    pub fn of_type(channel_type: ChannelType) -> Self {
        Self {
            channel_type,
            capacity: None,
            load_balancer: None,
            rejection_limit: None,
            retry_interval_ms: None,
            fail_on_rejection_limit: None,
            failover: None,
            apply_sequence: None,
            use_executor: None,
            track_history: false,
        }
    }

    /// Dispatcher policy, using defaults for unset fields
    pub fn dispatcher_policy(&self) -> DispatcherPolicy {
        let defaults = DispatcherPolicy::default();
        DispatcherPolicy {
            rejection_limit: self.rejection_limit.unwrap_or(defaults.rejection_limit),
            retry_interval: self
                .retry_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_interval),
            fail_on_rejection_limit: self
                .fail_on_rejection_limit
                .unwrap_or(defaults.fail_on_rejection_limit),
            failover: self.failover.unwrap_or(defaults.failover),
        }
    }

    /// Check if the channel needs the shared worker pool
    pub fn needs_executor(&self) -> bool {
        match self.channel_type {
            ChannelType::Executor => true,
            ChannelType::PublishSubscribe => self.use_executor.unwrap_or(false),
            _ => false,
        }
    }

    /// Validate the channel configuration
    pub fn validate(&self) -> Result<(), String> {
        let kind = self.channel_type;

        if let Some(capacity) = self.capacity {
            if kind.is_subscribable() || kind == ChannelType::ThreadLocal {
                return Err(format!("{} channels do not take a capacity", kind.name()));
            }
            if capacity == 0 {
                return Err("Capacity must be greater than 0".to_string());
            }
        }

        let unicast_settings = self.load_balancer.is_some()
            || self.rejection_limit.is_some()
            || self.retry_interval_ms.is_some()
            || self.fail_on_rejection_limit.is_some()
            || self.failover.is_some();
        if unicast_settings && !kind.is_unicast() {
            return Err(format!(
                "{} channels do not take load balancing or rejection settings",
                kind.name()
            ));
        }

        if let Some(limit) = self.rejection_limit {
            if limit == 0 {
                return Err("Rejection limit must be greater than 0".to_string());
            }
        }

        if (self.apply_sequence.is_some() || self.use_executor.is_some())
            && kind != ChannelType::PublishSubscribe
        {
            return Err(format!(
                "{} channels do not take apply_sequence or use_executor",
                kind.name()
            ));
        }

        Ok(())
    }
}

impl ChannelsConfig {
    /// Create from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, MessagingError> {
        toml::from_str(toml_str)
            .map_err(|e| MessagingError::invalid_config(format!("Failed to parse TOML: {e}")))
    }

    /// Create from file path
    pub fn from_file(path: &std::path::Path) -> Result<Self, MessagingError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MessagingError::invalid_config(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Convert to TOML string
    pub fn to_toml(&self) -> Result<String, MessagingError> {
        toml::to_string_pretty(self)
            .map_err(|e| MessagingError::invalid_config(format!("Failed to serialize to TOML: {e}")))
    }

    /// Validate all channel configurations
    pub fn validate(&self) -> Result<(), MessagingError> {
        for (name, config) in &self.channels {
            config
                .validate()
                .map_err(|e| MessagingError::invalid_config(format!("Channel '{name}': {e}")))?;
        }

        if let Some(executor) = &self.executor {
            if executor.workers == 0 {
                return Err(MessagingError::invalid_config(
                    "Executor workers must be greater than 0",
                ));
            }
        }

        if let Some(error_channel) = &self.error_channel {
            if !self.channels.contains_key(error_channel) {
                return Err(MessagingError::invalid_config(format!(
                    "error_channel references unknown channel '{error_channel}'"
                )));
            }
        }

        Ok(())
    }

    pub fn get_channel(&self, name: &str) -> Option<&ChannelConfig> {
        self.channels.get(name)
    }
}
