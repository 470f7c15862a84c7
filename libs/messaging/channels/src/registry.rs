//! Channel registry
//!
//! Name-based channel lookup. Reply and error channel headers may hold a
//! channel name instead of a channel; those names are resolved through a
//! [`ChannelResolver`], normally a [`ChannelRegistry`].

use crate::config::{ChannelConfig, ChannelType, ChannelsConfig, LoadBalancerType};
use crate::{
    BroadcastingDispatcher, ChannelRef, ConfigurableChannel, DirectChannel, ErrorHandler,
    ExecutorChannel, LoadBalancingStrategy, MessageChannel, MessagePublishingErrorHandler,
    MessagingError, PriorityChannel, PublishSubscribeChannel, QueueChannel, RoundRobinStrategy,
    TaskExecutor, ThreadLocalChannel, ThreadPoolExecutor, UnicastingDispatcher,
};
use dashmap::DashMap;
use std::fmt::Debug;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Looks up channels by name
pub trait ChannelResolver: Send + Sync + Debug {
    fn resolve(&self, name: &str) -> Result<Arc<dyn MessageChannel>, MessagingError>;
}

/// Turn a header value into a channel, resolving names through `resolver`
pub fn resolve_channel_ref(
    target: &ChannelRef,
    resolver: Option<&dyn ChannelResolver>,
) -> Result<Arc<dyn MessageChannel>, MessagingError> {
    match target {
        ChannelRef::Direct(channel) => Ok(Arc::clone(channel)),
        ChannelRef::Named(name) => match resolver {
            Some(resolver) => resolver.resolve(name),
            None => Err(MessagingError::ChannelResolution {
                name: name.clone(),
                reason: "no channel resolver configured".to_string(),
            }),
        },
    }
}

/// Concurrent map of channel name to channel
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: DashMap<String, Arc<dyn MessageChannel>>,
    executor: Option<Arc<ThreadPoolExecutor>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel under its own name, returning the channel it replaced
    pub fn register(&self, channel: Arc<dyn MessageChannel>) -> Option<Arc<dyn MessageChannel>> {
        let name = channel.name().to_string();
        debug!(channel = %name, "Registering channel");
        let previous = self.channels.insert(name.clone(), channel);
        if previous.is_some() {
            warn!(channel = %name, "Replaced previously registered channel");
        }
        previous
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<dyn MessageChannel>> {
        debug!(channel = %name, "Unregistering channel");
        self.channels.remove(name).map(|(_, channel)| channel)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn MessageChannel>> {
        self.channels.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// Registered channel names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Worker pool shared by the asynchronous channels built from config
    pub fn executor(&self) -> Option<&Arc<ThreadPoolExecutor>> {
        self.executor.as_ref()
    }

    /// Stop the shared worker pool, if any
    pub fn shutdown(&self) {
        if let Some(executor) = &self.executor {
            executor.shutdown();
        }
    }

    /// Build every configured channel.
    ///
    /// Asynchronous channels share one worker pool. Their failures are
    /// published to the failed message's error channel header, falling back
    /// to `error_channel`, with names resolved through the new registry.
    pub fn from_config(config: &ChannelsConfig) -> Result<Arc<Self>, MessagingError> {
        config.validate()?;

        let executor = if config.channels.values().any(ChannelConfig::needs_executor) {
            let settings = config.executor.clone().unwrap_or_default();
            let pool = ThreadPoolExecutor::with_name(&settings.thread_name, settings.workers)
                .map_err(|e| MessagingError::invalid_config(format!("Failed to start worker pool: {e}")))?;
            Some(Arc::new(pool))
        } else {
            None
        };

        let registry = Arc::new(Self {
            channels: DashMap::new(),
            executor,
        });

        let resolver: Arc<dyn ChannelResolver> = Arc::new(Arc::downgrade(&registry));
        let mut error_handler = MessagePublishingErrorHandler::new().with_resolver(resolver);
        if let Some(name) = &config.error_channel {
            error_handler = error_handler.with_default_channel_name(name.clone());
        }
        let error_handler: Arc<dyn ErrorHandler> = Arc::new(error_handler);
        let task_executor: Option<Arc<dyn TaskExecutor>> = registry
            .executor
            .clone()
            .map(|pool| pool as Arc<dyn TaskExecutor>);

        for (name, channel_config) in &config.channels {
            let channel = build_channel(name, channel_config, task_executor.as_ref(), &error_handler)?;
            registry.register(channel);
        }

        info!(
            channels = registry.len(),
            executor = registry.executor.is_some(),
            "Channel registry built from config"
        );
        Ok(registry)
    }
}

impl ChannelResolver for ChannelRegistry {
    fn resolve(&self, name: &str) -> Result<Arc<dyn MessageChannel>, MessagingError> {
        self.get(name).ok_or_else(|| MessagingError::ChannelResolution {
            name: name.to_string(),
            reason: "no channel registered under this name".to_string(),
        })
    }
}

impl ChannelResolver for Weak<ChannelRegistry> {
    fn resolve(&self, name: &str) -> Result<Arc<dyn MessageChannel>, MessagingError> {
        match self.upgrade() {
            Some(registry) => registry.resolve(name),
            None => Err(MessagingError::ChannelResolution {
                name: name.to_string(),
                reason: "channel registry has been dropped".to_string(),
            }),
        }
    }
}

fn build_channel(
    name: &str,
    config: &ChannelConfig,
    executor: Option<&Arc<dyn TaskExecutor>>,
    error_handler: &Arc<dyn ErrorHandler>,
) -> Result<Arc<dyn MessageChannel>, MessagingError> {
    let missing_executor =
        || MessagingError::invalid_config(format!("Channel '{name}' needs a worker pool"));

    let channel: Arc<dyn MessageChannel> = match config.channel_type {
        ChannelType::Direct => finish(
            DirectChannel::with_dispatcher(name, unicast_dispatcher(config)),
            config,
        ),
        ChannelType::Executor => {
            let executor = executor.ok_or_else(missing_executor)?;
            let dispatcher = unicast_dispatcher(config)
                .with_executor(Arc::clone(executor), Some(Arc::clone(error_handler)));
            finish(ExecutorChannel::with_dispatcher(name, dispatcher), config)
        }
        ChannelType::PublishSubscribe => {
            let mut dispatcher = BroadcastingDispatcher::new()
                .with_apply_sequence(config.apply_sequence.unwrap_or(false));
            if config.needs_executor() {
                let executor = executor.ok_or_else(missing_executor)?;
                dispatcher = dispatcher.with_executor(Arc::clone(executor), Some(Arc::clone(error_handler)));
            }
            finish(PublishSubscribeChannel::with_dispatcher(name, dispatcher), config)
        }
        ChannelType::Queue => match config.capacity {
            Some(capacity) => finish(QueueChannel::with_capacity(name, capacity)?, config),
            None => finish(QueueChannel::new(name), config),
        },
        ChannelType::Priority => match config.capacity {
            Some(capacity) => finish(PriorityChannel::with_capacity(name, capacity)?, config),
            None => finish(PriorityChannel::new(name), config),
        },
        ChannelType::ThreadLocal => finish(ThreadLocalChannel::new(name), config),
    };

    debug!(channel = name, kind = config.channel_type.name(), "Built channel");
    Ok(channel)
}

fn unicast_dispatcher(config: &ChannelConfig) -> UnicastingDispatcher {
    let load_balancer: Option<Arc<dyn LoadBalancingStrategy>> = match config.load_balancer {
        Some(LoadBalancerType::None) => None,
        Some(LoadBalancerType::RoundRobin) | None => Some(Arc::new(RoundRobinStrategy::new())),
    };
    UnicastingDispatcher::new()
        .with_load_balancer(load_balancer)
        .with_policy(config.dispatcher_policy())
}

fn finish<C>(channel: C, config: &ChannelConfig) -> Arc<dyn MessageChannel>
where
    C: MessageChannel + ConfigurableChannel + 'static,
{
    channel.set_track_history(config.track_history);
    Arc::new(channel)
}
