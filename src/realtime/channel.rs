//! Channel keys and the open-channel registry.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use super::translate::{Route, AI_ROUTES, DASHBOARD_ROUTES, GROWTH_ROUTES, TEAM_ROUTES};
use crate::interfaces::{ChannelHandle, TransportError};

/// Kind of realtime subscription. Determines the channel key prefix and
/// the tables watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionKind {
    Dashboard,
    Team,
    Ai,
    Growth,
    Custom,
}

impl SubscriptionKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            SubscriptionKind::Dashboard => "dashboard",
            SubscriptionKind::Team => "team",
            SubscriptionKind::Ai => "ai",
            SubscriptionKind::Growth => "growth",
            SubscriptionKind::Custom => "custom",
        }
    }

    /// Tables watched by this kind. Custom channels are broadcast-only.
    pub fn routes(&self) -> &'static [Route] {
        match self {
            SubscriptionKind::Dashboard => DASHBOARD_ROUTES,
            SubscriptionKind::Team => TEAM_ROUTES,
            SubscriptionKind::Ai => AI_ROUTES,
            SubscriptionKind::Growth => GROWTH_ROUTES,
            SubscriptionKind::Custom => &[],
        }
    }
}

/// Composite channel key `<prefix>:<target>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelKey(String);

impl ChannelKey {
    pub fn new(kind: SubscriptionKind, target: &str) -> Self {
        Self(format!("{}:{}", kind.prefix(), target))
    }

    /// Key for a custom-events channel: user, else org, else `global`.
    pub fn custom(user_id: Option<&str>, org_id: Option<&str>) -> Self {
        let target = user_id
            .filter(|s| !s.is_empty())
            .or(org_id.filter(|s| !s.is_empty()))
            .unwrap_or("global");
        Self::new(SubscriptionKind::Custom, target)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Open channels keyed by channel key.
///
/// All mutation goes through this type. The lock is held across the
/// transport subscribe so concurrent opens of one key create one channel.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: Mutex<HashMap<String, Arc<dyn ChannelHandle>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the open channel for `key`, or build one with `open`,
    /// subscribe it and record it.
    ///
    /// The boolean is true when a new channel was opened. A failed
    /// subscribe records nothing.
    pub async fn get_or_open<F>(
        &self,
        key: &ChannelKey,
        open: F,
    ) -> Result<(Arc<dyn ChannelHandle>, bool), TransportError>
    where
        F: FnOnce() -> Arc<dyn ChannelHandle>,
    {
        let mut channels = self.channels.lock().await;
        if let Some(existing) = channels.get(key.as_str()) {
            return Ok((Arc::clone(existing), false));
        }

        let channel = open();
        if let Err(e) = channel.subscribe().await {
            release(key.as_str(), channel.as_ref()).await;
            return Err(e);
        }
        channels.insert(key.as_str().to_string(), Arc::clone(&channel));
        Ok((channel, true))
    }

    pub async fn get(&self, key: &str) -> Option<Arc<dyn ChannelHandle>> {
        self.channels.lock().await.get(key).cloned()
    }

    pub async fn remove(&self, key: &str) -> Option<Arc<dyn ChannelHandle>> {
        self.channels.lock().await.remove(key)
    }

    /// Remove and return every open channel.
    pub async fn drain(&self) -> Vec<(String, Arc<dyn ChannelHandle>)> {
        self.channels.lock().await.drain().collect()
    }

    /// Open keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.channels.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Release a handle whose subscribe failed.
pub(crate) async fn release(key: &str, channel: &dyn ChannelHandle) {
    if let Err(e) = channel.unsubscribe().await {
        warn!(channel = %key, error = %e, "Failed to release unsubscribed channel");
    }
}
