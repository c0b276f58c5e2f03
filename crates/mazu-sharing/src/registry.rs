//! Channel registry snapshots and the differ that compares them.

use std::collections::{BTreeMap, BTreeSet};

use mazu_shared::{parse_topics, ChannelConfig, ChannelKey, FeedEndpoint};
use mazu_store::Channel;

use crate::catalog::Catalog;
use crate::error::Result;

pub type Snapshot = BTreeMap<ChannelKey, ChannelConfig>;

/// Runtime view of a stored channel row.
pub fn channel_config(channel: &Channel) -> ChannelConfig {
    ChannelConfig {
        key: ChannelKey::new(channel.owner_id, &channel.name),
        channel_id: channel.id,
        owner_id: channel.owner_id,
        name: channel.name.clone(),
        endpoint: FeedEndpoint {
            host: channel.host.clone(),
            port: channel.port,
            ident: channel.ident.clone(),
            secret: channel.secret.clone(),
        },
        subscribe_topics: parse_topics(&channel.subchans),
        publish_topics: parse_topics(&channel.pubchans),
        is_default: channel.is_default,
        source_id: channel.source_id,
    }
}

/// Read the whole registry in one query and key it by channel.
pub fn snapshot(catalog: &dyn Catalog) -> Result<Snapshot> {
    let channels = catalog.list_channels()?;
    Ok(channels
        .iter()
        .map(|channel| {
            let config = channel_config(channel);
            (config.key.clone(), config)
        })
        .collect())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryDiff {
    pub added: BTreeSet<ChannelKey>,
    pub removed: BTreeSet<ChannelKey>,
    pub changed: BTreeSet<ChannelKey>,
}

impl RegistryDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    /// Whether `key` appears in any of the three sets.
    pub fn touches(&self, key: &ChannelKey) -> bool {
        self.added.contains(key) || self.removed.contains(key) || self.changed.contains(key)
    }
}

/// Compare two snapshots by key. Keys present in both with equal configs
/// appear in no set.
pub fn diff(old: &Snapshot, new: &Snapshot) -> RegistryDiff {
    let mut result = RegistryDiff::default();
    for (key, config) in new {
        match old.get(key) {
            None => {
                result.added.insert(key.clone());
            }
            Some(previous) if previous != config => {
                result.changed.insert(key.clone());
            }
            Some(_) => {}
        }
    }
    for key in old.keys() {
        if !new.contains_key(key) {
            result.removed.insert(key.clone());
        }
    }
    result
}
