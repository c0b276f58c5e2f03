use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Stable identity of a channel across registry snapshots: "{owner}-{name}".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelKey(String);

impl ChannelKey {
    pub fn new(owner_id: Uuid, name: &str) -> Self {
        Self(format!("{owner_id}-{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ChannelKey {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where and as whom to connect to a feed broker.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedEndpoint {
    pub host: String,
    pub port: u16,
    pub ident: String,
    pub secret: String,
}

impl FeedEndpoint {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// Hand-written so secrets never end up in logs.
impl fmt::Debug for FeedEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedEndpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("ident", &self.ident)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Runtime view of one configured feed channel.
///
/// Built from a channel row by the registry snapshot. Two configs compare
/// equal only if every field matches, topic lists included; the differ relies
/// on that to decide whether a running subscriber must be restarted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelConfig {
    pub key: ChannelKey,
    pub channel_id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub endpoint: FeedEndpoint,
    pub subscribe_topics: Vec<String>,
    pub publish_topics: Vec<String>,
    pub is_default: bool,
    /// Sample source credited for everything ingested through this channel.
    pub source_id: Option<Uuid>,
}

impl ChannelConfig {
    /// Whether this channel needs a long-lived subscriber at all.
    pub fn wants_subscription(&self) -> bool {
        !self.subscribe_topics.is_empty()
    }
}

/// Split a stored topic list into an ordered, de-duplicated sequence.
///
/// Commas and whitespace both separate topics. The first occurrence of a
/// repeated topic wins, so the same text always yields the same `Vec`.
pub fn parse_topics(raw: &str) -> Vec<String> {
    let mut topics: Vec<String> = Vec::new();
    for topic in raw
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        if !topics.iter().any(|t| t == topic) {
            topics.push(topic.to_string());
        }
    }
    topics
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_key_format() {
        let owner = Uuid::nil();
        let key = ChannelKey::new(owner, "dionaea");
        assert_eq!(key.as_str(), "00000000-0000-0000-0000-000000000000-dionaea");
        assert_eq!(key.to_string(), key.as_str());
    }

    #[test]
    fn test_parse_topics_mixed_separators() {
        assert_eq!(
            parse_topics(" dionaea.capture, mwbinary.dionaea.sensorunique\tcuckoo "),
            vec!["dionaea.capture", "mwbinary.dionaea.sensorunique", "cuckoo"]
        );
    }

    #[test]
    fn test_parse_topics_stable_and_deduplicated() {
        let a = parse_topics("b,a,b,,c");
        let b = parse_topics("b, a b c");
        assert_eq!(a, vec!["b", "a", "c"]);
        assert_eq!(a, b);
        assert!(parse_topics("  ,, ").is_empty());
    }

    #[test]
    fn test_endpoint_debug_hides_secret() {
        let endpoint = FeedEndpoint {
            host: "feeds.example.org".into(),
            port: 10000,
            ident: "sensor".into(),
            secret: "hunter2".into(),
        };
        let rendered = format!("{endpoint:?}");
        assert!(!rendered.contains("hunter2"));
        assert_eq!(endpoint.address(), "feeds.example.org:10000");
    }
}
