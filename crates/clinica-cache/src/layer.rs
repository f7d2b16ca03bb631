//! Cache layer descriptors.
//!
//! Every resource category the CRM caches maps to exactly one static
//! [`CacheLayer`]. The table is compiled in and never changes at runtime.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Population strategy. Only cache-aside is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheStrategy {
    CacheAside,
}

/// Priority of a layer. Only used to bias the adaptive TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerPriority {
    Low,
    Medium,
    High,
}

/// Static configuration of one cache layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLayer {
    pub name: &'static str,
    pub default_ttl: Duration,
    pub strategy: CacheStrategy,
    pub priority: LayerPriority,
}

const CONVERSATION_LIST: CacheLayer = CacheLayer {
    name: "conversations",
    default_ttl: Duration::from_secs(300),
    strategy: CacheStrategy::CacheAside,
    priority: LayerPriority::High,
};

const CONVERSATION_DETAIL: CacheLayer = CacheLayer {
    name: "conversation",
    default_ttl: Duration::from_secs(600),
    strategy: CacheStrategy::CacheAside,
    priority: LayerPriority::High,
};

const CONTACT_METADATA: CacheLayer = CacheLayer {
    name: "contact",
    default_ttl: Duration::from_secs(1800),
    strategy: CacheStrategy::CacheAside,
    priority: LayerPriority::Medium,
};

const ATTACHMENT_METADATA: CacheLayer = CacheLayer {
    name: "attachment",
    default_ttl: Duration::from_secs(3600),
    strategy: CacheStrategy::CacheAside,
    priority: LayerPriority::Low,
};

/// Logical resource categories held in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceCategory {
    ConversationList,
    ConversationDetail,
    ContactMetadata,
    AttachmentMetadata,
}

impl ResourceCategory {
    pub const ALL: [ResourceCategory; 4] = [
        ResourceCategory::ConversationList,
        ResourceCategory::ConversationDetail,
        ResourceCategory::ContactMetadata,
        ResourceCategory::AttachmentMetadata,
    ];

    /// The descriptor for this category.
    pub fn layer(self) -> &'static CacheLayer {
        match self {
            ResourceCategory::ConversationList => &CONVERSATION_LIST,
            ResourceCategory::ConversationDetail => &CONVERSATION_DETAIL,
            ResourceCategory::ContactMetadata => &CONTACT_METADATA,
            ResourceCategory::AttachmentMetadata => &ATTACHMENT_METADATA,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceCategory::ConversationList => "conversationList",
            ResourceCategory::ConversationDetail => "conversationDetail",
            ResourceCategory::ContactMetadata => "contactMetadata",
            ResourceCategory::AttachmentMetadata => "attachmentMetadata",
        }
    }

    /// Accepts either the category name or its layer name.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s) || c.layer().name.eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown cache category: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_category_has_its_own_layer() {
        let names: Vec<&str> = ResourceCategory::ALL
            .iter()
            .map(|c| c.layer().name)
            .collect();
        let mut deduped = names.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(names.len(), deduped.len());
        assert!(
            ResourceCategory::ALL
                .iter()
                .all(|c| c.layer().strategy == CacheStrategy::CacheAside)
        );
    }

    #[test]
    fn parse_accepts_category_and_layer_names() {
        assert_eq!(
            ResourceCategory::parse("conversationList"),
            Some(ResourceCategory::ConversationList)
        );
        assert_eq!(
            ResourceCategory::parse("attachment"),
            Some(ResourceCategory::AttachmentMetadata)
        );
        assert_eq!(
            "CONTACT".parse::<ResourceCategory>(),
            Ok(ResourceCategory::ContactMetadata)
        );
        assert!(ResourceCategory::parse("appointments").is_none());
    }

    #[test]
    fn list_layer_defaults() {
        let layer = ResourceCategory::ConversationList.layer();
        assert_eq!(layer.default_ttl, Duration::from_secs(300));
        assert_eq!(layer.priority, LayerPriority::High);
    }
}
