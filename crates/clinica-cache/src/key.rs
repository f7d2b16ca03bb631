//! Cache key namespace.
//!
//! These strings are a contract with every caller that reads or writes the
//! cache without going through the helpers: a key built differently simply
//! never hits.

use std::fmt;

use crate::layer::ResourceCategory;

/// A key in the cache namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// `{category}:{identifier}`
    Generic { category: String, identifier: String },
    /// `clinic:{clinicId}:conversations:list`
    ConversationsList { clinic_id: String },
    /// `conversation:{conversationId}:detail:page:{page}:limit:{limit}`
    ConversationDetail {
        conversation_id: String,
        page: u32,
        limit: u32,
    },
    /// `contact:{contactId}:metadata`
    ContactMetadata { contact_id: String },
    /// `attachment:{attachmentId}:metadata`
    AttachmentMetadata { attachment_id: String },
}

impl CacheKey {
    pub fn generic(category: impl fmt::Display, identifier: impl fmt::Display) -> Self {
        Self::Generic {
            category: category.to_string(),
            identifier: identifier.to_string(),
        }
    }

    pub fn conversations_list(clinic_id: impl fmt::Display) -> Self {
        Self::ConversationsList {
            clinic_id: clinic_id.to_string(),
        }
    }

    pub fn conversation_detail(conversation_id: impl fmt::Display, page: u32, limit: u32) -> Self {
        Self::ConversationDetail {
            conversation_id: conversation_id.to_string(),
            page,
            limit,
        }
    }

    pub fn contact_metadata(contact_id: impl fmt::Display) -> Self {
        Self::ContactMetadata {
            contact_id: contact_id.to_string(),
        }
    }

    pub fn attachment_metadata(attachment_id: impl fmt::Display) -> Self {
        Self::AttachmentMetadata {
            attachment_id: attachment_id.to_string(),
        }
    }

    /// The layer this key belongs to, if it is one of the domain keys.
    pub fn category(&self) -> Option<ResourceCategory> {
        match self {
            Self::Generic { .. } => None,
            Self::ConversationsList { .. } => Some(ResourceCategory::ConversationList),
            Self::ConversationDetail { .. } => Some(ResourceCategory::ConversationDetail),
            Self::ContactMetadata { .. } => Some(ResourceCategory::ContactMetadata),
            Self::AttachmentMetadata { .. } => Some(ResourceCategory::AttachmentMetadata),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generic {
                category,
                identifier,
            } => write!(f, "{category}:{identifier}"),
            Self::ConversationsList { clinic_id } => {
                write!(f, "clinic:{clinic_id}:conversations:list")
            }
            Self::ConversationDetail {
                conversation_id,
                page,
                limit,
            } => write!(
                f,
                "conversation:{conversation_id}:detail:page:{page}:limit:{limit}"
            ),
            Self::ContactMetadata { contact_id } => write!(f, "contact:{contact_id}:metadata"),
            Self::AttachmentMetadata { attachment_id } => {
                write!(f, "attachment:{attachment_id}:metadata")
            }
        }
    }
}

/// Glob covering every key of one clinic.
pub fn clinic_scope(clinic_id: impl fmt::Display) -> String {
    format!("clinic:{}:*", escape_glob(&clinic_id.to_string()))
}

/// Glob covering every page of one conversation.
pub fn conversation_scope(conversation_id: impl fmt::Display) -> String {
    format!(
        "conversation:{}:*",
        escape_glob(&conversation_id.to_string())
    )
}

/// Escape glob metacharacters so an identifier only matches itself.
pub fn escape_glob(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
