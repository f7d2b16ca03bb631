//! Typed read/write helpers for the messaging resources.
//!
//! Each helper builds the key from [`CacheKey`] and routes through
//! `smart_get`/`smart_set`, so TTLs follow the resource's layer.

use std::fmt::Display;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::key::{CacheKey, clinic_scope, conversation_scope};
use crate::layer::ResourceCategory;
use crate::service::CacheService;

impl CacheService {
    pub async fn get_conversations_list<T: DeserializeOwned>(
        &self,
        clinic_id: impl Display,
    ) -> Option<T> {
        let key = CacheKey::conversations_list(clinic_id).to_string();
        self.smart_get(&key, ResourceCategory::ConversationList).await
    }

    pub async fn set_conversations_list<T: Serialize + ?Sized>(
        &self,
        clinic_id: impl Display,
        conversations: &T,
    ) {
        let key = CacheKey::conversations_list(clinic_id).to_string();
        self.smart_set(&key, conversations, ResourceCategory::ConversationList)
            .await;
    }

    pub async fn get_conversation_detail<T: DeserializeOwned>(
        &self,
        conversation_id: impl Display,
        page: u32,
        limit: u32,
    ) -> Option<T> {
        let key = CacheKey::conversation_detail(conversation_id, page, limit).to_string();
        self.smart_get(&key, ResourceCategory::ConversationDetail)
            .await
    }

    pub async fn set_conversation_detail<T: Serialize + ?Sized>(
        &self,
        conversation_id: impl Display,
        page: u32,
        limit: u32,
        detail: &T,
    ) {
        let key = CacheKey::conversation_detail(conversation_id, page, limit).to_string();
        self.smart_set(&key, detail, ResourceCategory::ConversationDetail)
            .await;
    }

    pub async fn get_contact_metadata<T: DeserializeOwned>(
        &self,
        contact_id: impl Display,
    ) -> Option<T> {
        let key = CacheKey::contact_metadata(contact_id).to_string();
        self.smart_get(&key, ResourceCategory::ContactMetadata).await
    }

    pub async fn set_contact_metadata<T: Serialize + ?Sized>(
        &self,
        contact_id: impl Display,
        metadata: &T,
    ) {
        let key = CacheKey::contact_metadata(contact_id).to_string();
        self.smart_set(&key, metadata, ResourceCategory::ContactMetadata)
            .await;
    }

    pub async fn get_attachment_metadata<T: DeserializeOwned>(
        &self,
        attachment_id: impl Display,
    ) -> Option<T> {
        let key = CacheKey::attachment_metadata(attachment_id).to_string();
        self.smart_get(&key, ResourceCategory::AttachmentMetadata)
            .await
    }

    pub async fn set_attachment_metadata<T: Serialize + ?Sized>(
        &self,
        attachment_id: impl Display,
        metadata: &T,
    ) {
        let key = CacheKey::attachment_metadata(attachment_id).to_string();
        self.smart_set(&key, metadata, ResourceCategory::AttachmentMetadata)
            .await;
    }

    /// Drop the clinic's conversation list after a conversation changes.
    pub async fn invalidate_clinic_conversations(&self, clinic_id: impl Display) {
        let key = CacheKey::conversations_list(clinic_id).to_string();
        self.invalidate(&key, Some(ResourceCategory::ConversationList))
            .await;
    }

    /// Drop every cached page of one conversation.
    pub async fn invalidate_conversation(&self, conversation_id: impl Display) -> usize {
        self.invalidate_pattern(&conversation_scope(conversation_id))
            .await
    }

    /// Drop everything cached for one clinic.
    pub async fn invalidate_clinic(&self, clinic_id: impl Display) -> usize {
        self.invalidate_pattern(&clinic_scope(clinic_id)).await
    }
}
