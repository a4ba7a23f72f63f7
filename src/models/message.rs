//! Inbound chat messages

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{Call, Connection, Contact, Department};

/// A fully resolved chat message.
///
/// Entity fields are snapshots of the cache at normalization time. Media is
/// fetched separately by message id (`SyncEngine::fetch_media`).
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: i64,
    pub sent_at: DateTime<Utc>,
    /// True when the message was sent from our side.
    pub sent: bool,
    pub chat_type: String,
    pub body: Option<String>,
    pub connection: Arc<Connection>,
    pub department: Arc<Department>,
    pub contact: Arc<Contact>,
    pub call: Arc<Call>,
}
