//! Outbound request layer for the Macrochat REST API
//!
//! `RemoteApi` is the seam the sync engine talks through; `MacrochatClient`
//! is the HTTP implementation.

pub mod client;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use types::{
    MessageMedia, RawAgent, RawCall, RawConnection, RawContact, RawDepartment, SendMessageRequest,
};

pub use client::MacrochatClient;

/// Selector for `/chamado/getChamados`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallQuery {
    /// A single call by id.
    ById(i64),
    /// Calls modified inside the window.
    Range {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
}

/// Requests the sync engine issues against the remote authority.
///
/// Every call carries the session credential. A response with `ok=false`
/// surfaces as `Error::RemoteRejection`.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Department tree (nested).
    async fn fetch_departments(&self) -> Result<Vec<RawDepartment>>;

    async fn fetch_contacts(&self) -> Result<Vec<RawContact>>;

    async fn fetch_agents(&self) -> Result<Vec<RawAgent>>;

    async fn fetch_connections(&self) -> Result<Vec<RawConnection>>;

    async fn fetch_contact(&self, contact_id: i64) -> Result<RawContact>;

    /// Calls by id or date range. `timeout` overrides the client default.
    async fn fetch_calls(&self, query: CallQuery, timeout: Option<Duration>)
        -> Result<Vec<RawCall>>;

    /// Media attached to a message.
    async fn fetch_media(&self, message_id: i64) -> Result<MessageMedia>;

    async fn send_message(&self, request: &SendMessageRequest) -> Result<()>;

    async fn transfer_call(
        &self,
        call_id: i64,
        department_id: i64,
        agent_id: Option<i64>,
    ) -> Result<()>;

    async fn close_call(&self, call_id: i64, silent: bool) -> Result<()>;

    /// Raw contact info as the remote returns it for a phone number.
    async fn fetch_contact_info(&self, phone: &str) -> Result<serde_json::Value>;

    async fn register_contact_name(&self, phone: &str, name: &str) -> Result<()>;
}
