//! Turns pushed message frames into resolved `Message`s

use std::sync::Arc;

use chrono::Utc;

use crate::api::RemoteApi;
use crate::cache::SharedCache;
use crate::error::{Error, Result};
use crate::models::{parse_timestamp, Contact, Message};
use crate::push::frames::MessageFrame;
use crate::reconcile::lookup_call;

pub struct Normalizer {
    cache: SharedCache,
    api: Arc<dyn RemoteApi>,
}

impl Normalizer {
    pub fn new(cache: SharedCache, api: Arc<dyn RemoteApi>) -> Self {
        Self { cache, api }
    }

    /// Resolve every reference of `frame`.
    ///
    /// Connection and department come from the cache only. A missing contact
    /// is fetched and cached. The call is looked up in the cache, then
    /// remotely. Fails unless all four resolve.
    pub async fn normalize(&self, frame: MessageFrame) -> Result<Message> {
        let (connection, department, cached_contact) = {
            let cache = self.cache.lock().await;
            (
                cache.connection(frame.id_whatsapp_conexao_fk),
                frame.id_departamento.and_then(|id| cache.department(id)),
                cache.contact(frame.id_contato_fk),
            )
        };

        let contact = match cached_contact {
            Some(contact) => Some(contact),
            None => self.fetch_contact(frame.id_contato_fk).await,
        };

        let call = match frame.id_chamado {
            Some(call_id) => match lookup_call(&self.cache, self.api.as_ref(), call_id).await {
                Ok(call) => Some(call),
                Err(e) => {
                    tracing::warn!("Call {} lookup failed: {}", call_id, e);
                    None
                }
            },
            None => None,
        };

        let connection = connection
            .ok_or_else(|| Error::unresolved("connection", frame.id_whatsapp_conexao_fk))?;
        let department = department.ok_or_else(|| {
            Error::unresolved(
                "department",
                frame.id_departamento.map_or("none".to_string(), |id| id.to_string()),
            )
        })?;
        let contact = contact.ok_or_else(|| Error::unresolved("contact", frame.id_contato_fk))?;
        let call = call.ok_or_else(|| {
            Error::unresolved(
                "call",
                frame.id_chamado.map_or("none".to_string(), |id| id.to_string()),
            )
        })?;

        let sent_at = parse_timestamp(&frame.data).unwrap_or_else(|| {
            tracing::warn!(
                "Message {} has unreadable timestamp {:?}, using now",
                frame.id_mensagem,
                frame.data
            );
            Utc::now()
        });

        Ok(Message {
            id: frame.id_mensagem,
            sent_at,
            sent: frame.flag_enviado,
            chat_type: frame.tipo.unwrap_or_default(),
            body: frame.body,
            connection,
            department,
            contact,
            call,
        })
    }

    /// Fetch a contact the cache does not know yet and insert it.
    async fn fetch_contact(&self, contact_id: i64) -> Option<Arc<Contact>> {
        tracing::debug!("Contact {} not cached, fetching", contact_id);
        match self.api.fetch_contact(contact_id).await {
            Ok(raw) => {
                let contact = Contact::from(raw);
                Some(self.cache.lock().await.insert_contact(contact))
            }
            Err(e) => {
                tracing::warn!("Could not fetch contact {}: {}", contact_id, e);
                None
            }
        }
    }
}
