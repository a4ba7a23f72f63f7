//! Contacts (the customer side of a chat)

use crate::api::types::RawContact;

#[derive(Debug, Clone, PartialEq)]
pub struct Contact {
    pub id: i64,
    pub name: String,
    pub profile_picture: Option<String>,
    /// External chat identifier, e.g. `5511999990000@c.us`.
    pub chat_id: Option<String>,
}

impl From<RawContact> for Contact {
    fn from(raw: RawContact) -> Self {
        Self {
            id: raw.id_contato,
            name: raw.nome.unwrap_or_default(),
            profile_picture: raw.foto_perfil,
            chat_id: raw.id_whatsapp,
        }
    }
}
