//! Wire records returned by the Macrochat REST API
//!
//! Field names follow the vendor's payloads verbatim. Conversion into domain
//! entities happens in `crate::models`.

use serde::de;
use serde::{Deserialize, Serialize};

/// Accept `true`/`false`, `0`/`1`, `"0"`/`"1"` or `null` as a boolean flag.
pub(crate) fn flag<'de, D: de::Deserializer<'de>>(d: D) -> std::result::Result<bool, D::Error> {
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = bool;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("bool, 0/1 or stringified flag")
        }
        fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<bool, E> {
            Ok(v)
        }
        fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<bool, E> {
            Ok(v != 0)
        }
        fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<bool, E> {
            Ok(v != 0)
        }
        fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<bool, E> {
            Ok(v != 0.0)
        }
        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<bool, E> {
            Ok(!matches!(v.trim(), "" | "0" | "false"))
        }
        fn visit_none<E: de::Error>(self) -> std::result::Result<bool, E> {
            Ok(false)
        }
        fn visit_unit<E: de::Error>(self) -> std::result::Result<bool, E> {
            Ok(false)
        }
    }
    d.deserialize_any(Visitor)
}

/// Accept a string or a bare number, yielding its textual form.
fn string_or_number<'de, D: de::Deserializer<'de>>(
    d: D,
) -> std::result::Result<Option<String>, D::Error> {
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<String>;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("string or number")
        }
        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }
        fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }
        fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }
        fn visit_none<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
            Ok(None)
        }
        fn visit_unit<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
            Ok(None)
        }
    }
    d.deserialize_any(Visitor)
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawDepartment {
    pub id_departamento: i64,
    pub nome: String,
    #[serde(default, deserialize_with = "flag")]
    pub flag_departamento_interno: bool,
    #[serde(default, rename = "subDepartamentos")]
    pub sub_departamentos: Option<Vec<RawDepartment>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawContact {
    pub id_contato: i64,
    #[serde(default)]
    pub nome: Option<String>,
    #[serde(default)]
    pub foto_perfil: Option<String>,
    #[serde(default)]
    pub id_whatsapp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAgent {
    pub id_usuario: i64,
    #[serde(default)]
    pub email: String,
    #[serde(default, deserialize_with = "flag")]
    pub flag_gestor: bool,
    #[serde(default)]
    pub foto_perfil: Option<String>,
    pub nome: String,
    /// Comma-delimited department identifiers, e.g. `"1,4,9"`.
    #[serde(default, deserialize_with = "string_or_number")]
    pub id_departamento_fk: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDeviceStatus {
    #[serde(default, deserialize_with = "flag")]
    pub carregando: bool,
    #[serde(default, deserialize_with = "flag")]
    pub celular_desconectado_internet: bool,
    #[serde(default, deserialize_with = "flag")]
    pub desconectado: bool,
    #[serde(default)]
    pub nivel_bateria: Option<f64>,
    #[serde(default, deserialize_with = "flag")]
    pub outra_aba: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawConnection {
    pub id_whatsapp_conexao: i64,
    #[serde(default)]
    pub conta_marca_celular: Option<String>,
    #[serde(default)]
    pub conta_nome: Option<String>,
    #[serde(default)]
    pub conta_numero: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    pub flag_ativo: bool,
    pub uuid: String,
    #[serde(default)]
    pub status: RawDeviceStatus,
}

/// A call ("chamado") as returned by `/chamado/getChamados`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawCall {
    pub id_chamado: i64,
    /// Assigned agent, referenced by display name.
    #[serde(default)]
    pub nome_usuario: Option<String>,
    #[serde(default)]
    pub id_whatsapp_conexao_fk: Option<i64>,
    #[serde(default)]
    pub id_departamento_fk: Option<i64>,
    /// Contact, referenced by external chat identifier.
    #[serde(default)]
    pub id_whatsapp: Option<String>,
    #[serde(default)]
    pub data_abertura: Option<String>,
    #[serde(default)]
    pub data_fechamento: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    pub flag_finalizado: bool,
    #[serde(default)]
    pub status: Option<String>,
}

/// Attachment carried by an outgoing chat message.
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingFile {
    #[serde(rename = "nome")]
    pub name: String,
    /// Base64 content as expected by the remote.
    #[serde(rename = "arquivo")]
    pub content: String,
}

/// Body of `/whatsapp_api/enviarMensagem`.
#[derive(Debug, Clone, Serialize)]
pub struct SendMessageRequest {
    #[serde(rename = "numero")]
    pub number: String,
    pub uuid: String,
    #[serde(rename = "texto")]
    pub text: String,
    #[serde(rename = "chatID", skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(rename = "arquivo", skip_serializing_if = "Option::is_none")]
    pub file: Option<OutgoingFile>,
    /// Session token; when present the remote prefixes the agent's name.
    #[serde(rename = "token", skip_serializing_if = "Option::is_none")]
    pub name_token: Option<String>,
    #[serde(rename = "id_departamento", skip_serializing_if = "Option::is_none")]
    pub department_id: Option<i64>,
    #[serde(rename = "id_contato", skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<i64>,
}

/// Media attached to a chat message.
#[derive(Debug, Clone)]
pub struct MessageMedia {
    pub bytes: Vec<u8>,
    pub content_type: String,
}
