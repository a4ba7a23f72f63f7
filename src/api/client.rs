//! Authenticated HTTP client for the Macrochat API
//!
//! Wraps reqwest::Client with token injection and `{ ok, mensagem_usuario }`
//! envelope checking.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::types::{
    MessageMedia, RawAgent, RawCall, RawConnection, RawContact, RawDepartment, SendMessageRequest,
};
use super::{CallQuery, RemoteApi};
use crate::error::{Error, Result};
use crate::models::format_timestamp;

pub const DEFAULT_BASE_URL: &str = "https://api.macrochat.com.br/v1";

/// Client bound to one API base URL and, after login, one session token.
#[derive(Debug, Clone)]
pub struct MacrochatClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl MacrochatClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Attach the session credential used by every subsequent request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn token(&self) -> Result<&str> {
        self.token.as_deref().ok_or(Error::NotLoggedIn)
    }

    /// Exchange account credentials for a session token.
    pub async fn login(&self, email: &str, password: &str) -> Result<String> {
        let url = format!("{}/login/login", self.base_url);
        tracing::debug!("POST {}", url);

        let body = serde_json::json!({ "email": email, "senha": password });
        let resp = self.http.post(&url).json(&body).send().await.map_err(http_err)?;
        let mut value = read_envelope(resp).await?;
        field(&mut value, "token")
    }

    /// GET with the token as a query parameter.
    async fn get(
        &self,
        path: &str,
        params: &[(&str, String)],
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let token = self.token()?;
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("GET {}", url);

        let mut req = self.http.get(&url).query(&[("token", token)]).query(params);
        if let Some(timeout) = timeout {
            req = req.timeout(timeout);
        }
        let resp = req.send().await.map_err(http_err)?;
        read_envelope(resp).await
    }

    /// POST with the token merged into the JSON body.
    async fn post(&self, path: &str, mut body: Value) -> Result<Value> {
        let token = self.token()?;
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("POST {}", url);

        if let Value::Object(ref mut map) = body {
            map.entry("token")
                .or_insert_with(|| Value::String(token.to_string()));
        }
        let resp = self.http.post(&url).json(&body).send().await.map_err(http_err)?;
        read_envelope(resp).await
    }
}

#[async_trait]
impl RemoteApi for MacrochatClient {
    async fn fetch_departments(&self) -> Result<Vec<RawDepartment>> {
        let mut value = self.get("/departamento/getDepartamentos", &[], None).await?;
        field_list(&mut value, "departamentos")
    }

    async fn fetch_contacts(&self) -> Result<Vec<RawContact>> {
        let mut value = self.get("/contato/getContatos", &[], None).await?;
        field_list(&mut value, "contatos")
    }

    async fn fetch_agents(&self) -> Result<Vec<RawAgent>> {
        let mut value = self.get("/usuario/getUsuarios", &[], None).await?;
        field_list(&mut value, "usuarios")
    }

    async fn fetch_connections(&self) -> Result<Vec<RawConnection>> {
        let mut value = self.get("/whatsapp_api/getConexoes", &[], None).await?;
        field_list(&mut value, "whatsapp_conexao")
    }

    async fn fetch_contact(&self, contact_id: i64) -> Result<RawContact> {
        let params = [("id_contato", contact_id.to_string())];
        let mut value = self.get("/contato/getContato", &params, None).await?;
        field(&mut value, "contato")
    }

    async fn fetch_calls(
        &self,
        query: CallQuery,
        timeout: Option<Duration>,
    ) -> Result<Vec<RawCall>> {
        let params = match query {
            CallQuery::ById(id) => vec![("id_chamado", id.to_string())],
            CallQuery::Range { from, to } => vec![
                ("data_inicio", format_timestamp(from)),
                ("data_fim", format_timestamp(to)),
            ],
        };
        let mut value = self.get("/chamado/getChamados", &params, timeout).await?;
        field_list(&mut value, "chamados")
    }

    async fn fetch_media(&self, message_id: i64) -> Result<MessageMedia> {
        let token = self.token()?;
        let url = format!("{}/chat/getMediaFromMessageID", self.base_url);
        tracing::debug!("GET {} (id_mensagem={})", url, message_id);

        let resp = self
            .http
            .get(&url)
            .query(&[("token", token.to_string()), ("id_mensagem", message_id.to_string())])
            .send()
            .await
            .map_err(http_err)?;

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        // A JSON body here is an error envelope, not media.
        if content_type.starts_with("application/json") {
            read_envelope(resp).await?;
            return Err(Error::RemoteRejection(format!(
                "no media for message {}",
                message_id
            )));
        }

        let resp = resp.error_for_status().map_err(http_err)?;
        let bytes = resp.bytes().await.map_err(http_err)?;
        Ok(MessageMedia {
            bytes: bytes.to_vec(),
            content_type,
        })
    }

    async fn send_message(&self, request: &SendMessageRequest) -> Result<()> {
        self.token()?;
        let url = format!("{}/whatsapp_api/enviarMensagem", self.base_url);
        tracing::debug!("POST {}", url);

        // The token field doubles as the show-agent-name switch, so the
        // request is posted as built instead of through `post`.
        let resp = self.http.post(&url).json(request).send().await.map_err(http_err)?;
        read_envelope(resp).await.map(|_| ())
    }

    async fn transfer_call(
        &self,
        call_id: i64,
        department_id: i64,
        agent_id: Option<i64>,
    ) -> Result<()> {
        let mut body = serde_json::json!({
            "id_chamado": call_id,
            "id_departamento": department_id,
        });
        if let Some(agent_id) = agent_id {
            body["id_usuario"] = agent_id.into();
        }
        self.post("/chamado/transferirAtendimento", body).await.map(|_| ())
    }

    async fn close_call(&self, call_id: i64, silent: bool) -> Result<()> {
        let body = serde_json::json!({
            "id_chamado": call_id,
            "flag_silencioso": silent,
        });
        self.post("/chamado/finalizarChamado", body).await.map(|_| ())
    }

    async fn fetch_contact_info(&self, phone: &str) -> Result<Value> {
        let params = [("numero", phone.to_string())];
        let mut value = self.get("/contato/getInfoContato", &params, None).await?;
        field(&mut value, "contato")
    }

    async fn register_contact_name(&self, phone: &str, name: &str) -> Result<()> {
        let body = serde_json::json!({ "numero": phone, "nome": name });
        self.post("/contato/cadastrarContato", body).await.map(|_| ())
    }
}

fn http_err(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout
    } else {
        Error::Http(e)
    }
}

/// Read a response body and check the `ok` flag of its envelope.
async fn read_envelope(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    let text = resp.text().await.map_err(http_err)?;

    match serde_json::from_str::<Value>(&text) {
        Ok(value) => check_envelope(value),
        Err(_) if !status.is_success() => Err(Error::RemoteRejection(format!(
            "HTTP {}: {}",
            status.as_u16(),
            text
        ))),
        Err(e) => Err(Error::Decode(e)),
    }
}

fn check_envelope(value: Value) -> Result<Value> {
    let ok = match value.get("ok") {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64() != Some(0),
        _ => false,
    };
    if ok {
        return Ok(value);
    }
    let message = value
        .get("mensagem_usuario")
        .and_then(|m| m.as_str())
        .unwrap_or("request rejected")
        .to_string();
    Err(Error::RemoteRejection(message))
}

/// Move `key` out of an envelope and deserialize it.
fn field<T: DeserializeOwned>(value: &mut Value, key: &str) -> Result<T> {
    let raw = value.get_mut(key).map(Value::take).unwrap_or(Value::Null);
    Ok(serde_json::from_value(raw)?)
}

/// Decode a list field element by element. Records that do not decode are
/// logged and left out; the list itself must still be an array.
fn field_list<T: DeserializeOwned>(value: &mut Value, key: &str) -> Result<Vec<T>> {
    let items: Vec<Value> = field(value, key)?;
    Ok(items
        .into_iter()
        .enumerate()
        .filter_map(|(i, item)| match serde_json::from_value(item) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Skipping malformed {} entry {}: {}", key, i, e);
                None
            }
        })
        .collect())
}
