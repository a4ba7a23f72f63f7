//! Test fixtures: a seeded cache, a scripted `RemoteApi` and an in-memory
//! push transport.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::api::types::{
    MessageMedia, RawAgent, RawCall, RawConnection, RawContact, RawDepartment, SendMessageRequest,
};
use crate::api::{CallQuery, RemoteApi};
use crate::cache::EntityCache;
use crate::error::{Error, Result};
use crate::models::Call;
use crate::push::frames::MessageFrame;
use crate::push::{PushSocket, PushTransport};

pub fn raw_connections() -> Vec<RawConnection> {
    serde_json::from_value(serde_json::json!([
        {
            "id_whatsapp_conexao": 1,
            "conta_nome": "Loja Centro",
            "conta_numero": "5511900000000",
            "flag_ativo": 1,
            "uuid": "uuid-1",
            "status": { "nivelBateria": 80 }
        },
        {
            "id_whatsapp_conexao": 2,
            "conta_nome": "Loja Norte",
            "conta_numero": "5511900000009",
            "flag_ativo": 0,
            "uuid": "uuid-2",
            "status": { "desconectado": true }
        }
    ]))
    .unwrap()
}

/// 10 > 11 > 12 nested, plus a root 20.
pub fn raw_departments() -> Vec<RawDepartment> {
    serde_json::from_value(serde_json::json!([
        {
            "id_departamento": 10,
            "nome": "Comercial",
            "subDepartamentos": [{
                "id_departamento": 11,
                "nome": "Vendas",
                "subDepartamentos": [{ "id_departamento": 12, "nome": "Atacado" }]
            }]
        },
        { "id_departamento": 20, "nome": "Suporte", "flag_departamento_interno": 1 }
    ]))
    .unwrap()
}

pub fn raw_contacts() -> Vec<RawContact> {
    vec![
        raw_contact(100, "Carla", "5511900000001@c.us"),
        raw_contact(101, "Diego", "5511900000002@c.us"),
    ]
}

pub fn raw_contact(id: i64, name: &str, chat_id: &str) -> RawContact {
    RawContact {
        id_contato: id,
        nome: Some(name.to_string()),
        foto_perfil: None,
        id_whatsapp: Some(chat_id.to_string()),
    }
}

pub fn raw_agents() -> Vec<RawAgent> {
    vec![raw_agent(3, "Alice", "10,11"), raw_agent(4, "Bob", "12,404")]
}

pub fn raw_agent(id: i64, name: &str, departments: &str) -> RawAgent {
    RawAgent {
        id_usuario: id,
        email: format!("{}@example.com", name.to_lowercase()),
        flag_gestor: false,
        foto_perfil: None,
        nome: name.to_string(),
        id_departamento_fk: Some(departments.to_string()),
    }
}

/// Cache loaded with the fixtures above and no calls.
pub fn seeded_cache() -> EntityCache {
    let mut cache = EntityCache::new();
    cache.replace_connections(raw_connections());
    cache.replace_departments(raw_departments());
    cache.replace_contacts(raw_contacts());
    cache.replace_agents(raw_agents());
    cache
}

/// Call on connection 1, department 10, contact 100.
pub fn raw_call(id: i64, agent: Option<&str>, status: &str) -> RawCall {
    RawCall {
        id_chamado: id,
        nome_usuario: agent.map(String::from),
        id_whatsapp_conexao_fk: Some(1),
        id_departamento_fk: Some(10),
        id_whatsapp: Some("5511900000001@c.us".to_string()),
        data_abertura: Some("2024-03-01T09:00:00Z".to_string()),
        data_fechamento: None,
        flag_finalizado: status == "finalizado",
        status: Some(status.to_string()),
    }
}

pub fn call(cache: &EntityCache, id: i64, agent: Option<&str>, status: &str) -> Call {
    cache.resolve_call(&raw_call(id, agent, status)).unwrap()
}

/// Message frame on connection 1, department 10.
pub fn message_frame(id: i64, contact_id: i64, call_id: Option<i64>) -> MessageFrame {
    MessageFrame {
        id_mensagem: id,
        data: "2024-03-01T10:00:00Z".to_string(),
        flag_enviado: false,
        id_whatsapp_conexao_fk: 1,
        body: Some("olá".to_string()),
        id_departamento: Some(10),
        id_contato_fk: contact_id,
        tipo: Some("chat".to_string()),
        id_chamado: call_id,
    }
}

pub fn message_frame_json(id: i64, contact_id: i64, call_id: i64) -> String {
    serde_json::json!({
        "id_mensagem_whatsapp": format!("WA{}", id),
        "id_mensagem": id,
        "data": "2024-03-01T10:00:00Z",
        "flag_enviado": 0,
        "id_whatsapp_conexao_fk": 1,
        "body": "olá",
        "id_departamento": 10,
        "id_contato_fk": contact_id,
        "tipo": "chat",
        "id_chamado": call_id
    })
    .to_string()
}

/// Scripted remote. Serves the fixtures, plus contact 102 which only
/// exists remotely, and records every action.
pub struct FakeApi {
    calls: Mutex<Vec<RawCall>>,
    call_error: Mutex<Option<String>>,
    fetch_delay: Option<Duration>,
    pub call_fetches: AtomicUsize,
    pub contact_fetches: AtomicUsize,
    pub sent: Mutex<Vec<SendMessageRequest>>,
    pub actions: Mutex<Vec<String>>,
}

impl Default for FakeApi {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            call_error: Mutex::new(None),
            fetch_delay: None,
            call_fetches: AtomicUsize::new(0),
            contact_fetches: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            actions: Mutex::new(Vec::new()),
        }
    }
}

impl FakeApi {
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    pub fn set_calls(&self, calls: Vec<RawCall>) {
        *self.calls.lock().unwrap() = calls;
    }

    pub fn fail_call_fetches(&self, message: &str) {
        *self.call_error.lock().unwrap() = Some(message.to_string());
    }

    fn record(&self, action: String) {
        self.actions.lock().unwrap().push(action);
    }
}

#[async_trait]
impl RemoteApi for FakeApi {
    async fn fetch_departments(&self) -> Result<Vec<RawDepartment>> {
        Ok(raw_departments())
    }

    async fn fetch_contacts(&self) -> Result<Vec<RawContact>> {
        Ok(raw_contacts())
    }

    async fn fetch_agents(&self) -> Result<Vec<RawAgent>> {
        Ok(raw_agents())
    }

    async fn fetch_connections(&self) -> Result<Vec<RawConnection>> {
        Ok(raw_connections())
    }

    async fn fetch_contact(&self, contact_id: i64) -> Result<RawContact> {
        self.contact_fetches.fetch_add(1, Ordering::SeqCst);
        match contact_id {
            102 => Ok(raw_contact(102, "Elisa", "5511900000003@c.us")),
            _ => Err(Error::RemoteRejection("Contato não encontrado".into())),
        }
    }

    async fn fetch_calls(
        &self,
        query: CallQuery,
        _timeout: Option<Duration>,
    ) -> Result<Vec<RawCall>> {
        self.call_fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        let error = self.call_error.lock().unwrap().clone();
        if let Some(message) = error {
            return Err(Error::RemoteRejection(message));
        }
        let calls = self.calls.lock().unwrap().clone();
        Ok(match query {
            CallQuery::ById(id) => calls.into_iter().filter(|c| c.id_chamado == id).collect(),
            CallQuery::Range { .. } => calls,
        })
    }

    async fn fetch_media(&self, message_id: i64) -> Result<MessageMedia> {
        Ok(MessageMedia {
            bytes: message_id.to_be_bytes().to_vec(),
            content_type: "application/octet-stream".into(),
        })
    }

    async fn send_message(&self, request: &SendMessageRequest) -> Result<()> {
        self.sent.lock().unwrap().push(request.clone());
        Ok(())
    }

    async fn transfer_call(
        &self,
        call_id: i64,
        department_id: i64,
        agent_id: Option<i64>,
    ) -> Result<()> {
        self.record(format!("transfer {} {} {:?}", call_id, department_id, agent_id));
        Ok(())
    }

    async fn close_call(&self, call_id: i64, silent: bool) -> Result<()> {
        self.record(format!("close {} {}", call_id, silent));
        Ok(())
    }

    async fn fetch_contact_info(&self, phone: &str) -> Result<serde_json::Value> {
        Ok(serde_json::json!({ "numero": phone }))
    }

    async fn register_contact_name(&self, phone: &str, name: &str) -> Result<()> {
        self.record(format!("register {} {}", phone, name));
        Ok(())
    }
}

/// Server side of one fake push connection.
pub struct FakeServer {
    to_client: mpsc::UnboundedSender<String>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl FakeServer {
    pub fn push(&self, frame: &str) {
        let _ = self.to_client.send(frame.to_string());
    }

    /// Frames the client sent on this connection.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn pings(&self) -> usize {
        self.sent().iter().filter(|f| f.contains(r#""metodo":"ping""#)).count()
    }

    /// Close the connection from the server side, keeping its frame log.
    pub fn close(self) -> Arc<Mutex<Vec<String>>> {
        self.sent
    }
}

struct FakeSocket {
    from_server: mpsc::UnboundedReceiver<String>,
    sent: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl PushSocket for FakeSocket {
    async fn send_text(&mut self, msg: &str) -> Result<()> {
        self.sent.lock().unwrap().push(msg.to_string());
        Ok(())
    }

    async fn recv_frame(&mut self) -> Result<Option<String>> {
        Ok(self.from_server.recv().await)
    }
}

/// Transport handing each new connection's server half to the test.
pub struct FakeTransport {
    pub connects: AtomicUsize,
    servers: mpsc::UnboundedSender<FakeServer>,
}

impl FakeTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<FakeServer>) {
        let (servers, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            connects: AtomicUsize::new(0),
            servers,
        });
        (transport, rx)
    }
}

#[async_trait]
impl PushTransport for FakeTransport {
    async fn connect(&self, _url: &str) -> Result<Box<dyn PushSocket>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let (to_client, from_server) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let _ = self.servers.send(FakeServer {
            to_client,
            sent: Arc::clone(&sent),
        });
        Ok(Box::new(FakeSocket { from_server, sent }))
    }
}
