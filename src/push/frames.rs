//! Push channel frame encoding
//!
//! Frames are JSON objects discriminated by `metodo`. Field names and order
//! match what the vendor's web client sends.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::types::flag;
use crate::error::Result;

/// Event classes the push channel can be subscribed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    /// Chats assigned to the logged-in agent.
    ChatForAgent,
    /// Every chat in the account.
    AllChats,
    /// Device status changes of connections.
    ConnectionStatus,
}

impl EventClass {
    pub fn wire_name(&self) -> &'static str {
        match self {
            EventClass::ChatForAgent => "monitorarChat",
            EventClass::AllChats => "monitorarTodosChats",
            EventClass::ConnectionStatus => "monitorarStatusConexoes",
        }
    }
}

/// Which event classes to subscribe to after login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoredEvents {
    pub chat_for_agent: bool,
    pub all_chats: bool,
    pub connection_status: bool,
}

impl Default for MonitoredEvents {
    fn default() -> Self {
        Self {
            chat_for_agent: true,
            all_chats: false,
            connection_status: true,
        }
    }
}

impl MonitoredEvents {
    /// One subscribe or unsubscribe frame per event class.
    pub fn frames(&self) -> Vec<OutgoingFrame> {
        [
            (EventClass::ChatForAgent, self.chat_for_agent),
            (EventClass::AllChats, self.all_chats),
            (EventClass::ConnectionStatus, self.connection_status),
        ]
        .into_iter()
        .map(|(class, on)| {
            let evento = class.wire_name();
            if on {
                OutgoingFrame::Subscribe { evento }
            } else {
                OutgoingFrame::Unsubscribe { evento }
            }
        })
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "metodo")]
pub enum OutgoingFrame {
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "login")]
    Login { token: String },
    #[serde(rename = "adicionarEvento")]
    Subscribe { evento: &'static str },
    #[serde(rename = "removerEvento")]
    Unsubscribe { evento: &'static str },
}

impl OutgoingFrame {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A chat message pushed by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageFrame {
    pub id_mensagem: i64,
    /// Message timestamp as sent by the server.
    pub data: String,
    #[serde(default, deserialize_with = "flag")]
    pub flag_enviado: bool,
    pub id_whatsapp_conexao_fk: i64,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub id_departamento: Option<i64>,
    pub id_contato_fk: i64,
    #[serde(default)]
    pub tipo: Option<String>,
    #[serde(default)]
    pub id_chamado: Option<i64>,
}

#[derive(Debug, Clone)]
pub enum InboundFrame {
    LoginAck { authenticated: bool },
    /// Device status push; carries the connection uuid when present.
    ConnectionStatus { uuid: Option<String> },
    Message(Box<MessageFrame>),
    Other { method: Option<String> },
}

/// Classify one text frame from the server.
pub fn parse_inbound(text: &str) -> Result<InboundFrame> {
    let value: Value = serde_json::from_str(text)?;
    let method = value
        .get("metodo")
        .and_then(Value::as_str)
        .map(String::from);

    match method.as_deref() {
        Some("login") => {
            let authenticated = match value.get("autenticado") {
                Some(Value::Bool(b)) => *b,
                Some(Value::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
                _ => false,
            };
            Ok(InboundFrame::LoginAck { authenticated })
        }
        Some("statusConexao") => Ok(InboundFrame::ConnectionStatus {
            uuid: value.get("uuid").and_then(Value::as_str).map(String::from),
        }),
        _ if value.get("id_mensagem_whatsapp").is_some_and(|v| !v.is_null()) => {
            let frame: MessageFrame = serde_json::from_value(value)?;
            Ok(InboundFrame::Message(Box::new(frame)))
        }
        _ => Ok(InboundFrame::Other {
            method: method.clone(),
        }),
    }
}
