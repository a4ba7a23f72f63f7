//! In-memory mirror of remote entities
//!
//! The cache owns the canonical copy of every entity. Consumers receive
//! `Arc` snapshots; entries are only ever replaced wholesale.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::api::types::{RawAgent, RawCall, RawConnection, RawContact, RawDepartment};
use crate::error::{Error, Result};
use crate::models::{parse_timestamp, Agent, Call, CallStatus, Connection, Contact, Department};

/// Cache handle shared by the push handler and the reconciliation monitor.
/// Every access goes through the mutex, one writer at a time.
pub type SharedCache = Arc<Mutex<EntityCache>>;

#[derive(Debug, Default)]
pub struct EntityCache {
    connections: HashMap<i64, Arc<Connection>>,
    /// Every department node at every depth, by id.
    departments: HashMap<i64, Arc<Department>>,
    contacts: HashMap<i64, Arc<Contact>>,
    agents: HashMap<i64, Arc<Agent>>,
    calls: HashMap<i64, Arc<Call>>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedCache {
        Arc::new(Mutex::new(self))
    }

    // -- bulk replace (full reload) --

    pub fn replace_connections(&mut self, raw: Vec<RawConnection>) {
        self.connections = raw
            .into_iter()
            .map(|r| {
                let conn = Connection::from(r);
                (conn.id, Arc::new(conn))
            })
            .collect();
    }

    /// Index every node of the delivered department tree by id.
    pub fn replace_departments(&mut self, raw: Vec<RawDepartment>) {
        let tree: Vec<Department> = raw.into_iter().map(Department::from_raw).collect();
        self.departments = Department::flatten(&tree)
            .into_iter()
            .map(|d| (d.id, Arc::new(d.clone())))
            .collect();
    }

    pub fn replace_contacts(&mut self, raw: Vec<RawContact>) {
        self.contacts = raw
            .into_iter()
            .map(|r| {
                let contact = Contact::from(r);
                (contact.id, Arc::new(contact))
            })
            .collect();
    }

    /// Replace agents. Departments must already be loaded.
    pub fn replace_agents(&mut self, raw: Vec<RawAgent>) {
        let agents = raw
            .into_iter()
            .map(|r| {
                let agent = Agent::from_raw(r, |id| self.departments.get(&id).cloned());
                (agent.id, Arc::new(agent))
            })
            .collect();
        self.agents = agents;
    }

    pub fn replace_calls(&mut self, calls: Vec<Call>) {
        self.calls = calls.into_iter().map(|c| (c.id, Arc::new(c))).collect();
    }

    // -- single-entry writes --

    pub fn insert_contact(&mut self, contact: Contact) -> Arc<Contact> {
        let contact = Arc::new(contact);
        self.contacts.insert(contact.id, Arc::clone(&contact));
        contact
    }

    /// Insert or replace one call, returning the previous entry.
    pub fn upsert_call(&mut self, call: Arc<Call>) -> Option<Arc<Call>> {
        self.calls.insert(call.id, call)
    }

    // -- lookups --

    pub fn connection(&self, id: i64) -> Option<Arc<Connection>> {
        self.connections.get(&id).cloned()
    }

    pub fn department(&self, id: i64) -> Option<Arc<Department>> {
        self.departments.get(&id).cloned()
    }

    pub fn contact(&self, id: i64) -> Option<Arc<Contact>> {
        self.contacts.get(&id).cloned()
    }

    pub fn call(&self, id: i64) -> Option<Arc<Call>> {
        self.calls.get(&id).cloned()
    }

    /// Agent by display name. Duplicate names resolve to the lowest id.
    pub fn agent_by_name(&self, name: &str) -> Option<Arc<Agent>> {
        self.agents
            .values()
            .filter(|a| a.name == name)
            .min_by_key(|a| a.id)
            .cloned()
    }

    /// Contact by external chat identifier. Duplicates resolve to the lowest id.
    pub fn contact_by_chat_id(&self, chat_id: &str) -> Option<Arc<Contact>> {
        self.contacts
            .values()
            .filter(|c| c.chat_id.as_deref() == Some(chat_id))
            .min_by_key(|c| c.id)
            .cloned()
    }

    // -- snapshots --

    pub fn connections(&self) -> Vec<Arc<Connection>> {
        sorted(self.connections.values(), |c| c.id)
    }

    pub fn departments(&self) -> Vec<Arc<Department>> {
        sorted(self.departments.values(), |d| d.id)
    }

    pub fn contacts(&self) -> Vec<Arc<Contact>> {
        sorted(self.contacts.values(), |c| c.id)
    }

    pub fn agents(&self) -> Vec<Arc<Agent>> {
        sorted(self.agents.values(), |a| a.id)
    }

    pub fn calls(&self) -> Vec<Arc<Call>> {
        sorted(self.calls.values(), |c| c.id)
    }

    /// First active connection in id order, the default route for sending.
    pub fn first_active_connection(&self) -> Option<Arc<Connection>> {
        self.connections().into_iter().find(|c| c.active)
    }

    /// Resolve a wire call against the cache.
    ///
    /// Connection and department match by id, the agent by name and the
    /// contact by external chat id. Missing connection or contact makes the
    /// call invalid; missing agent or department leaves the field empty.
    pub fn resolve_call(&self, raw: &RawCall) -> Result<Call> {
        let connection = raw
            .id_whatsapp_conexao_fk
            .and_then(|id| self.connection(id))
            .ok_or_else(|| Error::unresolved("connection", describe(&raw.id_whatsapp_conexao_fk)))?;
        let contact = raw
            .id_whatsapp
            .as_deref()
            .and_then(|chat_id| self.contact_by_chat_id(chat_id))
            .ok_or_else(|| Error::unresolved("contact", describe(&raw.id_whatsapp)))?;
        let status = raw
            .status
            .as_deref()
            .and_then(CallStatus::from_wire)
            .ok_or_else(|| Error::unresolved("call status", describe(&raw.status)))?;
        let started_at = raw
            .data_abertura
            .as_deref()
            .and_then(parse_timestamp)
            .ok_or_else(|| Error::unresolved("call start", describe(&raw.data_abertura)))?;

        Ok(Call {
            id: raw.id_chamado,
            agent: raw
                .nome_usuario
                .as_deref()
                .and_then(|name| self.agent_by_name(name)),
            connection,
            department: raw.id_departamento_fk.and_then(|id| self.department(id)),
            contact,
            started_at,
            ended_at: raw.data_fechamento.as_deref().and_then(parse_timestamp),
            finished: raw.flag_finalizado,
            status,
        })
    }
}

/// Reference value for error messages; absent references print as `none`.
fn describe<T: std::fmt::Display>(value: &Option<T>) -> String {
    value.as_ref().map_or_else(|| "none".to_string(), T::to_string)
}

fn sorted<'a, T: 'a>(
    items: impl Iterator<Item = &'a Arc<T>>,
    key: impl Fn(&T) -> i64,
) -> Vec<Arc<T>> {
    let mut out: Vec<Arc<T>> = items.cloned().collect();
    out.sort_by_key(|item| key(item.as_ref()));
    out
}
