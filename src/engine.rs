//! Synchronization engine façade
//!
//! Owns the entity cache and the event stream, performs full reloads, runs
//! the push and reconciliation tasks, and exposes the outbound actions.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::types::{MessageMedia, OutgoingFile, SendMessageRequest};
use crate::api::{CallQuery, RemoteApi};
use crate::cache::{EntityCache, SharedCache};
use crate::error::{Error, Result};
use crate::events::{EventEmitter, SyncEvent};
use crate::models::Call;
use crate::normalize::Normalizer;
use crate::push::frames::MonitoredEvents;
use crate::push::{ConnectionManager, ConnectionState, PushSettings, PushTransport};
use crate::reconcile::{self, ReconciliationMonitor};

/// Bare group-chat suffix; a recipient equal to it names no chat and is not sent.
const GROUP_SUFFIX: &str = "@g.us";

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Push server URL, `wss://host:port`.
    pub push_url: String,
    /// Session credential from account login.
    pub token: String,
    pub monitored_events: MonitoredEvents,
    pub reconcile_interval: Duration,
    /// Let the remote prefix outgoing texts with the agent's name.
    pub show_agent_name: bool,
}

/// Outgoing chat message.
#[derive(Debug, Clone, Default)]
pub struct OutgoingMessage {
    /// Phone number or chat id of the recipient.
    pub to: String,
    pub text: String,
    /// Connection to send through; defaults to the first active one.
    pub connection_id: Option<i64>,
    pub file: Option<OutgoingFile>,
    pub department_id: Option<i64>,
    pub contact_id: Option<i64>,
}

struct Running {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    state: watch::Receiver<ConnectionState>,
}

pub struct SyncEngine {
    api: Arc<dyn RemoteApi>,
    cache: SharedCache,
    emitter: EventEmitter,
    settings: EngineSettings,
    running: Option<Running>,
}

impl SyncEngine {
    pub fn new(api: Arc<dyn RemoteApi>, settings: EngineSettings) -> Self {
        Self {
            api,
            cache: EntityCache::new().shared(),
            emitter: EventEmitter::new(),
            settings,
            running: None,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.emitter.subscribe()
    }

    pub fn cache(&self) -> SharedCache {
        Arc::clone(&self.cache)
    }

    /// Reload every entity kind from the remote.
    ///
    /// Connections, departments and contacts load in parallel; agents need
    /// departments, and the call window is seeded so the first
    /// reconciliation only reports real changes.
    pub async fn load_all(&self) -> Result<()> {
        tracing::debug!("Loading connections, departments and contacts");
        let (connections, departments, contacts) = futures::try_join!(
            self.api.fetch_connections(),
            self.api.fetch_departments(),
            self.api.fetch_contacts(),
        )?;
        tracing::debug!("Loading agents and recent calls");
        let agents = self.api.fetch_agents().await?;
        let calls = self
            .api
            .fetch_calls(reconcile::window_query(), Some(reconcile::FETCH_TIMEOUT))
            .await?;

        let mut cache = self.cache.lock().await;
        cache.replace_connections(connections);
        cache.replace_departments(departments);
        cache.replace_contacts(contacts);
        cache.replace_agents(agents);
        let calls: Vec<Call> = calls
            .iter()
            .filter_map(|raw| match cache.resolve_call(raw) {
                Ok(call) => Some(call),
                Err(e) => {
                    tracing::error!("Skipping call {}: {}", raw.id_chamado, e);
                    None
                }
            })
            .collect();
        cache.replace_calls(calls);

        tracing::debug!("{} connections loaded", cache.connections().len());
        tracing::debug!("{} departments loaded", cache.departments().len());
        tracing::debug!("{} contacts loaded", cache.contacts().len());
        tracing::debug!("{} agents loaded", cache.agents().len());
        tracing::debug!("{} calls loaded", cache.calls().len());
        Ok(())
    }

    /// Spawn the push connection and the reconciliation monitor.
    ///
    /// Returns the push connection state. Calling it again while running
    /// returns the existing state without spawning anything.
    pub fn start(&mut self, transport: Arc<dyn PushTransport>) -> watch::Receiver<ConnectionState> {
        if let Some(ref running) = self.running {
            return running.state.clone();
        }

        let cancel = CancellationToken::new();
        let normalizer = Arc::new(Normalizer::new(self.cache(), Arc::clone(&self.api)));
        let push = PushSettings::new(
            self.settings.push_url.clone(),
            self.settings.token.clone(),
            self.settings.monitored_events,
        );
        let manager = ConnectionManager::new(transport, push, normalizer, self.emitter.clone());
        let state = manager.state();
        let monitor = Arc::new(ReconciliationMonitor::new(
            self.cache(),
            Arc::clone(&self.api),
            self.emitter.clone(),
            self.settings.reconcile_interval,
        ));

        let tasks = vec![
            tokio::spawn(manager.run(cancel.child_token())),
            tokio::spawn(monitor.run(cancel.child_token())),
        ];
        tracing::info!("Sync engine started");

        self.running = Some(Running {
            cancel,
            tasks,
            state: state.clone(),
        });
        state
    }

    /// Cancel the background tasks and wait for them to finish.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.cancel.cancel();
        for task in running.tasks {
            if let Err(e) = task.await {
                tracing::warn!("Background task ended abnormally: {}", e);
            }
        }
        tracing::info!("Sync engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// A call by id, from the cache or the remote.
    pub async fn get_call(&self, call_id: i64) -> Result<Arc<Call>> {
        reconcile::lookup_call(&self.cache, self.api.as_ref(), call_id).await
    }

    /// Fetch calls and resolve them against the cache without storing them.
    pub async fn fetch_calls(&self, query: CallQuery) -> Result<Vec<Call>> {
        let raw = self.api.fetch_calls(query, None).await?;
        let cache = self.cache.lock().await;
        Ok(raw
            .iter()
            .filter_map(|r| match cache.resolve_call(r) {
                Ok(call) => Some(call),
                Err(e) => {
                    tracing::warn!("Skipping call {}: {}", r.id_chamado, e);
                    None
                }
            })
            .collect())
    }

    /// Send a chat message.
    ///
    /// A recipient that is only the group suffix is skipped. Without an explicit connection the
    /// first active one is used. The agent-name token is attached only
    /// when enabled and no file is sent.
    pub async fn send_message(&self, message: OutgoingMessage) -> Result<()> {
        if message.to == GROUP_SUFFIX {
            tracing::debug!("Not sending to bare group suffix {}", message.to);
            return Ok(());
        }

        let connection = {
            let cache = self.cache.lock().await;
            match message.connection_id {
                Some(id) => {
                    let conn = cache
                        .connection(id)
                        .ok_or_else(|| Error::unresolved("connection", id))?;
                    if !conn.active {
                        return Err(Error::NoActiveConnection);
                    }
                    conn
                }
                None => cache
                    .first_active_connection()
                    .ok_or(Error::NoActiveConnection)?,
            }
        };

        let name_token = (self.settings.show_agent_name && message.file.is_none())
            .then(|| self.settings.token.clone());
        let text = if name_token.is_some() {
            format!("\n{}", message.text)
        } else {
            message.text
        };

        let request = SendMessageRequest {
            chat_id: message.to.contains('@').then(|| message.to.clone()),
            number: message.to,
            uuid: connection.uuid.clone(),
            text,
            file: message.file,
            name_token,
            department_id: message.department_id,
            contact_id: message.contact_id,
        };

        tracing::info!("Sending new message to [{}]", request.number);
        self.api.send_message(&request).await
    }

    pub async fn transfer_call(
        &self,
        call_id: i64,
        department_id: i64,
        agent_id: Option<i64>,
    ) -> Result<()> {
        tracing::info!("Transferring call {} to department {}", call_id, department_id);
        self.api.transfer_call(call_id, department_id, agent_id).await
    }

    pub async fn close_call(&self, call_id: i64, silent: bool) -> Result<()> {
        tracing::info!("Closing call {}", call_id);
        self.api.close_call(call_id, silent).await
    }

    pub async fn fetch_contact_info(&self, phone: &str) -> Result<serde_json::Value> {
        self.api.fetch_contact_info(phone).await
    }

    pub async fn register_contact_name(&self, phone: &str, name: &str) -> Result<()> {
        self.api.register_contact_name(phone, name).await
    }

    /// Media attached to a message, by message id.
    pub async fn fetch_media(&self, message_id: i64) -> Result<MessageMedia> {
        self.api.fetch_media(message_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, FakeApi, FakeTransport};
    use tokio_test::assert_ok;

    fn settings(show_agent_name: bool) -> EngineSettings {
        EngineSettings {
            push_url: "wss://push.test:19548".into(),
            token: "tok".into(),
            monitored_events: MonitoredEvents::default(),
            reconcile_interval: Duration::from_secs(30),
            show_agent_name,
        }
    }

    async fn loaded(api: Arc<FakeApi>, show_agent_name: bool) -> SyncEngine {
        let engine = SyncEngine::new(api, settings(show_agent_name));
        engine.load_all().await.unwrap();
        engine
    }

    #[tokio::test]
    async fn test_load_all_fills_cache() {
        let api = Arc::new(FakeApi::default());
        api.set_calls(vec![testing::raw_call(7, Some("Bob"), "atendimento")]);
        let engine = loaded(api, true).await;

        let cache = engine.cache();
        let cache = cache.lock().await;
        assert_eq!(cache.connections().len(), 2);
        assert_eq!(cache.departments().len(), 4);
        assert_eq!(cache.contacts().len(), 2);
        assert_eq!(cache.agents().len(), 2);
        assert_eq!(cache.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_load_all_skips_call_without_references() {
        let api = Arc::new(FakeApi::default());
        let mut broken = testing::raw_call(8, None, "aguardando");
        broken.id_whatsapp = None;
        broken.id_whatsapp_conexao_fk = None;
        api.set_calls(vec![testing::raw_call(7, Some("Bob"), "atendimento"), broken]);
        let engine = loaded(api, true).await;

        let cache = engine.cache();
        let cache = cache.lock().await;
        assert_eq!(cache.calls().len(), 1);
        assert!(cache.call(7).is_some());
        assert!(cache.call(8).is_none());
    }

    #[tokio::test]
    async fn test_first_reconciliation_after_load_is_quiet() {
        let api = Arc::new(FakeApi::default());
        api.set_calls(vec![testing::raw_call(7, Some("Bob"), "atendimento")]);
        let engine = loaded(Arc::clone(&api), true).await;

        let monitor = ReconciliationMonitor::new(
            engine.cache(),
            api,
            engine.emitter.clone(),
            Duration::from_secs(30),
        );
        assert_eq!(
            monitor.tick().await,
            reconcile::TickOutcome::Completed { events: 0 }
        );
    }

    #[tokio::test]
    async fn test_send_uses_first_active_connection_and_name_token() {
        let api = Arc::new(FakeApi::default());
        let engine = loaded(Arc::clone(&api), true).await;

        assert_ok!(
            engine
                .send_message(OutgoingMessage {
                    to: "5511900000001@c.us".into(),
                    text: "Bom dia".into(),
                    ..Default::default()
                })
                .await
        );

        let sent = api.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].uuid, "uuid-1");
        assert_eq!(sent[0].text, "\nBom dia");
        assert_eq!(sent[0].name_token.as_deref(), Some("tok"));
        assert_eq!(sent[0].chat_id.as_deref(), Some("5511900000001@c.us"));
    }

    #[tokio::test]
    async fn test_send_with_file_or_name_hidden_has_no_token() {
        let api = Arc::new(FakeApi::default());
        let engine = loaded(Arc::clone(&api), false).await;
        engine
            .send_message(OutgoingMessage {
                to: "5511900000001".into(),
                text: "Oi".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let engine = loaded(Arc::clone(&api), true).await;
        engine
            .send_message(OutgoingMessage {
                to: "5511900000001".into(),
                text: "Segue".into(),
                file: Some(OutgoingFile {
                    name: "a.pdf".into(),
                    content: "JVBERi0=".into(),
                }),
                ..Default::default()
            })
            .await
            .unwrap();

        let sent = api.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|r| r.name_token.is_none()));
        assert_eq!(sent[0].text, "Oi");
        assert!(sent[0].chat_id.is_none());
        assert_eq!(sent[1].text, "Segue");
    }

    #[tokio::test]
    async fn test_send_rejects_inactive_connection_and_skips_bare_group_suffix() {
        let api = Arc::new(FakeApi::default());
        let engine = loaded(Arc::clone(&api), true).await;

        let err = engine
            .send_message(OutgoingMessage {
                to: "5511900000001".into(),
                text: "Oi".into(),
                connection_id: Some(2),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoActiveConnection));

        assert_ok!(
            engine
                .send_message(OutgoingMessage {
                    to: "@g.us".into(),
                    text: "Oi".into(),
                    ..Default::default()
                })
                .await
        );
        assert!(api.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_to_group_chat_id() {
        let api = Arc::new(FakeApi::default());
        let engine = loaded(Arc::clone(&api), false).await;

        assert_ok!(
            engine
                .send_message(OutgoingMessage {
                    to: "120363000000@g.us".into(),
                    text: "Bom dia".into(),
                    ..Default::default()
                })
                .await
        );
        let sent = api.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].number, "120363000000@g.us");
        assert_eq!(sent[0].chat_id.as_deref(), Some("120363000000@g.us"));
        assert_eq!(sent[0].text, "Bom dia");
    }

    #[tokio::test]
    async fn test_send_without_any_active_connection() {
        let api = Arc::new(FakeApi::default());
        let engine = SyncEngine::new(api, settings(true));
        let err = engine
            .send_message(OutgoingMessage {
                to: "5511900000001".into(),
                text: "Oi".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoActiveConnection));
    }

    #[tokio::test]
    async fn test_actions_forwarded() {
        let api = Arc::new(FakeApi::default());
        let engine = loaded(Arc::clone(&api), true).await;

        engine.transfer_call(7, 20, None).await.unwrap();
        engine.close_call(7, true).await.unwrap();
        engine.register_contact_name("5511900000004", "Fabio").await.unwrap();

        assert_eq!(
            *api.actions.lock().unwrap(),
            vec![
                "transfer 7 20 None".to_string(),
                "close 7 true".to_string(),
                "register 5511900000004 Fabio".to_string(),
            ]
        );
        let info = engine.fetch_contact_info("5511900000004").await.unwrap();
        assert_eq!(info["numero"], "5511900000004");
        let media = engine.fetch_media(1).await.unwrap();
        assert_eq!(media.bytes, 1i64.to_be_bytes().to_vec());
    }

    #[tokio::test]
    async fn test_fetch_calls_drops_unresolvable() {
        let api = Arc::new(FakeApi::default());
        let mut orphan = testing::raw_call(8, None, "aguardando");
        orphan.id_whatsapp = Some("ghost@c.us".into());
        api.set_calls(vec![testing::raw_call(7, None, "aguardando"), orphan]);
        let engine = loaded(api, true).await;

        let calls = engine
            .fetch_calls(reconcile::window_query())
            .await
            .unwrap();
        let ids: Vec<i64> = calls.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![7]);
        assert_eq!(engine.get_call(7).await.unwrap().id, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_stop() {
        let api = Arc::new(FakeApi::default());
        let mut engine = loaded(api, true).await;
        let mut events = engine.subscribe();
        let (transport, mut servers) = FakeTransport::new();

        let mut state = engine.start(transport.clone());
        assert!(engine.is_running());
        let server = servers.recv().await.unwrap();
        server.push(r#"{"metodo":"login","autenticado":true}"#);
        state
            .wait_for(|s| *s == ConnectionState::Subscribed)
            .await
            .unwrap();
        assert_eq!(events.recv().await.unwrap().kind(), "connection-opened");

        // A second start is a no-op.
        engine.start(transport.clone());
        engine.stop().await;
        assert!(!engine.is_running());
        assert_eq!(*state.borrow(), ConnectionState::Closed);
        assert_eq!(
            transport
                .connects
                .load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }
}
