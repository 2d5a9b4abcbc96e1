//! Provider glue: control commands in, controller operations out.

use std::sync::Arc;

use clay_control::{
    CMD_CREATE_ROOM, CMD_JOIN_ROOM, CMD_RUNNING_INFO, ControlHandler, SharedStore, error_reply,
};
use clay_room::{ConfigDocument, RoomCode, TunnelOptions};
use tracing::{info, warn};

use crate::controller::TunnelHandle;
use crate::error::TunnelError;

/// Store cell holding the engine configuration document.
///
/// Written by the control channel on room creation or join, read when the
/// OS asks the extension to start.
pub const CONFIG_KEY: &str = "tunnel.config";

/// Store cell holding the persisted [`TunnelOptions`] bundle as JSON.
///
/// Carries the same document as [`CONFIG_KEY`] plus explicit interface
/// overrides; preferred over the raw document when present.
pub const OPTIONS_KEY: &str = "tunnel.options";

/// Binds the tunnel controller to the shared store and the control
/// channel's command dispatch.
pub struct ExtensionProvider<S> {
    tunnel: TunnelHandle,
    store: Arc<S>,
}

impl<S: SharedStore> ExtensionProvider<S> {
    pub fn new(tunnel: TunnelHandle, store: Arc<S>) -> Self {
        Self { tunnel, store }
    }

    pub fn tunnel(&self) -> &TunnelHandle {
        &self.tunnel
    }

    /// Start the tunnel from the stored configuration.
    ///
    /// The OS start request carries no payload of its own; the options
    /// bundle (or the raw document) stashed by the last room command is
    /// the configuration source. Nothing stored means nothing is started.
    pub async fn start_from_store(&self) -> Result<(), TunnelError> {
        if let Some(raw) = self.store.get(OPTIONS_KEY) {
            match serde_json::from_str::<TunnelOptions>(&raw) {
                Ok(options) => return self.tunnel.start_with(options).await,
                Err(e) => {
                    warn!(error = %e, "stored options unreadable, falling back to raw document");
                }
            }
        }
        let config = self
            .store
            .get(CONFIG_KEY)
            .ok_or_else(|| TunnelError::Config("no configuration in shared store".into()))?;
        self.tunnel.start(&config).await
    }

    /// Persist a freshly generated document under both cells.
    ///
    /// The raw document stays readable for peers that only understand
    /// `tunnel.config`; overrides a user set earlier do not survive a room
    /// change, since they were chosen for the previous network.
    fn stash(&self, doc: &str) {
        self.store.set(CONFIG_KEY, doc);
        let options = TunnelOptions {
            config: doc.to_string(),
            ..Default::default()
        };
        match serde_json::to_string(&options) {
            Ok(json) => self.store.set(OPTIONS_KEY, &json),
            Err(e) => warn!(error = %e, "options bundle serialization failed"),
        }
    }

    /// `CREATE_ROOM:<name>` — mint a fresh code, stash the host document,
    /// reply with the code.
    fn create_room(&self, name: &str) -> String {
        let code = RoomCode::generate();
        let doc = ConfigDocument::for_room(name.trim(), &code).host().render();
        self.stash(&doc);
        info!(code = %code, "room created");
        code.to_string()
    }

    /// `JOIN_ROOM:<code>` — derive the network identity from the code,
    /// stash the member document, reply `SUCCESS`.
    fn join_room(&self, payload: &str) -> String {
        let code = match RoomCode::parse(payload.trim()) {
            Ok(code) => code,
            Err(e) => return error_reply(&e.to_string()),
        };
        let doc = ConfigDocument::for_room("", &code).render();
        self.stash(&doc);
        info!(code = %code, "room joined");
        "SUCCESS".to_string()
    }
}

impl<S: SharedStore> ControlHandler for ExtensionProvider<S> {
    async fn handle(&self, command: &str) -> String {
        if let Some(name) = command.strip_prefix(CMD_CREATE_ROOM) {
            return self.create_room(name);
        }
        if let Some(code) = command.strip_prefix(CMD_JOIN_ROOM) {
            return self.join_room(code);
        }
        if command == CMD_RUNNING_INFO {
            return match self.tunnel.running_info().await {
                Ok(info) => info,
                Err(e) => error_reply(&e.to_string()),
            };
        }

        let tag = command.split(':').next().unwrap_or(command);
        error_reply(&format!("unsupported command: {tag}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::SessionState;
    use crate::host::MockHost;
    use clay_control::{
        ControlRequester, ControlResponder, LocalSignal, MemoryStore, is_error_reply,
    };
    use clay_engine::MockEngine;
    use std::time::Duration;

    fn provider() -> (
        ExtensionProvider<MemoryStore>,
        MockEngine,
        MockHost,
        Arc<MemoryStore>,
    ) {
        let engine = MockEngine::new();
        let host = MockHost::new();
        let store = Arc::new(MemoryStore::new());
        let tunnel = TunnelHandle::spawn_with_settle(
            engine.clone(),
            host.clone(),
            Duration::from_millis(10),
        );
        (
            ExtensionProvider::new(tunnel, store.clone()),
            engine,
            host,
            store,
        )
    }

    #[tokio::test]
    async fn test_create_room_replies_with_code_and_stashes_host_doc() {
        let (provider, _engine, _host, store) = provider();

        let reply = provider.handle("CREATE_ROOM:Alpha").await;
        let code = RoomCode::parse(&reply).expect("reply is a room code");

        let doc = store.get(CONFIG_KEY).unwrap();
        assert!(doc.contains("[scaffolding]"));
        assert!(doc.contains("network_name = \"Alpha\""));
        assert!(doc.contains(&clay_room::network_secret(&code)));
    }

    #[tokio::test]
    async fn test_join_room_replies_success_and_stashes_member_doc() {
        let (provider, _engine, _host, store) = provider();

        let reply = provider.handle("JOIN_ROOM:U/ABCD-EFGH-IJKL-MNOP").await;
        assert_eq!(reply, "SUCCESS");

        let doc = store.get(CONFIG_KEY).unwrap();
        assert!(!doc.contains("[scaffolding]"));
        assert!(doc.contains("network_name = \"Clay-ABCDEFGH\""));
    }

    #[tokio::test]
    async fn test_join_room_rejects_malformed_code() {
        let (provider, _engine, _host, store) = provider();

        let reply = provider.handle("JOIN_ROOM:not-a-code").await;
        assert!(is_error_reply(&reply));
        assert!(reply.contains("invalid room code"));
        assert_eq!(store.get(CONFIG_KEY), None);
    }

    #[tokio::test]
    async fn test_unknown_command_gets_unsupported_error() {
        let (provider, _engine, _host, _store) = provider();

        let reply = provider.handle("DESTROY_ROOM:Alpha").await;
        assert_eq!(reply, "ERROR:unsupported command: DESTROY_ROOM");
    }

    #[tokio::test]
    async fn test_running_info_queries_the_engine() {
        let (provider, engine, _host, _store) = provider();
        engine.set_running_info("{\"peers\":3}");

        let reply = provider.handle("runningInfo").await;
        assert_eq!(reply, "{\"peers\":3}");
    }

    #[tokio::test]
    async fn test_start_from_store_requires_a_document() {
        let (provider, engine, _host, _store) = provider();

        let err = provider.start_from_store().await.unwrap_err();
        assert!(matches!(err, TunnelError::Config(_)));
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_start_from_store_runs_the_stashed_document() {
        let (provider, _engine, _host, _store) = provider();

        provider.handle("CREATE_ROOM:Alpha").await;
        provider.start_from_store().await.unwrap();

        assert_eq!(
            provider.tunnel().state().await.unwrap(),
            SessionState::Running
        );
    }

    #[tokio::test]
    async fn test_room_commands_persist_options_bundle() {
        let (provider, _engine, _host, store) = provider();

        provider.handle("CREATE_ROOM:Alpha").await;

        let bundle: TunnelOptions =
            serde_json::from_str(&store.get(OPTIONS_KEY).unwrap()).unwrap();
        assert_eq!(bundle.config, store.get(CONFIG_KEY).unwrap());
        assert_eq!(bundle.mtu, None);
    }

    #[tokio::test]
    async fn test_start_from_store_honors_option_overrides() {
        let (provider, _engine, host, store) = provider();

        provider.handle("JOIN_ROOM:U/ABCD-EFGH-IJKL-MNOP").await;
        let mut bundle: TunnelOptions =
            serde_json::from_str(&store.get(OPTIONS_KEY).unwrap()).unwrap();
        bundle.mtu = Some(1200);
        bundle.dns = vec!["9.9.9.9".into()];
        store.set(OPTIONS_KEY, &serde_json::to_string(&bundle).unwrap());

        provider.start_from_store().await.unwrap();

        let applied = &host.applied()[0];
        assert_eq!(applied.mtu, 1200);
        assert_eq!(applied.dns_servers, vec!["9.9.9.9"]);
    }

    #[tokio::test]
    async fn test_unreadable_options_fall_back_to_raw_document() {
        let (provider, _engine, _host, store) = provider();
        provider.handle("CREATE_ROOM:Alpha").await;
        store.set(OPTIONS_KEY, "not json");

        provider.start_from_store().await.unwrap();
        assert_eq!(
            provider.tunnel().state().await.unwrap(),
            SessionState::Running
        );
    }

    // Full channel wiring: requester process on one side, responder with
    // the provider on the other, shared store in between.
    #[tokio::test]
    async fn test_create_then_join_over_the_control_channel() {
        let (provider, _engine, _host, store) = provider();
        let signal = LocalSignal::new();
        let requester = ControlRequester::new(store.clone(), signal.clone());
        let responder = ControlResponder::new(store, signal)
            .with_poll_interval(Duration::from_millis(10));
        tokio::spawn(async move { responder.run(&provider).await });

        let code = requester.request("CREATE_ROOM:Alpha").await.unwrap();
        assert!(RoomCode::parse(&code).is_ok());

        let joined = requester
            .request(&format!("JOIN_ROOM:{code}"))
            .await
            .unwrap();
        assert_eq!(joined, "SUCCESS");
    }
}
