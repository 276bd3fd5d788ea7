//! World server assembly and lifecycle.
//!
//! [`WorldServer`] wires the shared state together in an explicit startup
//! phase: handler groups register into a [`RegistryBuilder`], the frozen
//! registry is placed in the [`ServerContext`], and the dispatcher, zone
//! directory and session table share that context for the rest of the
//! server's life. Running the server adds the UDP loops, the replication
//! tick and the idle sweep.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{error, info, trace, warn};

use crate::config::ServerConfig;
use crate::context::ServerContext;
use crate::dispatch::Dispatcher;
use crate::error::ServerError;
use crate::groups;
use crate::messages::connection::{disconnect_reason, DisconnectNotify};
use crate::network::{udp, FrameSink, Outbox};
use crate::persistence::{CharacterStore, MemoryStore};
use crate::registry::{HandlerGroup, RegistryBuilder};
use crate::session::SessionTable;
use crate::shutdown::ShutdownState;
use crate::stats::DispatchStats;
use crate::zone::{FileZoneMetadata, StaticZoneMetadata, ZoneDirectory, ZoneMetadataSource};

type OutboundQueue = mpsc::UnboundedReceiver<(SocketAddr, Vec<u8>)>;

/// Builder for [`WorldServer`].
pub struct WorldServerBuilder {
    config: ServerConfig,
    store: Option<Arc<dyn CharacterStore>>,
    metadata: Option<Arc<dyn ZoneMetadataSource>>,
    sink: Option<Arc<dyn FrameSink>>,
    groups: Vec<Arc<dyn HandlerGroup>>,
}

impl WorldServerBuilder {
    /// Character store; defaults to an in-memory store.
    pub fn store(mut self, store: Arc<dyn CharacterStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Zone metadata; defaults to the configured zones file, or empty zones.
    pub fn metadata(mut self, metadata: Arc<dyn ZoneMetadataSource>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Frame sink; defaults to an outbox drained by the UDP send loop.
    pub fn sink(mut self, sink: Arc<dyn FrameSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Adds a handler group, registered after the built-in ones.
    pub fn group(mut self, group: Arc<dyn HandlerGroup>) -> Self {
        self.groups.push(group);
        self
    }

    pub fn build(self) -> Result<WorldServer, ServerError> {
        let config = self.config;
        if !config.zone_ids.contains(&config.default_zone) {
            return Err(ServerError::Configuration(format!(
                "default zone {} is not among the configured zones {:?}",
                config.default_zone, config.zone_ids
            )));
        }

        let (sink, outbound) = match self.sink {
            Some(sink) => (sink, None),
            None => {
                let (outbox, receiver) = Outbox::new();
                (Arc::new(outbox) as Arc<dyn FrameSink>, Some(receiver))
            }
        };
        let metadata = self.metadata.unwrap_or_else(|| match &config.zones_file {
            Some(path) => Arc::new(FileZoneMetadata::new(path)),
            None => Arc::new(StaticZoneMetadata::empty_zones(config.zone_ids.iter().copied())),
        });
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));

        let mut registry = RegistryBuilder::new();
        for group in groups::builtin().into_iter().chain(self.groups) {
            registry.register(group);
        }
        let registry = registry.build();
        info!("📋 Handler registry ready: {:?}", registry);

        let ctx = ServerContext {
            zones: Arc::new(ZoneDirectory::new(
                config.zone_ids.iter().copied(),
                metadata,
                sink.clone(),
            )),
            sessions: Arc::new(SessionTable::new(config.max_connections)),
            sink,
            store,
            registry: Arc::new(registry),
            config: Arc::new(config),
            stats: Arc::new(DispatchStats::new()),
        };

        Ok(WorldServer {
            dispatcher: Dispatcher::new(ctx.clone()),
            ctx,
            outbound: Mutex::new(outbound),
        })
    }
}

/// The world server.
pub struct WorldServer {
    ctx: ServerContext,
    dispatcher: Dispatcher,
    outbound: Mutex<Option<OutboundQueue>>,
}

impl WorldServer {
    /// Creates a server with the built-in handler groups and default
    /// collaborators.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        Self::builder(config).build()
    }

    pub fn builder(config: ServerConfig) -> WorldServerBuilder {
        WorldServerBuilder {
            config,
            store: None,
            metadata: None,
            sink: None,
            groups: Vec::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.ctx.config
    }

    pub fn context(&self) -> &ServerContext {
        &self.ctx
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Runs one console command line.
    pub fn execute_console(&self, line: &str) -> String {
        self.ctx.registry.commands().execute_console(line, &self.ctx)
    }

    /// Binds the configured address and serves until shutdown is initiated.
    ///
    /// # Arguments
    ///
    /// * `shutdown` - Shared shutdown state; initiating it stops intake
    ///
    /// # Returns
    ///
    /// `Ok(())` after a clean stop, or a `Network` error if binding failed.
    pub async fn start_with_shutdown_state(&self, shutdown: ShutdownState) -> Result<(), ServerError> {
        let socket = udp::bind(self.ctx.config.bind_address).await?;
        self.serve(socket, shutdown).await
    }

    /// Serves on an already bound socket until shutdown is initiated.
    pub async fn serve(&self, socket: Arc<UdpSocket>, shutdown: ShutdownState) -> Result<(), ServerError> {
        info!(
            "🚀 World server serving zones {:?} on {}",
            self.ctx.zones.configured_ids(),
            socket
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "unknown address".to_string())
        );

        let sender = match self.outbound.lock().take() {
            Some(outbound) => Some(tokio::spawn(udp::send_loop(
                socket.clone(),
                outbound,
                shutdown.clone(),
            ))),
            None => {
                warn!("📭 No outbound queue to drain; frames go to the configured sink");
                None
            }
        };

        if self.ctx.config.tick_interval_ms > 0 {
            self.spawn_replication_tick(shutdown.clone());
            info!("🕒 Replication tick every {}ms", self.ctx.config.tick_interval_ms);
        } else {
            info!("⏸️ Replication tick disabled (interval: 0ms)");
        }
        if self.ctx.config.connection_timeout > 0 {
            self.spawn_idle_sweep(shutdown.clone());
        }

        udp::receive_loop(socket, self.dispatcher.clone(), shutdown.clone()).await;

        self.shutdown().await;
        shutdown.complete_shutdown();
        if let Some(sender) = sender {
            if tokio::time::timeout(Duration::from_secs(2), sender).await.is_err() {
                warn!("⏰ Send loop did not drain within 2s");
            }
        }
        info!("✅ World server stopped");
        Ok(())
    }

    /// Disconnects every session, saving characters, and tears zones down.
    pub async fn shutdown(&self) {
        info!("🛑 Shutting down world server...");
        let endpoints = self.ctx.sessions.endpoints();
        for endpoint in &endpoints {
            self.ctx.send_message(
                *endpoint,
                &DisconnectNotify {
                    reason: disconnect_reason::SERVER_SHUTDOWN,
                },
            );
            self.ctx.sessions.remove(endpoint);
            if let Some(record) = self.ctx.zones.on_disconnect(*endpoint, "server shutdown") {
                let id = record.object_id;
                if let Err(e) = self.ctx.store.save_character(record).await {
                    error!("💾 Failed to save character {} on shutdown: {}", id, e);
                }
            }
        }
        self.ctx.zones.shutdown();
        info!("🧹 Disconnected {} session(s)", endpoints.len());
    }

    fn spawn_replication_tick(&self, shutdown: ShutdownState) {
        let zones = self.ctx.zones.clone();
        let period = Duration::from_millis(self.ctx.config.tick_interval_ms);
        tokio::spawn(async move {
            let mut ticker = interval(period);
            let mut tick_count: u64 = 0;
            loop {
                tokio::select! {
                    _ = shutdown.initiated() => break,
                    _ = ticker.tick() => {}
                }
                tick_count += 1;
                let sent = zones.replicate_tick();
                if sent > 0 {
                    trace!("🔁 Tick {} sent {} serialize frame(s)", tick_count, sent);
                }
            }
            info!("🕒 Replication tick stopped after {} tick(s)", tick_count);
        });
    }

    fn spawn_idle_sweep(&self, shutdown: ShutdownState) {
        let ctx = self.ctx.clone();
        let timeout = Duration::from_secs(ctx.config.connection_timeout);
        let period = (timeout / 4).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                tokio::select! {
                    _ = shutdown.initiated() => break,
                    _ = ticker.tick() => {}
                }
                for endpoint in ctx.sessions.idle(timeout) {
                    info!("⏰ {} idle for {:?}, disconnecting", endpoint, timeout);
                    ctx.send_message(
                        endpoint,
                        &DisconnectNotify {
                            reason: disconnect_reason::TIMED_OUT,
                        },
                    );
                    ctx.disconnect(endpoint, "timed out");
                }
            }
        });
    }
}
