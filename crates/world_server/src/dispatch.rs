//! Per-frame dispatch.
//!
//! Each inbound frame is classified from its fixed header and routed once:
//!
//! 1. raw packets are looked up by `(direction, packet id)`
//! 2. game messages are looked up by message id, then resolved to the
//!    sender's session, that session's zone, and the addressed object in the
//!    zone's live set
//! 3. the handler's message is decoded fresh from the frame and the handler
//!    runs in its registered mode
//!
//! Any miss along the way drops the frame with a logged error. Handler
//! errors and panics are caught here in every mode and counted as faults;
//! the frame still counts as handled and the connection survives.

use std::any::Any;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures::FutureExt;
use replica_codec::frame::DISCONNECTION_NOTIFICATION;
use replica_codec::{Frame, GameMessageHeader, PacketHeader};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use crate::context::{HandlerContext, ServerContext};
use crate::error::{ErrorKind, ServerError};
use crate::registry::{HandlerEntry, Job};
use crate::session::Session;
use crate::stats::DispatchStats;

/// Result of dispatching one frame.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// A handler was invoked; off-loaded handlers report their task
    Handled { task: Option<JoinHandle<()>> },
    /// The frame was dropped without invoking anything
    Dropped(ServerError),
}

impl DispatchOutcome {
    pub fn is_handled(&self) -> bool {
        matches!(self, DispatchOutcome::Handled { .. })
    }

    /// Waits for an off-loaded handler to finish.
    pub async fn finish(self) {
        if let DispatchOutcome::Handled { task: Some(task) } = self {
            if let Err(e) = task.await {
                error!("💥 Handler task failed to complete: {}", e);
            }
        }
    }
}

/// Routes frames to registered handlers.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    ctx: ServerContext,
}

impl Dispatcher {
    pub fn new(ctx: ServerContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &ServerContext {
        &self.ctx
    }

    /// Opens (or returns) the session for an endpoint on first contact.
    pub fn accept(&self, endpoint: SocketAddr) -> Result<Arc<Session>, ServerError> {
        self.ctx.sessions.get_or_create(
            endpoint,
            self.ctx.config.default_zone,
            self.ctx.config.default_privilege,
        )
    }

    /// Handles one datagram off the socket. Oversized or unclassifiable
    /// frames are dropped before a session is opened for the sender.
    pub fn receive(&self, endpoint: SocketAddr, frame: &[u8]) -> DispatchOutcome {
        self.ctx.stats.record_received();
        let result = self.screen(frame).and_then(|classified| {
            if !matches!(classified, Frame::Control(_)) {
                self.accept(endpoint)?;
            }
            self.route(endpoint, classified, frame)
        });
        self.conclude(endpoint, result)
    }

    /// Dispatches one frame received from `endpoint`.
    pub fn dispatch(&self, endpoint: SocketAddr, frame: &[u8]) -> DispatchOutcome {
        self.ctx.stats.record_received();
        let result = self
            .screen(frame)
            .and_then(|classified| self.route(endpoint, classified, frame));
        self.conclude(endpoint, result)
    }

    fn conclude(
        &self,
        endpoint: SocketAddr,
        result: Result<Option<JoinHandle<()>>, ServerError>,
    ) -> DispatchOutcome {
        match result {
            Ok(task) => {
                self.ctx.stats.record_handled();
                DispatchOutcome::Handled { task }
            }
            Err(e) => {
                self.ctx.stats.record_dropped(&e);
                match e.kind() {
                    ErrorKind::Protocol | ErrorKind::Network => {
                        warn!("🗑️ Dropped frame from {}: {}", endpoint, e)
                    }
                    _ => debug!("🗑️ Dropped frame from {}: {}", endpoint, e),
                }
                DispatchOutcome::Dropped(e)
            }
        }
    }

    /// Checks the size limit and classifies the fixed header.
    fn screen(&self, frame: &[u8]) -> Result<Frame, ServerError> {
        if frame.len() > self.ctx.config.max_frame_size {
            return Err(ServerError::Protocol(format!(
                "frame of {} bytes exceeds the {} byte limit",
                frame.len(),
                self.ctx.config.max_frame_size
            )));
        }
        Ok(Frame::classify(frame)?)
    }

    fn route(
        &self,
        endpoint: SocketAddr,
        classified: Frame,
        frame: &[u8],
    ) -> Result<Option<JoinHandle<()>>, ServerError> {
        match classified {
            Frame::Control(DISCONNECTION_NOTIFICATION) => {
                self.ctx.disconnect(endpoint, "client disconnected");
                Ok(None)
            }
            Frame::Control(byte) => Err(ServerError::Protocol(format!(
                "unsupported control frame 0x{byte:02x}"
            ))),
            Frame::Packet(header) => self.route_packet(endpoint, header, frame),
            Frame::GameMessage(header) => self.route_game_message(endpoint, header, frame),
        }
    }

    fn route_packet(
        &self,
        endpoint: SocketAddr,
        header: PacketHeader,
        frame: &[u8],
    ) -> Result<Option<JoinHandle<()>>, ServerError> {
        let entry = self
            .ctx
            .registry
            .packet_handler(header.direction, header.packet_id)
            .ok_or_else(|| {
                ServerError::Protocol(format!(
                    "no handler for packet {}:{}",
                    header.direction, header.packet_id
                ))
            })?;

        let session = self.ctx.sessions.get(&endpoint);
        if let Some(session) = &session {
            session.touch();
        }
        let ctx = HandlerContext::new(endpoint, session, self.ctx.clone());
        let job = entry.prepare(frame, ctx)?;
        Ok(self.run(entry, endpoint, job))
    }

    fn route_game_message(
        &self,
        endpoint: SocketAddr,
        header: GameMessageHeader,
        frame: &[u8],
    ) -> Result<Option<JoinHandle<()>>, ServerError> {
        let entry = self.ctx.registry.game_handler(header.message_id).ok_or_else(|| {
            ServerError::Protocol(format!("no handler for game message {}", header.message_id))
        })?;

        let session = self.ctx.sessions.get(&endpoint).ok_or_else(|| {
            ServerError::Routing(format!("game message from unauthenticated endpoint {endpoint}"))
        })?;
        session.touch();

        let zone = self.ctx.zones.zone(session.zone_id()).ok_or_else(|| {
            ServerError::Routing(format!(
                "zone {} of {} is not live",
                session.zone_id(),
                endpoint
            ))
        })?;
        let associate = zone.find(header.object_id).ok_or_else(|| {
            ServerError::Routing(format!(
                "object {} is not in zone {}",
                header.object_id,
                zone.id()
            ))
        })?;

        trace!(
            "📨 Game message {} from {} to object {}",
            header.message_id,
            endpoint,
            header.object_id
        );
        let ctx = HandlerContext::new(endpoint, Some(session), self.ctx.clone())
            .with_associate(zone, associate);
        let job = entry.prepare(frame, ctx)?;
        Ok(self.run(entry, endpoint, job))
    }

    fn run(&self, entry: &HandlerEntry, endpoint: SocketAddr, job: Job) -> Option<JoinHandle<()>> {
        let stats = self.ctx.stats.clone();
        let label = entry.message();
        match job {
            Job::Inline(handler) => {
                let outcome = panic::catch_unwind(AssertUnwindSafe(handler));
                report(&stats, label, endpoint, outcome);
                None
            }
            Job::Background(handler) => match tokio::runtime::Handle::try_current() {
                Ok(runtime) => Some(runtime.spawn_blocking(move || {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(handler));
                    report(&stats, label, endpoint, outcome);
                })),
                Err(_) => {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(handler));
                    report(&stats, label, endpoint, outcome);
                    None
                }
            },
            Job::Async(future) => match tokio::runtime::Handle::try_current() {
                Ok(runtime) => Some(runtime.spawn(async move {
                    let outcome = AssertUnwindSafe(future).catch_unwind().await;
                    report(&stats, label, endpoint, outcome);
                })),
                Err(_) => {
                    let fault = ServerError::HandlerFault {
                        handler: label.to_string(),
                        reason: "async handler needs a running runtime".to_string(),
                    };
                    stats.record_fault();
                    error!("💥 {} (frame from {})", fault, endpoint);
                    None
                }
            },
        }
    }
}

fn report(
    stats: &DispatchStats,
    handler: &'static str,
    endpoint: SocketAddr,
    outcome: Result<anyhow::Result<()>, Box<dyn Any + Send>>,
) {
    let reason = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(e)) => format!("{e:#}"),
        Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
    };
    stats.record_fault();
    let fault = ServerError::HandlerFault {
        handler: handler.to_string(),
        reason,
    };
    error!("💥 {} (frame from {})", fault, endpoint);
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
