//! Handler registration and the routing tables it produces.
//!
//! Handler groups declare their bindings on a [`RegistryBuilder`] during an
//! explicit startup phase:
//!
//! * a message type whose route is a game message lands in the game-message
//!   table keyed by message id
//! * any other message type lands in the raw-packet table keyed by
//!   `(direction, packet id)`, taken from the type unless the binding
//!   overrides it
//! * commands land in the command table keyed by `(prefix, signature)`
//!
//! Later registrations replace earlier ones for the same key, with a
//! warning. The builder then freezes into an immutable [`HandlerRegistry`]
//! shared by the dispatcher.
//!
//! ```rust
//! use std::sync::Arc;
//! use world_server::messages::gameplay::PlayEmote;
//! use world_server::registry::{HandlerGroup, RegistryBuilder};
//!
//! struct Emotes;
//!
//! impl HandlerGroup for Emotes {
//!     fn name(&self) -> &'static str {
//!         "emotes"
//!     }
//!
//!     fn register(self: Arc<Self>, builder: &mut RegistryBuilder) {
//!         builder.on::<PlayEmote, _>(|emote, _ctx| {
//!             tracing::info!("emote {}", emote.emote_id);
//!             Ok(())
//!         });
//!     }
//! }
//!
//! let mut builder = RegistryBuilder::new();
//! builder.register(Arc::new(Emotes));
//! let registry = builder.build();
//! assert!(registry.game_handler(121).is_some());
//! ```

pub mod commands;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use compact_str::CompactString;
use futures::future::BoxFuture;
use replica_codec::{codec, Direction};
use tracing::{debug, info, warn};

use crate::context::{HandlerContext, ServerContext};
use crate::error::ServerError;
use crate::messages::{Message, MessageKind};
use crate::objects::GameObject;

pub use commands::{CommandEntry, CommandHandler, CommandLine, CommandTable};

/// How a handler is run relative to the dispatch path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationMode {
    /// Synchronously on the dispatch path
    Inline,
    /// Synchronously on the blocking pool
    Background,
    /// As a spawned task
    Async,
}

impl fmt::Display for InvocationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvocationMode::Inline => write!(f, "inline"),
            InvocationMode::Background => write!(f, "background"),
            InvocationMode::Async => write!(f, "async"),
        }
    }
}

/// Decoded, ready-to-run handler invocation.
pub(crate) enum Job {
    Inline(Box<dyn FnOnce() -> anyhow::Result<()> + Send>),
    Background(Box<dyn FnOnce() -> anyhow::Result<()> + Send>),
    Async(BoxFuture<'static, anyhow::Result<()>>),
}

type Invoker = Arc<dyn Fn(&[u8], HandlerContext) -> Result<Job, ServerError> + Send + Sync>;

/// One routed handler.
#[derive(Clone)]
pub struct HandlerEntry {
    group: &'static str,
    message: &'static str,
    route: MessageKind,
    mode: InvocationMode,
    invoker: Invoker,
}

impl HandlerEntry {
    /// Name of the group that registered the handler.
    pub fn group(&self) -> &'static str {
        self.group
    }

    /// Type name of the handled message.
    pub fn message(&self) -> &'static str {
        self.message
    }

    pub fn route(&self) -> MessageKind {
        self.route
    }

    pub fn mode(&self) -> InvocationMode {
        self.mode
    }

    /// Decodes a fresh message from `frame` and binds it to its handler.
    pub(crate) fn prepare(&self, frame: &[u8], ctx: HandlerContext) -> Result<Job, ServerError> {
        (self.invoker)(frame, ctx)
    }
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("group", &self.group)
            .field("message", &self.message)
            .field("route", &self.route)
            .field("mode", &self.mode)
            .finish()
    }
}

/// A logical set of handlers registered together.
pub trait HandlerGroup: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Declares the group's bindings.
    fn register(self: Arc<Self>, builder: &mut RegistryBuilder);
}

/// Collects bindings from handler groups.
pub struct RegistryBuilder {
    group: &'static str,
    packets: HashMap<(Direction, u32), HandlerEntry>,
    games: HashMap<u16, HandlerEntry>,
    commands: CommandTable,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            group: "ungrouped",
            packets: HashMap::new(),
            games: HashMap::new(),
            commands: CommandTable::default(),
        }
    }

    /// Lets `group` declare its bindings.
    pub fn register(&mut self, group: Arc<dyn HandlerGroup>) -> &mut Self {
        let previous = std::mem::replace(&mut self.group, group.name());
        let before = self.len();
        group.register(self);
        info!(
            "📋 Handler group '{}' registered {} binding(s)",
            self.group,
            self.len().saturating_sub(before)
        );
        self.group = previous;
        self
    }

    /// Binds an inline handler on the message type's own route.
    pub fn on<M, F>(&mut self, handler: F) -> &mut Self
    where
        M: Message,
        F: Fn(M, HandlerContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.bind::<M>().inline(handler)
    }

    /// Binds a synchronous handler run on the blocking pool.
    pub fn on_background<M, F>(&mut self, handler: F) -> &mut Self
    where
        M: Message,
        F: Fn(M, HandlerContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.bind::<M>().background(handler)
    }

    /// Binds an async handler run as a spawned task.
    pub fn on_async<M, F, Fut>(&mut self, handler: F) -> &mut Self
    where
        M: Message,
        F: Fn(M, HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.bind::<M>().spawn(handler)
    }

    /// Starts a binding whose route can be overridden.
    pub fn bind<M: Message>(&mut self) -> Binding<'_, M> {
        Binding {
            builder: self,
            route: M::ROUTE,
            _message: PhantomData,
        }
    }

    /// Registers a console-only command.
    pub fn console_command<F>(
        &mut self,
        prefix: &str,
        signature: &str,
        min_privilege: u8,
        help: &str,
        handler: F,
    ) -> &mut Self
    where
        F: Fn(&[String], &ServerContext) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        self.command(prefix, signature, min_privilege, help, CommandHandler::Console(Arc::new(handler)))
    }

    /// Registers a command that may also be typed in chat.
    pub fn chat_command<F>(
        &mut self,
        prefix: &str,
        signature: &str,
        min_privilege: u8,
        help: &str,
        handler: F,
    ) -> &mut Self
    where
        F: Fn(&[String], Option<&Arc<GameObject>>, &ServerContext) -> anyhow::Result<String>
            + Send
            + Sync
            + 'static,
    {
        self.command(prefix, signature, min_privilege, help, CommandHandler::Chat(Arc::new(handler)))
    }

    fn command(
        &mut self,
        prefix: &str,
        signature: &str,
        min_privilege: u8,
        help: &str,
        handler: CommandHandler,
    ) -> &mut Self {
        self.commands.insert(CommandEntry {
            group: self.group,
            prefix: CompactString::from(prefix),
            signature: CompactString::from(signature),
            min_privilege,
            help: CompactString::from(help),
            handler,
        });
        self
    }

    fn insert(&mut self, entry: HandlerEntry) -> &mut Self {
        let previous = match entry.route {
            MessageKind::Game { message_id } => self.games.insert(message_id, entry.clone()),
            MessageKind::Packet { direction, packet_id } => {
                self.packets.insert((direction, packet_id), entry.clone())
            }
        };
        match previous {
            Some(previous) => warn!(
                "⚠️ {:?} handler {} ({}) from group '{}' overwrote {} from group '{}'",
                entry.route, entry.message, entry.mode, entry.group, previous.message, previous.group
            ),
            None => debug!(
                "🔗 {:?} -> {} ({}) from group '{}'",
                entry.route, entry.message, entry.mode, entry.group
            ),
        }
        self
    }

    /// Bindings collected so far.
    pub fn len(&self) -> usize {
        self.packets.len() + self.games.len() + self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            packets: self.packets,
            games: self.games,
            commands: self.commands,
        }
    }
}

/// A binding under construction; see [`RegistryBuilder::bind`].
pub struct Binding<'a, M> {
    builder: &'a mut RegistryBuilder,
    route: MessageKind,
    _message: PhantomData<fn() -> M>,
}

impl<'a, M: Message> Binding<'a, M> {
    /// Routes a packet type under a different `(direction, packet id)`.
    ///
    /// Game messages are always routed by message id; an override on one is
    /// ignored with a warning.
    pub fn route(mut self, direction: Direction, packet_id: u32) -> Self {
        match M::ROUTE {
            MessageKind::Packet { .. } => {
                self.route = MessageKind::Packet { direction, packet_id };
            }
            MessageKind::Game { message_id } => warn!(
                "⚠️ {} is game message {}, ignoring packet route {}:{} from group '{}'",
                M::NAME,
                message_id,
                direction,
                packet_id,
                self.builder.group
            ),
        }
        self
    }

    pub fn inline<F>(self, handler: F) -> &'a mut RegistryBuilder
    where
        F: Fn(M, HandlerContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        let offset = self.route.payload_offset();
        self.finish(InvocationMode::Inline, move |frame, ctx| {
            let message: M = codec::decode_at(frame, offset)?;
            let handler = handler.clone();
            Ok(Job::Inline(Box::new(move || handler(message, ctx))))
        })
    }

    pub fn background<F>(self, handler: F) -> &'a mut RegistryBuilder
    where
        F: Fn(M, HandlerContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        let offset = self.route.payload_offset();
        self.finish(InvocationMode::Background, move |frame, ctx| {
            let message: M = codec::decode_at(frame, offset)?;
            let handler = handler.clone();
            Ok(Job::Background(Box::new(move || handler(message, ctx))))
        })
    }

    pub fn spawn<F, Fut>(self, handler: F) -> &'a mut RegistryBuilder
    where
        F: Fn(M, HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let offset = self.route.payload_offset();
        self.finish(InvocationMode::Async, move |frame, ctx| {
            let message: M = codec::decode_at(frame, offset)?;
            let handler = handler.clone();
            // The handler itself is called on first poll, inside the task.
            Ok(Job::Async(Box::pin(async move { handler(message, ctx).await })))
        })
    }

    fn finish<I>(self, mode: InvocationMode, invoker: I) -> &'a mut RegistryBuilder
    where
        I: Fn(&[u8], HandlerContext) -> Result<Job, ServerError> + Send + Sync + 'static,
    {
        let entry = HandlerEntry {
            group: self.builder.group,
            message: M::NAME,
            route: self.route,
            mode,
            invoker: Arc::new(invoker),
        };
        self.builder.insert(entry)
    }
}

/// Immutable routing tables produced by [`RegistryBuilder::build`].
#[derive(Default)]
pub struct HandlerRegistry {
    packets: HashMap<(Direction, u32), HandlerEntry>,
    games: HashMap<u16, HandlerEntry>,
    commands: CommandTable,
}

impl HandlerRegistry {
    pub fn packet_handler(&self, direction: Direction, packet_id: u32) -> Option<&HandlerEntry> {
        self.packets.get(&(direction, packet_id))
    }

    pub fn game_handler(&self, message_id: u16) -> Option<&HandlerEntry> {
        self.games.get(&message_id)
    }

    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    pub fn packet_count(&self) -> usize {
        self.packets.len()
    }

    pub fn game_count(&self) -> usize {
        self.games.len()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("packets", &self.packets.len())
            .field("game_messages", &self.games.len())
            .field("commands", &self.commands.len())
            .finish()
    }
}
