//! Handler groups shipped with the server.

pub mod commands;
pub mod connection;
pub mod gameplay;

use std::sync::Arc;

use crate::registry::HandlerGroup;

pub use commands::CommandGroup;
pub use connection::ConnectionGroup;
pub use gameplay::GameplayGroup;

/// Every built-in group, in registration order.
pub fn builtin() -> Vec<Arc<dyn HandlerGroup>> {
    vec![
        Arc::new(ConnectionGroup),
        Arc::new(GameplayGroup),
        Arc::new(CommandGroup),
    ]
}
