pub mod connection;
pub mod handler;
pub mod protocol;

pub use handler::ws_handler;
pub use protocol::{ClientMessage, ServerMessage};
