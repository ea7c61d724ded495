pub mod connection;

pub use connection::{ClientState, ReconnectPolicy};
