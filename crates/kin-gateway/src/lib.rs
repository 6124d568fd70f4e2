pub mod connection;
pub mod dispatcher;
pub mod handshake;
pub mod rooms;
pub mod session;
