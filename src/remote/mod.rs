pub mod client;
pub mod decoder;
pub mod event_stream;
pub mod literal;
pub mod poller;
pub mod transport;
pub mod types;
