pub mod config;
pub mod errors;
pub mod perception;
pub mod remote;

pub use crate::perception::types::DetectionElement;
pub use crate::remote::client::RemoteJobClient;
pub use crate::remote::types::{JobFailure, JobRequest, PollOutcome};

/// Install the global fmt subscriber. Filter comes from `RUST_LOG`, default `info`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}
