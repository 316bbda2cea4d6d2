pub mod betting;
pub mod clock;
pub mod config;
pub mod error;
pub mod lock_stage;
pub mod memory;
pub mod metrics;
pub mod orchestrator;
pub mod pocketbase;
pub mod points_stage;
pub mod result_stage;
pub mod scoring;
pub mod service;
pub mod stage;
pub mod standings;
pub mod types;
pub mod utils;

use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global fmt subscriber, honouring `RUST_LOG` and falling back to `info`.
pub fn init_tracing() {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}
