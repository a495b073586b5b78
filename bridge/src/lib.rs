//! Embedding layer for the microscope control panel
//!
//! A desktop shell embeds this crate: it builds a [`MicroscopeController`]
//! over a hardware backend, calls the controller operations from its
//! widgets, and subscribes to the event bus to keep those widgets in sync
//! with the control surface state.

mod api;
mod error;
mod event;
mod settings;
mod state;

pub use api::*;
pub use error::*;
pub use event::*;
pub use settings::*;
pub use state::*;

use std::path::PathBuf;
use std::sync::OnceLock;

/// Keeps the non-blocking file writer alive for the lifetime of the app.
static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Initialize logging for the host application.
///
/// With a directory, logs go to both the console and a daily-rolling file
/// in that directory; otherwise console only. `RUST_LOG` overrides the
/// default filter. Must be called once at startup.
pub fn init_logging(log_directory: Option<PathBuf>) -> Result<(), BridgeError> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_directory {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;

            let file_appender = tracing_appender::rolling::daily(&dir, "microlapse.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            LOG_GUARD.set(guard).ok();

            let console_layer = fmt::layer().with_target(false).with_ansi(true);
            let file_layer = fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(non_blocking);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .with(file_layer)
                .try_init()
                .map_err(|e| BridgeError::Internal(e.to_string()))?;

            tracing::info!("Microlapse initialized with file logging in {}", dir.display());
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_target(false))
                .try_init()
                .map_err(|e| BridgeError::Internal(e.to_string()))?;

            tracing::info!("Microlapse initialized (console logging only)");
        }
    }

    Ok(())
}
