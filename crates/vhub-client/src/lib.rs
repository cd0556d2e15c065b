//! # vhub-client
//!
//! Chat synchronization for the volunteer-hub web client: conversation
//! directory, message threads, reply composer and manager broadcasts, kept
//! in sync with the REST backend and the push channel.

pub mod app;
mod bridge;
pub mod broadcast;
pub mod chat;
pub mod composer;
pub mod config;
pub mod directory;
pub mod error;
pub mod events;
pub mod session;
pub mod thread;

#[cfg(test)]
pub(crate) mod testing;

pub use app::App;
pub use chat::{ChatOptions, ChatScreen, ChatSnapshot};
pub use config::ClientConfig;
pub use error::{ChatError, ValidationError};
pub use events::{ChatEvent, EventSink};
pub use session::{SessionHandle, SessionStore};

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter. Calling it twice is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("vhub_client=debug,vhub_net=debug,vhub_store=info,warn")
    });

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
