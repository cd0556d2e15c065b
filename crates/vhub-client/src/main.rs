//! Headless chat client: restores the stored session, mounts the chat screen
//! and prints view events as JSON lines until interrupted.

use anyhow::{bail, Context};
use tracing::info;

use vhub_client::{init_tracing, App, ClientConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = ClientConfig::from_env();
    info!(?config, "Loaded configuration");

    let app = App::open(config).context("failed to open local store")?;
    let Some(user) = app.restore_session().await else {
        bail!("no valid session stored; sign in from the web client first");
    };
    info!(user = %user.id.short(), role = ?user.role, "Session restored");

    let (screen, mut events) = app
        .chat_screen()
        .await
        .context("failed to open chat screen")?;
    println!("{}", serde_json::to_string(&screen.snapshot().await)?);

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                println!("{}", serde_json::to_string(&event)?);
                if event == vhub_client::ChatEvent::SessionExpired {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    screen.unmount().await;
    info!("Chat client stopped");
    Ok(())
}
