//! # Local Table Example
//!
//! Runs a whole round on one machine with [`LocalClient`]:
//!
//! 1. Connect as Ann and seat three bots
//! 2. Ready up (the bots follow automatically)
//! 3. Start the round and play whenever it is Ann's turn
//! 4. Watch the bots take their turns after their think delay
//!
//! ## Running
//!
//! ```sh
//! cargo run --example local_table
//!
//! # See every dispatch and bot scheduling decision:
//! RUST_LOG=card_room_sync=debug cargo run --example local_table
//! ```

mod shared;

use std::sync::Arc;

use card_room_sync::{ConnectOptions, CurrentUser, LocalClient, Phase, RoomIntents, SyncConfig};
use tokio::sync::watch;

use shared::{GoAround, ENGINE_ID};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Client ──────────────────────────────────────────────────────
    let client = LocalClient::new(Arc::new(GoAround::new(12)), SyncConfig::new());

    // Forward every committed state into a watch channel for the main loop.
    let (tx, mut states) = watch::channel(client.state());
    let _sub = client.subscribe(move |state| {
        let _ = tx.send(Arc::clone(state));
    });

    client.connect(
        &ConnectOptions::new()
            .with_engine_id(ENGINE_ID)
            .with_user(CurrentUser::new("ann", "Ann")),
    )?;

    for name in ["Ada", "Bo", "Cy"] {
        client.add_bot(Some(name)).await?;
    }
    client.toggle_ready().await?;
    client.start_game().await?;

    // ── Play ────────────────────────────────────────────────────────
    loop {
        let state = Arc::clone(&states.borrow_and_update());
        let plays = state.extra.get("plays").cloned().unwrap_or_default();
        match state.phase {
            Phase::Finished => {
                tracing::info!(%plays, "round over");
                break;
            }
            Phase::Playing if state.current_turn.as_deref() == Some("ann") => {
                tracing::info!(%plays, "Ann plays a card");
                client.play_card("ann-card", None).await?;
                continue;
            }
            Phase::Playing => {
                tracing::info!(turn = ?state.current_turn, %plays, "waiting for bot");
            }
            Phase::RoomLobby => {}
        }
        states.changed().await?;
    }

    client.disconnect();
    Ok(())
}
