//! Main Entrypoint for the `voice-session` command
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing logging.
//! 3. Wiring the session controller to the HTTP providers and media transport.
//! 4. Running the requested command until it finishes or Ctrl+C is pressed.

use agent_session_cli::{build_controller, config::Config};
use agent_session_core::{
    SessionController, SessionEvent, SessionState, room::RoomSelection,
};
use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

#[derive(Parser)]
#[command(version, about = "Talk to a conversational agent in a voice room")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the rooms that currently have participants.
    Rooms,
    /// Join a room and stay until Ctrl+C or the server ends the session.
    ///
    /// Without `--room` or `--new` the provider picks the room, which needs
    /// `ALLOW_DEFAULT_ROOM=true`.
    Join {
        /// Name of an existing room.
        #[arg(long, conflicts_with = "new")]
        room: Option<String>,
        /// Name for a new room.
        #[arg(long)]
        new: Option<String>,
    },
    /// List the available microphones.
    Devices,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!(endpoint = %config.connection_endpoint, "Configuration loaded");

    // --- 3. Build the Session Controller ---
    let controller = build_controller(&config).context("Failed to build HTTP client")?;

    // --- 4. Run the Command ---
    match cli.command {
        Command::Rooms => list_rooms(&controller).await,
        Command::Join { room, new } => {
            let selection = match (room, new) {
                (Some(name), _) => RoomSelection::existing(name),
                (None, Some(name)) => RoomSelection::custom(name),
                (None, None) => Ok(RoomSelection::None),
            }
            .context("Invalid room name")?;
            run_session(&controller, selection).await
        }
        Command::Devices => list_devices(&controller).await,
    }
}

async fn list_rooms(controller: &SessionController) -> anyhow::Result<()> {
    let rooms = controller
        .open_picker()
        .await
        .context("Failed to fetch the room directory")?;
    controller.close_picker();

    if rooms.is_empty() {
        println!("No active rooms.");
    }
    for room in rooms {
        println!("{}\t{} participant(s)", room.name, room.participant_count);
    }
    Ok(())
}

async fn list_devices(controller: &SessionController) -> anyhow::Result<()> {
    let inputs = controller
        .devices()
        .input_devices()
        .await
        .context("Failed to enumerate audio inputs")?;

    if inputs.is_empty() {
        println!("No audio inputs available.");
    }
    for input in inputs {
        let marker = if input.is_default { " (default)" } else { "" };
        println!("{}{}", input.name, marker);
    }
    Ok(())
}

async fn run_session(
    controller: &SessionController,
    selection: RoomSelection,
) -> anyhow::Result<()> {
    let mut events = controller.subscribe();

    controller.select_room(selection);
    controller.join().await.context("Failed to join room")?;
    info!("Session started. Press Ctrl+C to leave.");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    warn!(error = %e, "Failed to listen for Ctrl+C");
                }
                info!("Leaving session...");
                controller.leave().await;
                break;
            }
            event = events.recv() => match event {
                Ok(SessionEvent::StateChanged(SessionState::Disconnected)) => {
                    info!("Session ended by the server");
                    break;
                }
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed session events"),
                Err(RecvError::Closed) => break,
            }
        }
    }

    info!("Disconnected.");
    Ok(())
}

fn log_event(event: &SessionEvent) {
    match event {
        SessionEvent::StateChanged(state) => match state.agent_phase() {
            Some(phase) => info!(?phase, "Agent state changed"),
            None => info!(state = state.name(), "Session state changed"),
        },
        SessionEvent::AgentAudio(Some(track)) => info!(track = %track.0, "Agent audio available"),
        SessionEvent::AgentAudio(None) => info!("Agent audio withdrawn"),
        SessionEvent::Alert(err) => error!(error = %err, "Session alert"),
        other => debug!(event = ?other, "Session event"),
    }
}
