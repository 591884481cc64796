use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    config::{load_client_config, ClientConfig},
    mapping_editor::DeleteOutcome,
    ClientEvent, ControlClient,
};
use shared::domain::RecognitionMode;
use tokio::task::JoinHandle;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

mod render;

const MODE_SYNC_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "hci-console", about = "Terminal control surface for the gesture/voice server")]
struct Cli {
    /// Client config file (defaults to ./hci_client.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    poll_interval_ms: Option<u64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream live recognition events until Ctrl-C.
    Watch {
        #[arg(long)]
        gesture: bool,
        #[arg(long)]
        voice: bool,
    },
    /// List the actions the server can trigger.
    Actions,
    /// Print gesture and voice mappings.
    Show,
    /// Bind a gesture to an action ("None" clears it) and save.
    SetGesture { key: String, action: String },
    /// Bind a voice command to an action ("None" clears it) and save.
    SetVoice { key: String, action: String },
    /// Show recognition settings, or update the given fields.
    Settings {
        #[arg(long)]
        camera_index: Option<i64>,
        #[arg(long)]
        camera_width: Option<i64>,
        #[arg(long)]
        camera_height: Option<i64>,
        #[arg(long)]
        gesture_cooldown: Option<f64>,
        #[arg(long)]
        voice_cooldown: Option<f64>,
    },
    /// Delete a custom gesture.
    Delete {
        key: String,
        #[arg(long)]
        yes: bool,
    },
    /// Learn a new custom gesture from the camera.
    Learn { name: String },
}

fn resolve_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = load_client_config(cli.config.as_deref())?;
    if let Some(server_url) = &cli.server_url {
        config.server_url = server_url.clone();
    }
    if let Some(poll_interval_ms) = cli.poll_interval_ms {
        config.poll_interval_ms = poll_interval_ms;
    }
    Ok(config)
}

fn spawn_event_printer(client: &ControlClient) -> JoinHandle<()> {
    let mut events = BroadcastStream::new(client.subscribe_events());
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => {
                    if let Some(line) = render::render_event(&event) {
                        println!("{line}");
                    }
                }
                Err(err) => debug!("console: event stream lagged: {err}"),
            }
        }
    })
}

/// Waits for the server's initial toggle snapshot so a local toggle is not
/// overwritten by it.
async fn wait_for_mode_sync(events: &mut tokio::sync::broadcast::Receiver<ClientEvent>) {
    let synced = tokio::time::timeout(MODE_SYNC_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(ClientEvent::ModesSynced { .. }) => return,
                Ok(_) | Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
            }
        }
    })
    .await;
    if synced.is_err() {
        debug!("console: no mode snapshot from server, continuing");
    }
}

fn confirm_on_stdin(prompt: &str) -> bool {
    print!("{prompt} [y/N] ");
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim(), "y" | "Y" | "yes" | "Yes")
}

async fn run(client: Arc<ControlClient>, command: Command) -> Result<()> {
    let editor = client.editor();
    match command {
        Command::Watch { gesture, voice } => {
            let mut sync = client.subscribe_events();
            client.start().await?;
            wait_for_mode_sync(&mut sync).await;
            for (mode, wanted) in [
                (RecognitionMode::Gesture, gesture),
                (RecognitionMode::Voice, voice),
            ] {
                if wanted && !client.channel().is_enabled(mode).await {
                    client.set_mode(mode, true).await?;
                }
            }
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for Ctrl-C")?;
            let stats = client.channel().stats().await;
            println!(
                "gestures={} commands={} actions={}",
                stats.gestures_recognized, stats.commands_recognized, stats.actions_triggered
            );
        }
        Command::Actions => {
            editor.reload().await?;
            let catalog = editor.catalog().await;
            if catalog.is_empty() {
                println!("The server offers no actions.");
            }
            for action in catalog.actions {
                println!("{action}");
            }
        }
        Command::Show => {
            editor.reload().await?;
            println!("Gestures:\n{}", render::render_gesture_table(&editor.gesture_rows().await));
            println!("\nVoice commands:\n{}", render::render_voice_table(&editor.voice_rows().await));
        }
        Command::SetGesture { key, action } => {
            editor.reload().await?;
            editor
                .select_gesture_action(&key, render::parse_action(&action))
                .await?;
            editor.save_gesture_mappings().await?;
        }
        Command::SetVoice { key, action } => {
            editor.reload().await?;
            editor
                .select_voice_action(&key, render::parse_action(&action))
                .await?;
            editor.save_voice_mappings().await?;
        }
        Command::Settings {
            camera_index,
            camera_width,
            camera_height,
            gesture_cooldown,
            voice_cooldown,
        } => {
            editor.reload().await?;
            let mut settings = editor.settings().await?;
            let before = settings.clone();
            if let Some(value) = camera_index {
                settings.camera_index = value;
            }
            if let Some(value) = camera_width {
                settings.camera_width = value;
            }
            if let Some(value) = camera_height {
                settings.camera_height = value;
            }
            if let Some(value) = gesture_cooldown {
                settings.gesture_cooldown = value;
            }
            if let Some(value) = voice_cooldown {
                settings.voice_cooldown = value;
            }
            if settings != before {
                editor.save_settings(&settings).await?;
            }
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        Command::Delete { key, yes } => {
            editor.reload().await?;
            let outcome = editor
                .delete_custom_gesture(&key, |prompt| yes || confirm_on_stdin(prompt))
                .await?;
            if outcome == DeleteOutcome::Cancelled {
                println!("Nothing deleted.");
            }
        }
        Command::Learn { name } => {
            let mut sync = client.subscribe_events();
            client.start().await?;
            wait_for_mode_sync(&mut sync).await;
            if !client.channel().is_enabled(RecognitionMode::Gesture).await {
                client.set_mode(RecognitionMode::Gesture, true).await?;
            }
            client.learn_gesture(&name).await?;
            client.learning().wait_for_completion().await;
            let session = client.learning().session().await;
            if let Some(session) = session.filter(|session| !session.state.is_active()) {
                if session.state != client_core::learning::LearningState::Succeeded {
                    bail!("learning '{}' failed: {}", session.gesture_name, session.last_message);
                }
            }
            println!("Gestures:\n{}", render::render_gesture_table(&editor.gesture_rows().await));
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    let client = ControlClient::new(config)?;
    let printer = spawn_event_printer(&client);

    let result = run(Arc::clone(&client), cli.command).await;
    client.shutdown().await;
    // Let queued events reach the terminal before exiting.
    tokio::time::sleep(Duration::from_millis(50)).await;
    printer.abort();

    if let Err(err) = &result {
        warn!("console: command failed: {err:#}");
    }
    result
}
