use client_core::{
    learning::StatusTone,
    mapping_editor::{GestureRow, VoiceRow},
    ClientEvent,
};
use shared::domain::{ActionName, NO_ACTION_LABEL};

/// One terminal line per event; `None` for events not worth printing.
pub fn render_event(event: &ClientEvent) -> Option<String> {
    let line = match event {
        ClientEvent::ChannelConnected => "[channel] connected".to_string(),
        ClientEvent::ChannelClosed => "[channel] closed".to_string(),
        ClientEvent::ModeChanged { mode, enabled } => {
            format!("[{mode}] {}", if *enabled { "ON" } else { "OFF" })
        }
        ClientEvent::ModesSynced { .. } => return None,
        ClientEvent::ModeStatus { mode, status_line } => format!("[{mode}] {status_line}"),
        ClientEvent::GestureRecognized { summary, .. } => summary.clone(),
        ClientEvent::VoiceRecognized { summary, .. } => summary.clone(),
        ClientEvent::StatsUpdated(stats) => format!(
            "[stats] gestures={} commands={} actions={}",
            stats.gestures_recognized, stats.commands_recognized, stats.actions_triggered
        ),
        ClientEvent::VideoFrame(_) => return None,
        ClientEvent::Learning(panel) => {
            let tag = match panel.tone {
                StatusTone::Neutral => return None,
                StatusTone::Learning => "learning",
                StatusTone::Success => "learned",
                StatusTone::Error => "learn failed",
            };
            format!("[{tag}] {}", panel.status_message)
        }
        ClientEvent::ViewRequested(tab) => format!("[view] {tab:?}"),
        ClientEvent::MappingReloaded => "[mapping] reloaded".to_string(),
        ClientEvent::Info(message) => message.clone(),
        ClientEvent::Error(message) => format!("error: {message}"),
    };
    Some(line)
}

fn action_label(action: Option<&ActionName>) -> &str {
    action.map_or(NO_ACTION_LABEL, ActionName::as_str)
}

pub fn render_gesture_table(rows: &[GestureRow]) -> String {
    let width = rows.iter().map(|row| row.label.len()).max().unwrap_or(0);
    rows.iter()
        .map(|row| {
            let marker = if row.deletable { "  [deletable]" } else { "" };
            format!(
                "{:<width$}  {:<16} key={}{marker}",
                row.label,
                action_label(row.selected.as_ref()),
                row.key
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_voice_table(rows: &[VoiceRow]) -> String {
    let width = rows.iter().map(|row| row.command_text.len()).max().unwrap_or(0);
    rows.iter()
        .map(|row| {
            format!(
                "{:<width$}  {}",
                row.command_text,
                action_label(row.selected.as_ref())
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parses an action argument; `None` (any case) clears the binding.
pub fn parse_action(raw: &str) -> Option<ActionName> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case(NO_ACTION_LABEL) || raw == "null" {
        None
    } else {
        Some(ActionName::new(raw))
    }
}
