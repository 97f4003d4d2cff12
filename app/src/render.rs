//! Plain-text rendering for the terminal.

use relay_core::model::{Health, Session};
use relay_core::{ModelSelection, ProviderDirectory, Role, Transcript};

pub fn render_transcript(transcript: &Transcript) -> String {
    let mut out = String::new();
    for entry in transcript.entries() {
        out.push_str(entry.role.label());
        if entry.pending {
            out.push_str(" (unconfirmed)");
        }
        out.push_str(":\n");
        for line in entry.content.lines() {
            out.push_str("  ");
            out.push_str(line);
            out.push('\n');
        }
        if entry.role == Role::Assistant {
            out.push('\n');
        }
    }
    out
}

pub fn render_session_line(session: &Session) -> String {
    let mut line = format!(
        "{}  {}  {}",
        session.id,
        session.updated_at().format("%Y-%m-%d %H:%M"),
        session.display_title()
    );
    if let Some(url) = session.share_url() {
        line.push_str(&format!("  [{url}]"));
    }
    line
}

pub fn render_session_list(sessions: &[Session]) -> String {
    if sessions.is_empty() {
        return "No sessions yet.\n".to_string();
    }
    sessions
        .iter()
        .map(|session| render_session_line(session) + "\n")
        .collect()
}

pub fn render_models(directory: &ProviderDirectory) -> String {
    if directory.providers.is_empty() {
        return "No providers configured; the server will pick a model.\n".to_string();
    }
    let default = directory.default_selection();
    let mut out = String::new();
    for selection in directory.all_selections() {
        let marker = if Some(&selection) == default.as_ref() {
            "*"
        } else {
            " "
        };
        out.push_str(&format!("{marker} {selection}\n"));
    }
    out
}

pub fn render_health(health: &Health) -> String {
    let state = if health.healthy { "healthy" } else { "unhealthy" };
    format!("opencode server {state} (version {})\n", health.version)
}

pub fn render_selection(selection: Option<&ModelSelection>) -> String {
    match selection {
        Some(selection) => selection.to_string(),
        None => "server default".to_string(),
    }
}
