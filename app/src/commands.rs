use crate::render;
use anyhow::Result;
use relay_core::{Conversation, ConversationError, ModelSelection, Orchestrator};
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info};

/// Uses `requested` when given, otherwise asks the server for its default.
pub async fn pick_model(
    orchestrator: &Orchestrator,
    requested: Option<ModelSelection>,
) -> Result<Option<ModelSelection>> {
    if requested.is_some() {
        return Ok(requested);
    }
    let resolved = orchestrator.resolve_default_model().await?;
    debug!(model = %render::render_selection(resolved.as_ref()), "resolved default model");
    Ok(resolved)
}

pub async fn health(orchestrator: &Orchestrator) -> Result<String> {
    match orchestrator.health().await {
        Ok(health) => Ok(render::render_health(&health)),
        Err(ConversationError::ServerUnavailable { base_url }) => {
            Ok(format!("opencode server not reachable at {base_url}\n"))
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn ask(
    orchestrator: &Orchestrator,
    prompt: &str,
    model: Option<ModelSelection>,
) -> Result<String> {
    let model = pick_model(orchestrator, model).await?;
    let conversation = orchestrator.start_conversation(prompt, model.as_ref()).await?;
    Ok(format!(
        "{}session {}\n",
        render::render_transcript(conversation.transcript()),
        conversation.session_id()
    ))
}

pub async fn sessions(orchestrator: &Orchestrator) -> Result<String> {
    let sessions = orchestrator.browse_sessions().await?;
    Ok(render::render_session_list(&sessions))
}

pub async fn show(orchestrator: &Orchestrator, session_id: &str, limit: Option<u32>) -> Result<String> {
    let conversation = orchestrator.open_session(session_id, limit).await?;
    Ok(format!(
        "{}\n\n{}",
        render::render_session_line(conversation.session()),
        render::render_transcript(conversation.transcript())
    ))
}

pub async fn delete(orchestrator: &Orchestrator, session_id: &str) -> Result<String> {
    orchestrator.delete_session_by_id(session_id).await?;
    Ok(format!("deleted {session_id}\n"))
}

pub async fn abort(orchestrator: &Orchestrator, session_id: &str) -> Result<String> {
    let aborted = orchestrator.abort_by_id(session_id).await?;
    Ok(if aborted {
        format!("aborted {session_id}\n")
    } else {
        format!("nothing to abort in {session_id}\n")
    })
}

pub async fn models(orchestrator: &Orchestrator) -> Result<String> {
    let directory = orchestrator.providers().await?;
    Ok(render::render_models(&directory))
}

/// Interactive loop: each input line is a prompt; `/quit`, `/abort` and
/// `/delete` control the session.
///
/// Errors from individual prompts are printed and the loop keeps going.
pub async fn chat<R, W>(
    orchestrator: &Orchestrator,
    input: R,
    out: &mut W,
    session_id: Option<&str>,
    model: Option<ModelSelection>,
) -> Result<Option<Conversation>>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let model = pick_model(orchestrator, model).await?;
    let mut conversation = match session_id {
        Some(id) => {
            let opened = orchestrator.open_session(id, None).await?;
            write!(out, "{}", render::render_transcript(opened.transcript()))?;
            Some(opened)
        }
        None => None,
    };
    writeln!(out, "model: {}", render::render_selection(model.as_ref()))?;

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" => break,
            "/abort" | "/delete" => {
                let Some(active) = conversation.as_mut() else {
                    writeln!(out, "no active session")?;
                    continue;
                };
                let session_id = active.session_id().to_string();
                let deleting = line == "/delete";
                let outcome = if deleting {
                    orchestrator.delete_session(active).await.map(|_| "deleted")
                } else {
                    orchestrator.abort(active).await.map(|_| "aborted")
                };
                match outcome {
                    Ok(done) => {
                        writeln!(out, "{done} {session_id}")?;
                        // The next prompt starts a fresh session.
                        if deleting {
                            conversation = None;
                        }
                    }
                    Err(err) => writeln!(out, "error: {}", err.user_message())?,
                }
                continue;
            }
            _ => {}
        }

        let before = conversation
            .as_ref()
            .map(|c| c.transcript().len())
            .unwrap_or_default();
        let result = if let Some(active) = conversation.as_mut() {
            orchestrator
                .continue_conversation(active, line, model.as_ref())
                .await
        } else {
            match orchestrator.start_conversation(line, model.as_ref()).await {
                Ok(started) => {
                    info!(session_id = started.session_id(), "chat session started");
                    conversation = Some(started);
                    Ok(())
                }
                Err(err) => Err(err),
            }
        };
        match result {
            Ok(()) => {
                if let Some(active) = conversation.as_ref() {
                    if let Some(reply) = active.transcript().entries().get(before + 1) {
                        writeln!(out, "{}", reply.content)?;
                    }
                }
            }
            Err(err) => writeln!(out, "error: {}", err.user_message())?,
        }
    }
    Ok(conversation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::transport::TransportCall;
    use relay_core::MemoryTransport;
    use std::sync::Arc;

    fn orchestrator(transport: &MemoryTransport) -> Orchestrator {
        Orchestrator::new(Arc::new(transport.clone()), "memory://relay")
    }

    #[tokio::test]
    async fn chat_starts_then_continues() {
        let transport = MemoryTransport::new();
        let mut out = Vec::new();
        let input: &[u8] = b"hello\n\nsecond\n/quit\nignored\n";
        let conversation = chat(&orchestrator(&transport), input, &mut out, None, None)
            .await
            .expect("chat")
            .expect("conversation");

        let printed = String::from_utf8(out).unwrap();
        assert_eq!(printed, "model: server default\necho: hello\necho: second\n");
        assert_eq!(conversation.transcript().len(), 4);
        let sends = transport
            .calls()
            .into_iter()
            .filter(|call| matches!(call, TransportCall::SendMessage { .. }))
            .count();
        assert_eq!(sends, 2);
    }

    #[tokio::test]
    async fn chat_reports_errors_and_keeps_going() {
        let transport = MemoryTransport::new();
        let mut out = Vec::new();
        let input: &[u8] = b"/abort\nfirst\n/delete\n/abort\n";
        let conversation = chat(&orchestrator(&transport), input, &mut out, None, None)
            .await
            .unwrap();

        let printed = String::from_utf8(out).unwrap();
        assert_eq!(printed.matches("no active session").count(), 2);
        assert!(printed.contains("echo: first"));
        assert!(printed.contains("deleted ses_"));
        assert!(conversation.is_none());
        assert!(transport.session_ids().is_empty());
    }

    #[tokio::test]
    async fn chat_starts_a_new_session_after_delete() {
        let transport = MemoryTransport::new();
        let mut out = Vec::new();
        let input: &[u8] = b"first\n/delete\nnew topic\n";
        let conversation = chat(&orchestrator(&transport), input, &mut out, None, None)
            .await
            .unwrap()
            .unwrap();

        let printed = String::from_utf8(out).unwrap();
        assert!(!printed.contains("error:"));
        assert!(printed.ends_with("echo: new topic\n"));
        assert!(!conversation.is_closed());
        assert_eq!(conversation.transcript().entries()[0].content, "new topic");
        assert_eq!(transport.session_ids(), vec![conversation.session_id().to_string()]);
        let creates = transport
            .calls()
            .into_iter()
            .filter(|call| matches!(call, TransportCall::CreateSession { .. }))
            .count();
        assert_eq!(creates, 2);
    }

    #[tokio::test]
    async fn ask_pins_the_default_model() {
        let directory = serde_json::from_str(
            r#"{"providers":[{"id":"A","models":{"m1":{"id":"m1"}}}],"default":{}}"#,
        )
        .unwrap();
        let transport = MemoryTransport::new().with_providers(directory);
        let printed = ask(&orchestrator(&transport), "ping", None).await.unwrap();
        assert!(printed.starts_with("You:\n  ping\nAssistant:\n  echo: ping\n"));
        assert!(transport.calls().iter().any(|call| matches!(
            call,
            TransportCall::SendMessage { model: Some(model), .. } if model.to_string() == "A/m1"
        )));
    }

    #[tokio::test]
    async fn health_reports_unreachable_server_without_failing() {
        let transport = MemoryTransport::new();
        transport.set_unreachable(true);
        let printed = health(&orchestrator(&transport)).await.unwrap();
        assert_eq!(printed, "opencode server not reachable at memory://relay\n");
    }
}
