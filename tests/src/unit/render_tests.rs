use relay::{render_session_list, render_transcript};
use relay_core::{MemoryTransport, Orchestrator};
use std::sync::Arc;

#[test]
fn transcript_of_a_fresh_conversation_renders_both_turns() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");
    let transport = MemoryTransport::new();
    transport.set_reply_text("Done.\nNothing else to do.");
    let orchestrator = Orchestrator::new(Arc::new(transport.clone()), "memory://relay");

    let conversation = runtime
        .block_on(orchestrator.start_conversation("tidy the imports", None))
        .expect("conversation");
    assert_eq!(
        render_transcript(conversation.transcript()),
        "You:\n  tidy the imports\nAssistant:\n  Done.\n  Nothing else to do.\n\n"
    );

    let sessions = runtime
        .block_on(orchestrator.browse_sessions())
        .expect("sessions");
    let listing = render_session_list(&sessions);
    assert!(listing.starts_with(conversation.session_id()));
    assert!(listing.trim_end().ends_with("tidy the imports"));
}
