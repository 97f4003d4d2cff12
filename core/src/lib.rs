pub mod config;
pub mod conversation;
pub mod model;
pub mod parts;
pub mod providers;
pub mod telemetry;
pub mod transport;

pub use config::{ConfigError, ServerSettings};
pub use conversation::{
    Conversation, ConversationError, ConversationPhase, Orchestrator, PhaseListener, Transcript,
    TranscriptEntry,
};
pub use model::{Health, Message, Role, Session};
pub use parts::{extract_text, Part};
pub use providers::{ModelSelection, ProviderDirectory};
pub use transport::{AgentTransport, ClientError, HttpTransport, MemoryTransport};
