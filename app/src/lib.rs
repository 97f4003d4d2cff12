pub mod commands;
pub mod render;

pub use render::{render_models, render_session_list, render_transcript};
