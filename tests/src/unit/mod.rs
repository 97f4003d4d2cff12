mod config_tests;
mod conversation_tests;
mod transport_tests;
mod render_tests;
