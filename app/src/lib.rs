pub mod host;
pub mod render;

pub use host::{run_chat_turn, run_listen, Host};
pub use render::{ChatPrinter, TranscriptPrinter};
