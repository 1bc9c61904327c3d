pub mod client;
pub mod finalize;
pub mod orchestrator;
pub mod timewindow;

pub use client::{ChatClient, ToolChoice};
pub use orchestrator::ask_with_tools;
