// Library interface for finbrief modules
// This allows tests and the binary to import modules

pub mod affiliate;
pub mod analyzer;
pub mod archive;
pub mod collector;
pub mod llm;
pub mod mailer;
pub mod messenger;
pub mod model;
pub mod pipeline;
pub mod render;
pub mod server;
pub mod subscribers;
