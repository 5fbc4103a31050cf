pub mod busy;
pub mod config;
pub mod error;
pub mod gemini;
pub mod intake;
pub mod models;
pub mod report;
pub mod service;
pub mod tasks;
pub mod workspace;

pub use config::GuardianConfig;
pub use error::{GuardianError, ModelError, Result};
pub use gemini::{ChatModel, ContentGenerator, GeminiClient, RigChatModel};
pub use intake::{DocumentInput, DocumentText};
pub use models::*;
pub use service::{AppState, build_router, create_app};
pub use workspace::Workspace;
