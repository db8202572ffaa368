pub use llm::{LlmBridge, LlmClient};
pub use server::{router, ApiError, AppState};

pub mod llm;
pub mod server;
