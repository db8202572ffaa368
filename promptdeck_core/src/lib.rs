pub use catalog::{Catalog, CatalogError, PromptRecord};
pub use chain::{
    ActiveChainState, ChainAdvance, ChainDefinition, ChainEngine, ChainError, ChainRegistry,
    StepProgress, StepStatus,
};
pub use config::{AnimationStrategy, Config, ProviderAuth, ProviderConfig, ProviderKind};
pub use controller::{
    Card, CardMode, ChatSession, ExpandMode, SendOutcome, TransitionOutcome, ViewController,
};
pub use layout::{GridMetrics, Rect};
pub use markdown::format_markdown;
pub use recent::{RecentEntry, RecentPrompts};
pub use redaction::redact_sensitive_text;
pub use relay::{ChatRequest, HttpRelay, Relay, RelayError, UploadFile, UploadReceipt};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};
pub use suggestions::Suggestion;
pub use transcript::{ChatMessage, Sender, Transcript, TranscriptExport};

pub mod animation;
pub mod catalog;
pub mod chain;
pub mod config;
pub mod controller;
pub mod layout;
pub mod markdown;
pub mod recent;
pub mod redaction;
pub mod relay;
pub mod store;
pub mod suggestions;
pub mod transcript;
