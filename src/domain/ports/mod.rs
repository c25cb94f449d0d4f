//! Domain ports (interfaces) for the orchestration substrate.

pub mod env;
pub mod inference;
pub mod memory_store;

pub use env::EnvProvider;
pub use inference::{
    ChatMessage, ChatOptions, ChatResponse, ChatRole, ChatUsage, InferenceClient,
};
pub use memory_store::{SharedMemoryStore, Subscription};
