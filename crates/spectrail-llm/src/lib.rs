//! OpenAI-compatible chat-completions client: the `ChatProvider` trait plus its
//! non-streaming HTTP implementation and retry policy.

pub mod openai;
pub mod provider;
pub mod types;

pub use openai::OpenAiCompatibleProvider;
pub use provider::ChatProvider;
