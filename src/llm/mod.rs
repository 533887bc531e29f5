//! LLM integration for judge-based scoring.
//!
//! ```ignore
//! use skillbench::llm::{ChatClient, GenerationRequest, LlmProvider, Message};
//!
//! let client = ChatClient::from_env(None, "OPENROUTER_API_KEY")?;
//! let request = GenerationRequest::new(
//!     "anthropic/claude-sonnet-4.5",
//!     vec![Message::system("You are a strict grader."), Message::user("...")],
//! );
//! let response = client.generate(request).await?;
//! ```

pub mod client;

pub use client::{
    ChatClient, Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Usage,
    DEFAULT_API_BASE, DEFAULT_API_KEY_ENV,
};
