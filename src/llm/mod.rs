//! LLM integration for gradeforge.
//!
//! Both stage capabilities talk to a chat-completions model through the
//! [`LlmProvider`] trait:
//!
//! ```ignore
//! use gradeforge::llm::{ChatClient, GenerationRequest, LlmProvider, Message};
//! use std::time::Duration;
//!
//! let client = ChatClient::new("https://api.x.ai/v1", "grok-4-fast-reasoning", Duration::from_secs(120))?;
//! let request = GenerationRequest::with_default_model(vec![Message::user("Hello!")])
//!     .with_temperature(0.4);
//! let response = client.generate(&api_key, request).await?;
//! ```

pub mod client;

pub use client::{
    ChatClient, Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Usage,
};
