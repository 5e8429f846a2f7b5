//! Concrete text-generation providers.

pub mod openai;

pub use openai::{Flavor, GROQ_API_BASE, OpenAiProvider};
