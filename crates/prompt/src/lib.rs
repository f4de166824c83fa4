//! Prompt system for Grounded.
//!
//! This crate provides:
//! - YAML-based prompt definitions with a built-in grounded-answer default
//! - Handlebars template rendering
//! - An ordered content-safety validator chain run before retrieval
//! - Regex-based redaction of personal data in questions

pub mod builder;
pub mod guard;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use guard::{
    CrisisValidator, LengthValidator, PiiRedactor, PromptInjectionValidator, Redaction, Validator,
    ValidatorChain, Verdict,
};
pub use loader::{load_prompt, load_prompt_or_default};
pub use types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition, GROUNDED_ANSWER_PROMPT_ID};
