//! Prompt types for Grounded.
//!
//! This module defines the domain entities for the prompt system.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifier of the built-in grounded answer prompt.
pub const GROUNDED_ANSWER_PROMPT_ID: &str = "grounded.answer";

const GROUNDED_ANSWER_SYSTEM: &str =
    "You are a helpful assistant that answers questions based on the provided context.";

const GROUNDED_ANSWER_TEMPLATE: &str = "Instructions:
- Answer the question based ONLY on the provided context
- If the context doesn't contain enough information, say so
- Always cite your sources using the format [Source N], where N is the number shown in the context
- Be concise but thorough

Context:
{{context}}

Question: {{question}}

Answer (with citations):";

/// A prompt definition loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDefinition {
    /// Unique prompt identifier
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// API version for schema evolution
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Optional system message sent alongside the rendered template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Variables the template requires; rendering fails if one is missing
    #[serde(default = "default_inputs")]
    pub inputs: Vec<String>,

    /// Template string with Handlebars syntax
    pub template: String,

    /// Sampling temperature for the generation call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

fn default_inputs() -> Vec<String> {
    vec!["context".to_string(), "question".to_string()]
}

impl PromptDefinition {
    /// The built-in prompt that asks for an answer grounded in `{{context}}`
    /// with `[Source N]` citations.
    pub fn grounded_answer() -> Self {
        Self {
            id: GROUNDED_ANSWER_PROMPT_ID.to_string(),
            title: "Grounded answer with citations".to_string(),
            api_version: "1.0".to_string(),
            system: Some(GROUNDED_ANSWER_SYSTEM.to_string()),
            inputs: default_inputs(),
            template: GROUNDED_ANSWER_TEMPLATE.to_string(),
            temperature: Some(0.2),
        }
    }
}

/// A fully built prompt ready for LLM execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPrompt {
    /// System message (optional)
    pub system: Option<String>,

    /// User message (required)
    pub user: String,

    /// Metadata about the built prompt
    pub metadata: BuiltPromptMetadata,
}

/// Metadata about a built prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPromptMetadata {
    /// Source prompt ID
    #[serde(rename = "sourcePromptId")]
    pub source_prompt_id: String,

    /// Sampling temperature requested by the definition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Template variables that were resolved
    #[serde(rename = "resolvedVariables")]
    pub resolved_variables: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_definition_deserialization() {
        let yaml = r#"
id: support.answer
title: Support answer
apiVersion: "1.0"
system: "You answer support questions."
template: "{{context}}\n\nQ: {{question}}"
"#;

        let def: PromptDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(def.id, "support.answer");
        assert_eq!(def.system.as_deref(), Some("You answer support questions."));
        assert_eq!(def.inputs, vec!["context", "question"]);
        assert_eq!(def.temperature, None);
    }

    #[test]
    fn test_grounded_answer_mentions_citations() {
        let def = PromptDefinition::grounded_answer();
        assert_eq!(def.id, GROUNDED_ANSWER_PROMPT_ID);
        assert!(def.template.contains("[Source N]"));
        assert!(def.template.contains("{{context}}"));
        assert!(def.template.contains("{{question}}"));
    }
}
