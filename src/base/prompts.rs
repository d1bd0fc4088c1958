//! Prompt templates for LLM usage.

/// Default system instructions, overridable via `SYSTEM_INSTRUCTIONS`.
pub const DEFAULT_SYSTEM_INSTRUCTIONS: &str = "You are a helpful assistant.";

/// Fixed preamble for the synthesized system turn that carries retrieved
/// passages. Passage texts follow, separated by blank lines.
pub const RETRIEVAL_CONTEXT_PREAMBLE: &str =
    "Use the following reference passages when they are relevant to the user's question.\n\n";
