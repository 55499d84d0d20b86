//! Access to generative models used to confirm duplicates and repair tags.

mod gemini;
mod prompts;
mod provider;
mod types;

pub use gemini::{GeminiProvider, DEFAULT_GEMINI_BASE_URL};
pub use prompts::{
    duplicate_check_prompt, metadata_fix_prompt, parse_duplicate_verdicts,
    parse_metadata_suggestion, strip_code_fences, DuplicateVerdict, MetadataSuggestion,
};
pub use provider::{AiSettings, GeminiProviderFactory, LlmProvider, ProviderFactory};
pub use types::{CompletionOptions, LlmError};
