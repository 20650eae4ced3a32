pub mod composer;
pub mod templates;

pub use composer::{AnalysisContext, ContextComposer, ContextLimits};
pub use templates::{Prompt, PromptTemplates, EXTRACTION_TEMPERATURE};
