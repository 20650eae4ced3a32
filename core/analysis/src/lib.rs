pub mod analyzer;
pub mod error;
pub mod llm;
pub mod reconciler;
pub mod response;

pub use analyzer::Analyzer;
pub use error::{AnalysisError, AnalysisResult};
pub use llm::{connect, ChatModel, LlmConfig, LlmProvider};
