//! Answer generation from retrieved context.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::Result;

/// A lazily pulled stream of answer fragments.
///
/// Dropping the stream stops further fragments from being requested.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Instructions placed ahead of the retrieved passages.
pub const SYSTEM_PROMPT: &str = "You are a helpful reading assistant who answers questions \
based on snippets of text provided in context. Answer only using the context provided, \
being as concise as possible. If you're unsure, just say that you don't know.\nContext:\n";

/// Build the system prompt for a question from ranked passages.
///
/// Passages are newline-delimited. With no passages the prompt still
/// instructs the model to admit it does not know.
pub fn build_system_prompt(context: &[String]) -> String {
    let mut prompt = String::from(SYSTEM_PROMPT);
    prompt.push_str(&context.join("\n"));
    prompt
}

/// A language model that streams an answer for a question and its context.
///
/// # Example
///
/// ```rust,ignore
/// use futures::StreamExt;
/// use docqa_rag::GenerationProvider;
///
/// let mut answer = generator.generate("Who wrote it?", context.passages()).await?;
/// while let Some(fragment) = answer.next().await {
///     print!("{}", fragment?);
/// }
/// ```
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Start generating an answer. Errors before the first fragment are
    /// returned directly; later errors arrive as stream items.
    async fn generate(&self, question: &str, context: &[String]) -> Result<TextStream>;
}
