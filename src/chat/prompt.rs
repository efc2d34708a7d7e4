//! Context and system-instruction assembly.

use super::retriever::RetrievedChunk;

/// Shown in place of a missing page label.
pub const NO_LOCATOR: &str = "N/A";

/// `📄 {text}` then `📘 Page: {label}` on the next line.
pub fn format_fragment(chunk: &RetrievedChunk) -> String {
    format!(
        "📄 {}\n📘 Page: {}",
        chunk.content,
        chunk.page_label().unwrap_or(NO_LOCATOR)
    )
}

/// Joins fragments with a blank line, keeping retrieval order.
pub fn build_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(format_fragment)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// The system instruction that grounds the model in `context`.
pub fn system_prompt(context: &str) -> String {
    format!(
        "You are a helpful assistant answering questions about a PDF document.\n\
         Use only the following context to answer the user's question.\n\
         When the user asks where something is, return all the page numbers \
         related to the keyword given.\n\
         If the user asks for a summary, return the summary.\n\
         \n\
         Context:\n{context}"
    )
}
