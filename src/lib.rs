//! # pdfchat — chat with a PDF
//!
//! Indexes a PDF into an in-memory vector store and answers questions about
//! it with a streamed, retrieval-grounded chat model.
//!
//! ## Architecture
//!
//! - **[`config`]** — JSON configuration and Azure OpenAI credentials from the environment
//! - **[`db`]** — SQLite + sqlite-vec vector store (documents, chunks, similarity search)
//! - **[`embedder`]** — Text embedding via Azure OpenAI, plus a deterministic mock
//! - **[`indexer`]** — PDF page extraction, recursive text splitting, batch embedding
//! - **[`chat`]** — Retrieval, prompt assembly, streamed completions and the turn handler

mod azure;
pub mod chat;
pub mod config;
pub mod db;
pub mod embedder;
pub mod indexer;
