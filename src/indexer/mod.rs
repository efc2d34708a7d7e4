pub mod core;
pub mod pdf;
pub mod splitter;

pub use self::core::{IndexReport, Indexer, document_key};
pub use pdf::{Page, load_pages};
pub use splitter::TextSplitter;
