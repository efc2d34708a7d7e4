/// A chunk ready for insertion, borrowed from the indexer's buffers.
#[derive(Debug, Clone)]
pub struct Chunk<'a> {
    pub position: usize,
    pub content: &'a str,
    pub page_label: Option<&'a str>,
}
