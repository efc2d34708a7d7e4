use super::{Db, serialize_vector};
use rusqlite::{Result, params};

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub document_name: String,
    pub chunk_content: String,
    pub page_label: Option<String>,
    pub similarity: f64,
    pub position: usize,
}

fn map_search_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SearchResult> {
    let distance: f64 = row.get(4)?;
    let similarity = 1.0 - (distance / 2.0);

    Ok(SearchResult {
        document_name: row.get(0)?,
        chunk_content: row.get(1)?,
        page_label: row.get(2)?,
        position: row.get::<_, i64>(3)? as usize,
        similarity,
    })
}

impl Db {
    /// Perform vector similarity search over one document's chunks using
    /// cosine distance.
    ///
    /// Results are ordered nearest first; equal distances keep insertion order.
    pub fn search(
        &self,
        filename: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT
                d.filename,
                c.content,
                c.page_label,
                c.position,
                vec_distance_cosine(v.embedding, ?) as distance
            FROM vec_chunks v
            JOIN chunks c ON v.rowid = c.id
            JOIN documents d ON c.document_id = d.id
            WHERE d.filename = ?
            ORDER BY distance ASC, c.id ASC
            LIMIT ?
            "#,
        )?;

        let rows = stmt.query_map(
            params![serialize_vector(query_vector), filename, top_k as i64],
            map_search_row,
        )?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }

        Ok(results)
    }
}
