use super::{Db, models::Chunk, serialize_vector};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Result, params};
use std::collections::HashMap;

impl Db {
    /// Returns a map of filename -> modified_at for all indexed documents
    pub fn list_documents(&self) -> Result<HashMap<String, DateTime<Utc>>> {
        let mut stmt = self
            .conn
            .prepare("SELECT filename, modified_at FROM documents")?;
        let rows = stmt.query_map([], |row| {
            let filename: String = row.get(0)?;
            let modified_at: DateTime<Utc> = row.get(1)?;
            Ok((filename, modified_at))
        })?;

        let mut docs = HashMap::new();
        for row in rows {
            let (filename, modified_at) = row?;
            docs.insert(filename, modified_at);
        }

        Ok(docs)
    }

    /// Modification time recorded when `filename` was last indexed.
    pub fn document_modified_at(&self, filename: &str) -> Result<Option<DateTime<Utc>>> {
        self.conn
            .query_row(
                "SELECT modified_at FROM documents WHERE filename = ?",
                params![filename],
                |row| row.get(0),
            )
            .optional()
    }

    /// Total number of stored chunks across all documents.
    pub fn chunk_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Deletes a document and its associated chunks from the database
    pub fn delete_document(&self, filename: &str) -> Result<bool> {
        let doc_id: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM documents WHERE filename = ?",
                params![filename],
                |row| row.get(0),
            )
            .optional()?;

        let Some(doc_id) = doc_id else {
            return Ok(false);
        };

        // vec0 rows are not covered by the foreign key cascade
        self.conn.execute(
            "DELETE FROM vec_chunks WHERE rowid IN (SELECT id FROM chunks WHERE document_id = ?)",
            params![doc_id],
        )?;

        let rows = self
            .conn
            .execute("DELETE FROM documents WHERE id = ?", params![doc_id])?;
        Ok(rows > 0)
    }

    /// Inserts or replaces a document with its chunks and embeddings
    pub fn insert_document(
        &mut self,
        filename: &str,
        modified_at: DateTime<Utc>,
        page_count: usize,
        chunks: &[Chunk<'_>],
        embeddings: &[Vec<f32>],
    ) -> Result<()> {
        assert_eq!(
            chunks.len(),
            embeddings.len(),
            "chunks and embeddings length mismatch"
        );

        let tx = self.conn.transaction()?;

        let doc_id: i64 = tx.query_row(
            r#"
            INSERT INTO documents (filename, page_count, modified_at, indexed_at)
            VALUES (?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(filename) DO UPDATE SET
                page_count = excluded.page_count,
                modified_at = excluded.modified_at,
                indexed_at = CURRENT_TIMESTAMP
            RETURNING id
            "#,
            params![filename, page_count as i64, modified_at],
            |row| row.get(0),
        )?;

        // Re-indexing replaces previous contents
        tx.execute(
            "DELETE FROM vec_chunks WHERE rowid IN (SELECT id FROM chunks WHERE document_id = ?)",
            params![doc_id],
        )?;
        tx.execute("DELETE FROM chunks WHERE document_id = ?", params![doc_id])?;

        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            tx.execute(
                "INSERT INTO chunks (document_id, position, page_label, content) VALUES (?, ?, ?, ?)",
                params![doc_id, chunk.position as i64, chunk.page_label, chunk.content],
            )?;
            let chunk_id = tx.last_insert_rowid();

            tx.execute(
                "INSERT INTO vec_chunks (rowid, embedding) VALUES (?, ?)",
                params![chunk_id, serialize_vector(embedding)],
            )?;
        }

        tx.commit()?;
        Ok(())
    }
}
