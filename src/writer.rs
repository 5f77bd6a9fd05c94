//! Chunked writer: per-entity row buffers flushed to storage as numbered parts.
//!
//! Each slug owns a header object, an ordered run of immutable part objects
//! and, once finalized, a composed artifact (see [`JobLayout`]). Rows are
//! buffered in memory and written as a new part every time a buffer reaches
//! the flush threshold; a part is never rewritten or appended to.

use crate::error::{Error, Result};
use crate::storage::{JobLayout, ObjectStore, compose_many};
use crate::types::ResultRow;
use std::collections::HashMap;
use std::sync::Arc;

/// CSV column order shared by headers and parts
pub const CSV_FIELDS: [&str; 11] = [
    "subreddit",
    "submission_id",
    "title",
    "submission_url",
    "submission_text",
    "score",
    "upvote_ratio",
    "num_comments",
    "created_utc",
    "search_player",
    "comments_json",
];

const CREATED_UTC_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A part object that was just written
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlushedPart {
    /// Entity slug
    pub slug: String,
    /// Part number (1-based)
    pub part: usize,
    /// Rows in the part
    pub rows: usize,
    /// Object path of the part
    pub path: String,
}

/// Per-slug buffering writer for one job
pub struct ChunkedWriter {
    store: Arc<dyn ObjectStore>,
    layout: JobLayout,
    threshold: usize,
    fan_in: usize,
    buffers: HashMap<String, Vec<ResultRow>>,
    part_counts: HashMap<String, usize>,
}

impl ChunkedWriter {
    /// Writer for the job described by `layout`
    ///
    /// A threshold of 0 is treated as 1.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        layout: JobLayout,
        threshold: usize,
        fan_in: usize,
    ) -> Self {
        Self {
            store,
            layout,
            threshold: threshold.max(1),
            fan_in,
            buffers: HashMap::new(),
            part_counts: HashMap::new(),
        }
    }

    /// Path scheme of the job this writer belongs to
    pub fn layout(&self) -> &JobLayout {
        &self.layout
    }

    /// Flush threshold in rows
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Rows currently buffered for `slug`
    pub fn buffered(&self, slug: &str) -> usize {
        self.buffers.get(slug).map_or(0, Vec::len)
    }

    /// Parts flushed so far for `slug`
    pub fn part_count(&self, slug: &str) -> usize {
        self.part_counts.get(slug).copied().unwrap_or(0)
    }

    /// Write the header object of every slug that does not have one yet
    ///
    /// Also seeds an empty buffer per slug.
    pub async fn write_headers(&mut self, slugs: &[String]) -> Result<()> {
        let header = header_line()?;

        for slug in slugs {
            self.buffers.entry(slug.clone()).or_default();
            self.part_counts.entry(slug.clone()).or_insert(0);

            let path = self.layout.header(slug);
            if self.store.exists(&path).await? {
                tracing::debug!(slug = %slug, "Header already present, keeping it");
                continue;
            }
            self.store.put(&path, header.clone()).await?;
        }
        Ok(())
    }

    /// Recover part counters from storage after a restart
    ///
    /// The counter becomes the highest part number found under the slug's
    /// parts prefix, so the next flush never overwrites an existing part.
    pub async fn restore_part_counts(&mut self, slugs: &[String]) -> Result<()> {
        for slug in slugs {
            let prefix = self.layout.parts_prefix(slug);
            let highest = self
                .store
                .list_prefix(&prefix)
                .await?
                .iter()
                .filter_map(|name| {
                    name.strip_prefix(&prefix)?
                        .strip_suffix(".csv")?
                        .parse::<usize>()
                        .ok()
                })
                .max()
                .unwrap_or(0);

            tracing::debug!(slug = %slug, parts = highest, "Restored part count");
            self.part_counts.insert(slug.clone(), highest);
        }
        Ok(())
    }

    /// Buffer a row, flushing when the buffer reaches the threshold
    pub async fn write(&mut self, slug: &str, row: ResultRow) -> Result<Option<FlushedPart>> {
        let buffer = self.buffers.entry(slug.to_string()).or_default();
        buffer.push(row);

        if buffer.len() >= self.threshold {
            self.flush(slug).await
        } else {
            Ok(None)
        }
    }

    /// Write the buffer of `slug` as its next part
    ///
    /// Returns `None` when there is nothing buffered. On a storage failure the
    /// rows stay buffered and the counter is unchanged.
    pub async fn flush(&mut self, slug: &str) -> Result<Option<FlushedPart>> {
        let rows = match self.buffers.get(slug) {
            Some(rows) if !rows.is_empty() => rows,
            _ => return Ok(None),
        };

        let bytes = encode_rows(rows)?;
        let row_count = rows.len();
        let part = self.part_count(slug) + 1;
        let path = self.layout.part(slug, part);

        self.store.put(&path, bytes).await?;

        self.part_counts.insert(slug.to_string(), part);
        if let Some(buffer) = self.buffers.get_mut(slug) {
            buffer.clear();
        }

        tracing::debug!(slug = %slug, part, rows = row_count, "Flushed part");

        Ok(Some(FlushedPart {
            slug: slug.to_string(),
            part,
            rows: row_count,
            path,
        }))
    }

    /// Flush every non-empty buffer
    pub async fn flush_all(&mut self) -> Result<Vec<FlushedPart>> {
        let mut slugs: Vec<String> = self
            .buffers
            .iter()
            .filter(|(_, rows)| !rows.is_empty())
            .map(|(slug, _)| slug.clone())
            .collect();
        slugs.sort();

        let mut flushed = Vec::with_capacity(slugs.len());
        for slug in slugs {
            if let Some(part) = self.flush(&slug).await? {
                flushed.push(part);
            }
        }
        Ok(flushed)
    }

    /// Compose the header and parts of `slug` into its final artifact
    ///
    /// Returns the artifact path. If the artifact already exists it is left
    /// untouched. Otherwise any residual buffer is flushed first.
    pub async fn finalize(&mut self, slug: &str) -> Result<String> {
        let dest = self.layout.final_artifact(slug);
        if self.store.exists(&dest).await? {
            tracing::debug!(slug = %slug, path = %dest, "Final artifact exists, not recomposing");
            return Ok(dest);
        }

        self.flush(slug).await?;

        let mut sources = Vec::new();
        let header = self.layout.header(slug);
        if self.store.exists(&header).await? {
            sources.push(header);
        }
        // Numbered from the counter; listing order is lexicographic
        sources.extend((1..=self.part_count(slug)).map(|n| self.layout.part(slug, n)));

        let part_count = sources.len();
        compose_many(
            self.store.as_ref(),
            &sources,
            &dest,
            &self.layout.compose_tmp_prefix(slug),
            self.fan_in,
        )
        .await?;

        tracing::info!(slug = %slug, path = %dest, sources = part_count, "Final artifact composed");
        Ok(dest)
    }
}

fn header_line() -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(CSV_FIELDS)?;
    writer.into_inner().map_err(|e| Error::Io(e.into_error()))
}

fn encode_rows(rows: &[ResultRow]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    for row in rows {
        writer.write_record([
            row.subreddit.clone(),
            row.submission_id.clone(),
            row.title.clone(),
            row.submission_url.clone(),
            row.submission_text.clone(),
            row.score.to_string(),
            row.upvote_ratio.map(|r| r.to_string()).unwrap_or_default(),
            row.num_comments.to_string(),
            row.created_utc.format(CREATED_UTC_FORMAT).to_string(),
            row.search_player.clone(),
            serde_json::to_string(&row.comments)?,
        ])?;
    }

    writer.into_inner().map_err(|e| Error::Io(e.into_error()))
}
