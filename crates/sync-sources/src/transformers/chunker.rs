//! §4.F "Chunker transformer (a notable instance)": converts a file entity
//! to text, splits it by a recursive structural chunker with fallback to
//! fixed-size chunking, and emits a parent record plus ordered chunks.
//!
//! Grounded on the router's "transformers are pure functions of their
//! input entity" contract (§4.F) and on the `tempfile`-RAII idiom §9
//! calls for ("a `Drop`-guarded temp-file handle, not a `finally` block")
//! for the "delete the local file on every exit path" requirement.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{instrument, warn};

use sync_api::entity::Entity;
use sync_api::traits::Transformer;

/// Splits a file entity's text into a parent record plus ordered chunk
/// records, each bounded by `effective_chunk_size` bytes (§9 "Chunk size is
/// bounded by `MAX_CHUNK_SIZE − METADATA_OVERHEAD − SAFETY_MARGIN`" — the
/// caller is expected to have already subtracted the overhead and margin
/// via `SyncSettings::effective_chunk_size`, since this transformer has no
/// access to run-level settings — it is a pure function of its input).
pub struct FileChunkerTransformer {
    effective_chunk_size: usize,
}

impl FileChunkerTransformer {
    pub fn new(effective_chunk_size: usize) -> Self {
        Self { effective_chunk_size: effective_chunk_size.max(1) }
    }

    /// Direct read for markdown/plain text; a lossy UTF-8 decode for
    /// anything else (§4.F "a converter for other types" — a real deployment
    /// would delegate PDF/DOCX/etc. conversion to an external document
    /// service, which is an out-of-scope collaborator per §1).
    async fn extract_text(path: &Path, mime_type: Option<&str>) -> anyhow::Result<String> {
        let bytes = tokio::fs::read(path).await?;
        match mime_type {
            Some("text/markdown") | Some("text/plain") | Some("text/html") | Some("text/csv")
            | Some("application/json") => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            _ => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        }
    }

    /// Recursive structural split (paragraphs, falling back to headings),
    /// then a fixed-size fallback for any piece still over the bound.
    fn split_text(text: &str, max_chunk_size: usize) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut current = String::new();
        for paragraph in Self::structural_pieces(text) {
            if paragraph.len() > max_chunk_size {
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                }
                chunks.extend(Self::fixed_size_chunks(&paragraph, max_chunk_size));
                continue;
            }
            if !current.is_empty() && current.len() + paragraph.len() + 1 > max_chunk_size {
                chunks.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(&paragraph);
        }
        if !current.is_empty() {
            chunks.push(current);
        }
        chunks
    }

    /// The "recursive" half: split on blank lines first (paragraphs); a
    /// paragraph that is itself a block of heading-delimited sections is
    /// further split on heading boundaries before falling through to the
    /// fixed-size chunker above.
    fn structural_pieces(text: &str) -> Vec<String> {
        let mut pieces = Vec::new();
        for block in text.split("\n\n") {
            let block = block.trim();
            if block.is_empty() {
                continue;
            }
            if block.lines().filter(|l| l.starts_with('#')).count() > 1 {
                let mut current = String::new();
                for line in block.lines() {
                    if line.starts_with('#') && !current.is_empty() {
                        pieces.push(std::mem::take(&mut current));
                    }
                    if !current.is_empty() {
                        current.push('\n');
                    }
                    current.push_str(line);
                }
                if !current.is_empty() {
                    pieces.push(current);
                }
            } else {
                pieces.push(block.to_string());
            }
        }
        pieces
    }

    fn fixed_size_chunks(text: &str, max_chunk_size: usize) -> Vec<String> {
        text.as_bytes().chunks(max_chunk_size).map(|b| String::from_utf8_lossy(b).into_owned()).collect()
    }
}

/// Guarantees the local file materialization is removed on every exit path
/// from `transform` (§3 "MUST be deleted on all exit paths from the
/// chunker", §9). Constructed before any fallible step; its `Drop`
/// implementation runs whether `transform` returns `Ok` or an early `?`
/// propagates an `Err`.
struct ScopedFileGuard {
    path: PathBuf,
}

impl Drop for ScopedFileGuard {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %err, "failed to remove local file materialization");
            }
        }
    }
}

#[async_trait]
impl Transformer for FileChunkerTransformer {
    fn name(&self) -> &str {
        "chunker"
    }

    #[instrument(skip(self, entity), fields(entity_id = %entity.entity_id))]
    async fn transform(&self, entity: Entity) -> anyhow::Result<Vec<Entity>> {
        let file = entity
            .file
            .clone()
            .ok_or_else(|| anyhow::anyhow!("chunker received an entity with no file attributes"))?;
        let local_path = file
            .local_path
            .clone()
            .ok_or_else(|| anyhow::anyhow!("chunker received a file entity with no local materialization"))?;

        let _guard = ScopedFileGuard { path: PathBuf::from(&local_path) };

        let text = Self::extract_text(Path::new(&local_path), file.mime_type.as_deref()).await?;
        let pieces = Self::split_text(&text, self.effective_chunk_size);

        let mut parent = entity.clone();
        parent.entity_type = format!("{}_parent", entity.entity_type);

        let mut out = vec![parent];
        for (index, piece) in pieces.into_iter().enumerate() {
            let mut chunk = Entity::new(format!("{}-chunk-{index}", entity.entity_id), "chunk");
            chunk.parent_entity_id = Some(entity.entity_id.clone());
            chunk.set_field("text", piece);
            chunk.set_field("chunk_index", index as i64);
            out.push(chunk);
        }
        Ok(out)
    }
}
