//! Header-aware, overlapping-window chunker.
//!
//! Splits a markdown-ish document (resume, notes, project write-up) into
//! [`Chunk`]s in two phases:
//!
//! 1. **Sections.** The document is cut at ATX heading lines (`#` … `######`).
//!    A section that starts at a heading takes the heading text as its
//!    `heading`; the leading section of a document (or the whole document,
//!    when it has no headings) is labelled with its first line instead,
//!    and that line remains part of the section text.
//! 2. **Windows.** Each section body is cut into windows of at most
//!    `chunk_size` chars. A window prefers to end on a paragraph break,
//!    then a line break, then whitespace. The next window starts up to
//!    `chunk_overlap` chars before the previous end, aligned to a word start.
//!    A trailing remainder shorter than a full window is still emitted.
//!
//! Chunking is pure: identical text and parameters always produce identical
//! boundaries, line ranges, and ids.
//!
//! # Example
//!
//! ```rust
//! use profile_rag_core::chunk::{chunk_document, ChunkingParams};
//! use profile_rag_core::models::Document;
//!
//! let doc = Document {
//!     text: "# Ana Silva\n\n## Frontend Experience\nLed the React migration.".to_string(),
//!     file_name: "resume.md".to_string(),
//!     owner_id: "ana".to_string(),
//!     email: "ana@example.com".to_string(),
//! };
//! let chunks = chunk_document(&doc, &ChunkingParams::default(), None);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].id, "ana-chunk-0");
//! assert_eq!(chunks[0].heading.as_deref(), Some("Frontend Experience"));
//! ```

use crate::error::{RagError, Result};
use crate::format::format_chunk;
use crate::models::{chunk_id, Chunk, Document, LineRange};

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 80;

/// Window size and overlap, both in chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingParams {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl ChunkingParams {
    /// Validate and build chunking parameters.
    ///
    /// The overlap must be strictly smaller than the window so that every
    /// window advances past the previous one.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::validation("chunk_size must be > 0"));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::validation(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }
}

impl Default for ChunkingParams {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// A heading-delimited region of a document. Offsets are bytes into the
/// document text; the body excludes the heading line itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub heading: Option<String>,
    pub body_start: usize,
    pub body_end: usize,
}

/// A positioned slice of a document, before context formatting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    /// Byte offset of the first char of the window in the document.
    pub start: usize,
    /// Byte offset one past the last char of the window.
    pub end: usize,
    pub line_range: LineRange,
    pub heading: Option<String>,
}

/// Chunk a whole document with sequence indices starting at 0.
pub fn chunk_document(
    doc: &Document,
    params: &ChunkingParams,
    summary: Option<&str>,
) -> Vec<Chunk> {
    let windows = split_document(&doc.text, params);
    build_chunks(doc, &windows, 0, summary)
}

/// Run both split phases and return positioned windows in emission order.
///
/// Empty or whitespace-only text yields no windows.
pub fn split_document(text: &str, params: &ChunkingParams) -> Vec<Window> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let lines = LineIndex::new(text);
    let mut windows = Vec::new();

    for section in split_sections(text) {
        let body = &text[section.body_start..section.body_end];
        for (s, e) in split_windows(body, params) {
            let start = section.body_start + s;
            let end = section.body_start + e;
            windows.push(Window {
                start,
                end,
                line_range: LineRange {
                    from: lines.line_of(start),
                    to: lines.line_of(end - 1),
                },
                heading: section.heading.clone(),
            });
        }
    }

    windows
}

/// Turn windows into formatted, immutable chunks.
///
/// `first_index` offsets the sequence numbers so that several documents
/// ingested in one run for the same owner get distinct ids.
pub fn build_chunks(
    doc: &Document,
    windows: &[Window],
    first_index: usize,
    summary: Option<&str>,
) -> Vec<Chunk> {
    let summary = summary.map(str::trim).filter(|s| !s.is_empty());

    windows
        .iter()
        .enumerate()
        .map(|(i, w)| {
            let sequence_index = first_index + i;
            let raw_text = &doc.text[w.start..w.end];
            Chunk {
                id: chunk_id(&doc.owner_id, sequence_index),
                sequence_index,
                raw_text: raw_text.to_string(),
                formatted_text: format_chunk(raw_text, summary, w.heading.as_deref()),
                line_range: w.line_range,
                heading: w.heading.clone(),
                file_name: doc.file_name.clone(),
                owner_id: doc.owner_id.clone(),
                email: doc.email.clone(),
                document_summary: summary.map(str::to_string),
            }
        })
        .collect()
}

/// Phase 1: cut the document at markdown heading lines.
///
/// Heading-like lines inside fenced code blocks are ignored.
pub fn split_sections(text: &str) -> Vec<Section> {
    // (line start, line end incl. newline, heading text)
    let mut headings: Vec<(usize, usize, String)> = Vec::new();
    let mut fence: Option<&'static str> = None;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();

        let trimmed = line.trim_start();
        if let Some(marker) = fence {
            if trimmed.starts_with(marker) {
                fence = None;
            }
            continue;
        }
        if trimmed.starts_with("```") {
            fence = Some("```");
            continue;
        }
        if trimmed.starts_with("~~~") {
            fence = Some("~~~");
            continue;
        }
        if let Some(title) = parse_atx_heading(line) {
            headings.push((line_start, offset, title));
        }
    }

    let mut sections = Vec::new();
    let preamble_end = headings.first().map(|h| h.0).unwrap_or(text.len());
    let preamble = &text[..preamble_end];

    if !preamble.trim().is_empty() {
        let first_line_end = preamble
            .find('\n')
            .map(|i| i + 1)
            .unwrap_or(preamble.len());
        // The first line labels the section but stays in its body.
        let heading = preamble[..first_line_end].trim();
        sections.push(Section {
            heading: (!heading.is_empty()).then(|| heading.to_string()),
            body_start: 0,
            body_end: preamble_end,
        });
    }

    for (i, (_, line_end, title)) in headings.iter().enumerate() {
        let body_end = headings.get(i + 1).map(|h| h.0).unwrap_or(text.len());
        sections.push(Section {
            heading: (!title.is_empty()).then(|| title.clone()),
            body_start: *line_end,
            body_end,
        });
    }

    sections
}

/// Parse an ATX heading line, returning its text without markers.
fn parse_atx_heading(line: &str) -> Option<String> {
    let line = line.trim_end_matches(['\n', '\r']);
    let content = line.trim_start_matches(' ');
    if line.len() - content.len() > 3 {
        return None;
    }

    let hashes = content.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }

    let after = &content[hashes..];
    if !after.is_empty() && !after.starts_with([' ', '\t']) {
        return None;
    }

    let title = after.trim();
    // A closing run of '#' only counts when separated by whitespace ("C#" stays).
    let stripped = title.trim_end_matches('#');
    let title = if stripped.is_empty() {
        ""
    } else if stripped.ends_with([' ', '\t']) {
        stripped.trim_end()
    } else {
        title
    };
    Some(title.to_string())
}

/// Phase 2: cut text into overlapping windows.
///
/// Returns byte ranges into `text`. Every window is whitespace-trimmed,
/// non-empty, and at most `chunk_size` chars long.
pub fn split_windows(text: &str, params: &ChunkingParams) -> Vec<(usize, usize)> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let n = chars.len();
    let size = params.chunk_size;
    let overlap = params.chunk_overlap;
    let byte_at = |ci: usize| if ci >= n { text.len() } else { chars[ci].0 };

    let mut ranges = Vec::new();
    let mut start = 0;
    let mut last_end = 0;

    while start < n {
        while start < n && chars[start].1.is_whitespace() {
            start += 1;
        }
        if start >= n {
            break;
        }

        let hard_end = (start + size).min(n);
        let end = if hard_end == n {
            n
        } else {
            let floor = (start + (size / 2).max(1)).max(last_end + 1);
            find_break(&chars, floor, hard_end)
        };

        let mut trimmed_end = end;
        while trimmed_end > start && chars[trimmed_end - 1].1.is_whitespace() {
            trimmed_end -= 1;
        }
        ranges.push((byte_at(start), byte_at(trimmed_end)));

        if end >= n {
            break;
        }
        last_end = end;

        let mut next = end.saturating_sub(overlap).max(start + 1);
        while next < end && !chars[next - 1].1.is_whitespace() {
            next += 1;
        }
        start = next;
    }

    ranges
}

type Boundary = fn(&[(usize, char)], usize) -> bool;

const BOUNDARIES: [Boundary; 3] = [paragraph_break, line_break, word_break];

fn paragraph_break(chars: &[(usize, char)], p: usize) -> bool {
    p >= 2 && chars[p - 1].1 == '\n' && chars[p - 2].1 == '\n'
}

fn line_break(chars: &[(usize, char)], p: usize) -> bool {
    chars[p - 1].1 == '\n'
}

fn word_break(chars: &[(usize, char)], p: usize) -> bool {
    chars[p - 1].1.is_whitespace() || chars.get(p).map_or(true, |c| c.1.is_whitespace())
}

/// Pick the window end in `floor..=hard_end`, trying the strongest
/// boundary kind first and cutting hard when none is found.
fn find_break(chars: &[(usize, char)], floor: usize, hard_end: usize) -> usize {
    for boundary in BOUNDARIES {
        if let Some(p) = (floor..=hard_end).rev().find(|&p| boundary(chars, p)) {
            return p;
        }
    }
    hard_end
}

/// Maps byte offsets to 1-based line numbers.
struct LineIndex {
    newlines: Vec<usize>,
}

impl LineIndex {
    fn new(text: &str) -> Self {
        Self {
            newlines: text.match_indices('\n').map(|(i, _)| i).collect(),
        }
    }

    fn line_of(&self, byte: usize) -> usize {
        1 + self.newlines.partition_point(|&nl| nl < byte)
    }
}
