//! Section-aware document chunker.
//!
//! Adjacent short sections are joined greedily with a blank-line separator
//! until the next section would push the combined section text past
//! `chunk_size`. A single section longer than `chunk_size` is split
//! internally with overlap, with the final sub-chunk anchored to the
//! section end. Deterministic: same (document, chunk_size, overlap) in,
//! same chunks out.
//!
//! All sizes and offsets are in characters, not bytes.

use dredge_core::{ChunkingConfig, DocAwareChunk, Document, Section};
use std::collections::BTreeMap;

const SECTION_SEPARATOR: &str = "\n\n";

pub struct Chunker {
  config: ChunkingConfig,
}

impl Default for Chunker {
  fn default() -> Self {
    Self::new(ChunkingConfig::default())
  }
}

impl Chunker {
  pub fn new(config: ChunkingConfig) -> Self {
    Self { config }
  }

  /// Split a document into chunks with ids assigned sequentially from
  /// `start_chunk_id` (normally 0), no gaps. An empty document yields an
  /// empty vec.
  pub fn chunk(&self, document: &Document, start_chunk_id: usize) -> Vec<DocAwareChunk> {
    let sections: Vec<&Section> = document.sections.iter().filter(|s| !s.text.is_empty()).collect();
    if sections.is_empty() {
      return Vec::new();
    }

    let blurb = self.extract_blurb(&sections[0].text);
    let title_prefix = if document.semantic_identifier.is_empty() {
      None
    } else {
      Some(format!("{}\n", document.semantic_identifier))
    };
    let metadata_suffix = if document.metadata.is_empty() {
      None
    } else {
      let pairs: Vec<String> = document.metadata.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
      Some(format!("\n{}", pairs.join("\n")))
    };

    let mut builder = ChunkBuilder {
      document,
      blurb,
      title_prefix,
      metadata_suffix,
      next_chunk_id: start_chunk_id,
      chunks: Vec::new(),
      config: &self.config,
    };

    // Pending joined chunk: content so far, its section links, and the
    // combined section char count (separators excluded from the budget)
    let mut content = String::new();
    let mut links: BTreeMap<usize, String> = BTreeMap::new();
    let mut joined_chars: usize = 0;

    for section in &sections {
      let section_chars = char_len(&section.text);

      if section_chars > self.config.chunk_size {
        if !content.is_empty() {
          builder.emit(std::mem::take(&mut content), std::mem::take(&mut links), false);
          joined_chars = 0;
        }
        self.chunk_large_section(section, &mut builder);
        continue;
      }

      // Greedy join: stop before the combined section text would overflow
      if !content.is_empty() && joined_chars + section_chars > self.config.chunk_size {
        builder.emit(std::mem::take(&mut content), std::mem::take(&mut links), false);
        joined_chars = 0;
      }

      if !content.is_empty() {
        content.push_str(SECTION_SEPARATOR);
      }
      if let Some(link) = &section.link {
        links.insert(char_len(&content), link.clone());
      }
      content.push_str(&section.text);
      joined_chars += section_chars;
    }

    if !content.is_empty() {
      builder.emit(content, links, false);
    }

    builder.chunks
  }

  /// Split one oversized section: the first sub-chunk takes the first
  /// `chunk_size` characters, the cursor then advances by
  /// `chunk_size - overlap`, and the last sub-chunk is anchored to the
  /// section end so the tail is never shorter than the overlap (the final
  /// two sub-chunks may overlap by more than the nominal amount).
  /// Only called for sections strictly longer than `chunk_size`; a
  /// section of exactly `chunk_size` goes through the join path.
  fn chunk_large_section(&self, section: &Section, builder: &mut ChunkBuilder<'_>) {
    let chars: Vec<char> = section.text.chars().collect();
    let total = chars.len();
    let size = self.config.chunk_size;
    let stride = size - self.config.overlap;

    let link_map = |link: &Option<String>| -> BTreeMap<usize, String> {
      link.iter().map(|l| (0usize, l.clone())).collect()
    };

    builder.emit(chars[..size].iter().collect(), link_map(&section.link), false);

    let mut cursor = stride;
    while cursor + size < total {
      builder.emit(chars[cursor..cursor + size].iter().collect(), link_map(&section.link), true);
      cursor += stride;
    }

    // End-anchored tail: always ends exactly at the section's last char
    builder.emit(chars[total - size..].iter().collect(), link_map(&section.link), true);
  }

  /// Lead text for result snippets, cut back to a word boundary when one
  /// exists inside the budget
  fn extract_blurb(&self, text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= self.config.blurb_size {
      return text.to_string();
    }
    let truncated: String = chars[..self.config.blurb_size].iter().collect();
    match truncated.rfind(char::is_whitespace) {
      Some(cut) if cut > 0 => truncated[..cut].trim_end().to_string(),
      _ => truncated,
    }
  }
}

struct ChunkBuilder<'a> {
  document: &'a Document,
  blurb: String,
  title_prefix: Option<String>,
  metadata_suffix: Option<String>,
  next_chunk_id: usize,
  chunks: Vec<DocAwareChunk>,
  config: &'a ChunkingConfig,
}

impl ChunkBuilder<'_> {
  fn emit(&mut self, content: String, source_links: BTreeMap<usize, String>, section_continuation: bool) {
    let mini_chunk_texts = if self.config.enable_mini_chunks {
      let chars: Vec<char> = content.chars().collect();
      Some(
        chars
          .chunks(self.config.mini_chunk_size)
          .map(|window| window.iter().collect())
          .collect(),
      )
    } else {
      None
    };

    self.chunks.push(DocAwareChunk {
      chunk_id: self.next_chunk_id,
      document_id: self.document.id.clone(),
      semantic_identifier: self.document.semantic_identifier.clone(),
      blurb: self.blurb.clone(),
      content,
      source_links,
      section_continuation,
      title_prefix: self.title_prefix.clone(),
      metadata_suffix: self.metadata_suffix.clone(),
      mini_chunk_texts,
    });
    self.next_chunk_id += 1;
  }
}

fn char_len(s: &str) -> usize {
  s.chars().count()
}
