//! Document store backed by flat text files
//!
//! A book is a directory of plain text documents. Each document is split
//! into sections at lines beginning with the marker prefix; concatenating a
//! document's sections in order reproduces the file byte-for-byte.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use thiserror::Error;
use walkdir::WalkDir;

use crate::core::config::AppConfig;

/// Lookup and mutation errors for the document store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown document: {0}")]
    DocumentNotFound(String),
    #[error("section {index} out of range for '{doc}' ({len} sections)")]
    SectionOutOfRange {
        doc: String,
        index: usize,
        len: usize,
    },
    #[error("position {pos} out of range in section {index} of '{doc}'")]
    PositionOutOfRange {
        doc: String,
        index: usize,
        pos: usize,
    },
}

/// Aggregate character and word counts over the whole book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Counts {
    pub chars: usize,
    pub words: usize,
}

/// Outcome of saving every document; failures are collected, never fatal
#[derive(Debug, Default)]
pub struct SaveReport {
    /// Number of documents written successfully
    pub saved: usize,
    /// Documents that failed to write, with their errors
    pub failures: Vec<(String, anyhow::Error)>,
}

impl SaveReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// The collection of documents making up a book
#[derive(Debug)]
pub struct Book {
    base_dir: PathBuf,
    marker_prefix: String,
    documents: HashMap<String, Vec<String>>,
}

impl Book {
    /// Load every file in the configured book directory
    pub fn load(config: &AppConfig) -> Result<Self> {
        let mut book = Self {
            base_dir: config.book_dir.clone(),
            marker_prefix: config.marker_prefix.clone(),
            documents: HashMap::new(),
        };

        for entry in WalkDir::new(&book.base_dir).min_depth(1).max_depth(1) {
            let entry = entry.with_context(|| {
                format!("Failed to scan book directory: {}", book.base_dir.display())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            match fs::read_to_string(entry.path()) {
                Ok(content) => {
                    let sections = split_sections(&content, &book.marker_prefix);
                    book.documents.insert(name, sections);
                }
                Err(e) => {
                    tracing::error!("Failed to read document '{}': {}", name, e);
                }
            }
        }

        let counts = book.total_counts();
        tracing::info!(
            "Loaded {} documents ({} chars, {} words)",
            book.documents.len(),
            counts.chars,
            counts.words
        );
        Ok(book)
    }

    /// Document names, sorted for stable display
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.documents.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Number of sections in a document
    pub fn section_count(&self, doc: &str) -> Result<usize, StoreError> {
        self.sections(doc).map(Vec::len)
    }

    /// Read a section's raw text
    pub fn section(&self, doc: &str, index: usize) -> Result<&str, StoreError> {
        let sections = self.sections(doc)?;
        sections
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| StoreError::SectionOutOfRange {
                doc: doc.to_string(),
                index,
                len: sections.len(),
            })
    }

    /// Replace a section's content wholesale
    ///
    /// Tag well-formedness is not validated; the renderer copes with
    /// partially typed tags.
    pub fn set_section(&mut self, doc: &str, index: usize, text: String) -> Result<(), StoreError> {
        *self.section_mut(doc, index)? = text;
        Ok(())
    }

    /// Insert text at a character offset within a section
    pub fn insert_char(
        &mut self,
        doc: &str,
        index: usize,
        pos: usize,
        text: &str,
    ) -> Result<(), StoreError> {
        let section = self.section_mut(doc, index)?;
        let byte = char_to_byte(section, pos).ok_or_else(|| StoreError::PositionOutOfRange {
            doc: doc.to_string(),
            index,
            pos,
        })?;
        section.insert_str(byte, text);
        Ok(())
    }

    /// Remove the character at a character offset within a section
    pub fn remove_char(&mut self, doc: &str, index: usize, pos: usize) -> Result<(), StoreError> {
        let section = self.section_mut(doc, index)?;
        let byte = section
            .char_indices()
            .nth(pos)
            .map(|(b, _)| b)
            .ok_or_else(|| StoreError::PositionOutOfRange {
                doc: doc.to_string(),
                index,
                pos,
            })?;
        section.remove(byte);
        Ok(())
    }

    /// Write one document back to its file, sections concatenated in order
    pub fn save(&self, doc: &str) -> Result<()> {
        let sections = self.sections(doc)?;
        let path = self.document_path(doc);
        fs::write(&path, sections.concat())
            .with_context(|| format!("Failed to save document: {}", path.display()))?;
        tracing::debug!("Saved document: {}", path.display());
        Ok(())
    }

    /// Save every document; a single failing file never aborts the rest
    pub fn save_all(&self) -> SaveReport {
        let mut report = SaveReport::default();
        for name in self.documents.keys() {
            match self.save(name) {
                Ok(()) => report.saved += 1,
                Err(e) => {
                    tracing::error!("Failed to save document '{}': {:#}", name, e);
                    report.failures.push((name.clone(), e));
                }
            }
        }
        report
    }

    /// Re-read one document from disk, re-splitting its sections
    pub fn reload(&mut self, doc: &str) -> Result<()> {
        if !self.documents.contains_key(doc) {
            return Err(StoreError::DocumentNotFound(doc.to_string()).into());
        }
        let path = self.document_path(doc);
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read document: {}", path.display()))?;
        let sections = split_sections(&content, &self.marker_prefix);
        self.documents.insert(doc.to_string(), sections);
        Ok(())
    }

    /// Recompute aggregate counts by summing over every section
    ///
    /// This full recomputation is the authoritative count; callers wanting
    /// an incremental counter must treat this as the baseline.
    pub fn total_counts(&self) -> Counts {
        let mut counts = Counts::default();
        for sections in self.documents.values() {
            for section in sections {
                counts.chars += section.chars().count();
                counts.words += section.split_whitespace().count();
            }
        }
        counts
    }

    fn sections(&self, doc: &str) -> Result<&Vec<String>, StoreError> {
        self.documents
            .get(doc)
            .ok_or_else(|| StoreError::DocumentNotFound(doc.to_string()))
    }

    fn section_mut(&mut self, doc: &str, index: usize) -> Result<&mut String, StoreError> {
        let sections = self
            .documents
            .get_mut(doc)
            .ok_or_else(|| StoreError::DocumentNotFound(doc.to_string()))?;
        let len = sections.len();
        sections
            .get_mut(index)
            .ok_or_else(|| StoreError::SectionOutOfRange {
                doc: doc.to_string(),
                index,
                len,
            })
    }

    fn document_path(&self, doc: &str) -> PathBuf {
        self.base_dir.join(doc)
    }
}

/// Map a character offset to a byte offset, allowing one past the end
fn char_to_byte(s: &str, pos: usize) -> Option<usize> {
    s.char_indices()
        .map(|(b, _)| b)
        .chain(std::iter::once(s.len()))
        .nth(pos)
}

/// Split document content into sections at marker-prefixed lines
///
/// The marker line belongs to the section it opens. A document with no
/// marker lines (including an empty one) has exactly one section.
pub fn split_sections(content: &str, marker_prefix: &str) -> Vec<String> {
    let mut sections = Vec::new();
    let mut current = String::new();
    for line in content.split_inclusive('\n') {
        if line.starts_with(marker_prefix) && !current.is_empty() {
            sections.push(std::mem::take(&mut current));
        }
        current.push_str(line);
    }
    sections.push(current);
    sections
}
