//! Inline tag recognition and cross-document fragment propagation
//!
//! Section text may embed two tag forms:
//! - `<label@content>` applies the named style to the content
//! - `[doc1,doc2|content]` marks a fragment that is mirrored into the first
//!   section of every listed document
//!
//! Tags live directly in the raw text; the scanner here only produces a
//! display-ready view of it, so the underlying buffer always reconstructs
//! exactly. Anything malformed (unterminated tag, missing `@` or `|`)
//! renders as plain text.

use std::ops::Range;

use thiserror::Error;

use crate::core::book::Book;

/// Fragment propagation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TagError {
    #[error("fragment ordinal {ordinal} exceeds the {slots} fragment slots in the target section")]
    FragmentOutOfRange { ordinal: usize, slots: usize },
}

/// A display-ready piece of section text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Span {
    /// Untagged text, shown as-is
    Plain(String),
    /// Content of a `<label@content>` tag; delimiters and label are hidden
    Styled { label: String, text: String },
    /// Content of a `[targets|content]` tag; rendered inline
    Reference { targets: Vec<String>, text: String },
}

/// Scanner states while walking a section's text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Plain,
    InStyleTag,
    InRefTag,
}

/// Render a section's raw text into display spans
///
/// Pure function over the buffer; safe to call on every edit.
pub fn render_tags(text: &str) -> Vec<Span> {
    scan(text).into_iter().map(|(_, span)| span).collect()
}

/// Scan text for tags, keeping each span's byte range in the source
fn scan(text: &str) -> Vec<(Range<usize>, Span)> {
    let mut spans = Vec::new();
    let mut state = State::Plain;
    let mut plain_start = 0;
    let mut tag_start = 0;

    for (i, ch) in text.char_indices() {
        match state {
            State::Plain => match ch {
                '<' => {
                    state = State::InStyleTag;
                    tag_start = i;
                }
                '[' => {
                    state = State::InRefTag;
                    tag_start = i;
                }
                _ => {}
            },
            State::InStyleTag => {
                if ch == '>' {
                    let body = &text[tag_start + 1..i];
                    if let Some((label, content)) = body.split_once('@') {
                        if tag_start > plain_start {
                            spans.push((
                                plain_start..tag_start,
                                Span::Plain(text[plain_start..tag_start].to_string()),
                            ));
                        }
                        spans.push((
                            tag_start..i + 1,
                            Span::Styled {
                                label: label.trim().to_string(),
                                text: content.to_string(),
                            },
                        ));
                        plain_start = i + 1;
                    }
                    state = State::Plain;
                }
            }
            State::InRefTag => {
                if ch == ']' {
                    let body = &text[tag_start + 1..i];
                    if let Some((targets, content)) = body.split_once('|') {
                        if tag_start > plain_start {
                            spans.push((
                                plain_start..tag_start,
                                Span::Plain(text[plain_start..tag_start].to_string()),
                            ));
                        }
                        spans.push((
                            tag_start..i + 1,
                            Span::Reference {
                                targets: targets.split(',').map(|t| t.trim().to_string()).collect(),
                                text: content.to_string(),
                            },
                        ));
                        plain_start = i + 1;
                    }
                    state = State::Plain;
                }
            }
        }
    }

    // trailing text, including any unterminated tag, stays plain
    if plain_start < text.len() {
        spans.push((
            plain_start..text.len(),
            Span::Plain(text[plain_start..].to_string()),
        ));
    }
    spans
}

/// The tag whose closing delimiter sits at byte `close_pos`, if any
pub fn closing_tag_at(text: &str, close_pos: usize) -> Option<Span> {
    scan(text)
        .into_iter()
        .find(|(range, span)| range.end == close_pos + 1 && !matches!(span, Span::Plain(_)))
        .map(|(_, span)| span)
}

/// Ordinal slot of a fragment: the count of `]` before its closing delimiter
pub fn fragment_ordinal(text: &str, close_pos: usize) -> usize {
    text[..close_pos].matches(']').count()
}

/// Rebuild a target section with `content` spliced into the ordinal slot
///
/// The section is split on `]`; the part at the ordinal slot is replaced by
/// the content, other non-empty parts are kept, and every emitted part is
/// re-terminated with `]`.
pub fn splice_fragment(section: &str, ordinal: usize, content: &str) -> Result<String, TagError> {
    let parts: Vec<&str> = section.split(']').collect();
    if ordinal >= parts.len() {
        return Err(TagError::FragmentOutOfRange {
            ordinal,
            slots: parts.len(),
        });
    }

    let mut out = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i == ordinal {
            out.push_str(content);
            out.push(']');
        } else if !part.is_empty() {
            out.push_str(part);
            out.push(']');
        }
    }
    Ok(out)
}

/// Mirror a fragment into section 0 of every target document
///
/// Each target is handled independently: its section is spliced, the file
/// saved, and the document reloaded. Failures are collected rather than
/// aborting the remaining targets.
pub fn propagate_reference(
    book: &mut Book,
    targets: &[String],
    ordinal: usize,
    content: &str,
) -> Vec<(String, anyhow::Error)> {
    let mut failures = Vec::new();
    for target in targets {
        if let Err(e) = propagate_into(book, target, ordinal, content) {
            tracing::warn!("Failed to propagate fragment into '{}': {:#}", target, e);
            failures.push((target.clone(), e));
        }
    }
    failures
}

fn propagate_into(
    book: &mut Book,
    target: &str,
    ordinal: usize,
    content: &str,
) -> anyhow::Result<()> {
    let current = book.section(target, 0)?.to_string();
    let updated = splice_fragment(&current, ordinal, content)?;
    book.set_section(target, 0, updated)?;
    book.save(target)?;
    book.reload(target)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::AppConfig;
    use std::fs;

    #[test]
    fn test_style_tag() {
        let spans = render_tags("see <bold@ Prologue> here");
        assert_eq!(
            spans,
            vec![
                Span::Plain("see ".to_string()),
                Span::Styled {
                    label: "bold".to_string(),
                    text: " Prologue".to_string(),
                },
                Span::Plain(" here".to_string()),
            ]
        );
    }

    #[test]
    fn test_reference_tag_multiple_targets() {
        let spans = render_tags("[book, chapterOutline|Sally walked the dog]");
        assert_eq!(
            spans,
            vec![Span::Reference {
                targets: vec!["book".to_string(), "chapterOutline".to_string()],
                text: "Sally walked the dog".to_string(),
            }]
        );
    }

    #[test]
    fn test_unterminated_tag_is_plain() {
        let spans = render_tags("typing <bold@ still open");
        assert_eq!(spans, vec![Span::Plain("typing <bold@ still open".to_string())]);

        let spans = render_tags("notes [target| not closed");
        assert_eq!(spans, vec![Span::Plain("notes [target| not closed".to_string())]);
    }

    #[test]
    fn test_tag_without_separator_is_plain() {
        assert_eq!(
            render_tags("a <not a tag> b"),
            vec![Span::Plain("a <not a tag> b".to_string())]
        );
        assert_eq!(
            render_tags("a [no pipe] b"),
            vec![Span::Plain("a [no pipe] b".to_string())]
        );
    }

    #[test]
    fn test_raw_text_reconstructs_from_tagged_input() {
        let text = "x <i@y> [a|z] w";
        let rebuilt: String = scan(text)
            .iter()
            .map(|(range, _)| &text[range.clone()])
            .collect();
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_closing_tag_at() {
        let text = "a <b@c> d";
        let close = text.find('>').unwrap();
        assert!(matches!(
            closing_tag_at(text, close),
            Some(Span::Styled { .. })
        ));
        assert!(closing_tag_at(text, close - 1).is_none());
    }

    #[test]
    fn test_fragment_ordinal_counts_preceding_closers() {
        let text = "one] two] [t|three]";
        let close = text.rfind(']').unwrap();
        assert_eq!(fragment_ordinal(text, close), 2);
        assert_eq!(fragment_ordinal(text, text.find(']').unwrap()), 0);
    }

    #[test]
    fn test_splice_into_empty_target() {
        // first fragment into a section with no prior fragments
        let out = splice_fragment("loose notes about the town", 0, "new content").unwrap();
        assert!(out.starts_with("new content]"));
    }

    #[test]
    fn test_splice_replaces_ordinal_slot() {
        let out = splice_fragment("alpha]beta]gamma", 1, "BETA").unwrap();
        assert_eq!(out, "alpha]BETA]gamma]");
    }

    #[test]
    fn test_splice_drops_empty_slots() {
        let out = splice_fragment("alpha]]gamma", 2, "NEW").unwrap();
        assert_eq!(out, "alpha]NEW]");
    }

    #[test]
    fn test_splice_ordinal_out_of_range() {
        assert_eq!(
            splice_fragment("alpha]beta", 2, "x"),
            Err(TagError::FragmentOutOfRange {
                ordinal: 2,
                slots: 2
            })
        );
    }

    #[test]
    fn test_propagate_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes"), "[book|new content] scratch").unwrap();
        fs::write(dir.path().join("book"), "the old opening").unwrap();
        let config = AppConfig {
            book_dir: dir.path().to_path_buf(),
            ..AppConfig::default()
        };
        let mut book = Book::load(&config).unwrap();

        let targets = vec!["book".to_string()];
        let failures = propagate_reference(&mut book, &targets, 0, "new content");
        assert!(failures.is_empty());
        assert!(book.section("book", 0).unwrap().starts_with("new content]"));
        assert!(fs::read_to_string(dir.path().join("book"))
            .unwrap()
            .starts_with("new content]"));
    }

    #[test]
    fn test_propagate_collects_failures_per_target() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("book"), "opening").unwrap();
        let config = AppConfig {
            book_dir: dir.path().to_path_buf(),
            ..AppConfig::default()
        };
        let mut book = Book::load(&config).unwrap();

        let targets = vec!["ghost".to_string(), "book".to_string()];
        let failures = propagate_reference(&mut book, &targets, 0, "hello");
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "ghost");
        assert!(book.section("book", 0).unwrap().starts_with("hello]"));
    }
}
