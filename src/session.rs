//! The writing session: a single-threaded host loop over book and telemetry
//!
//! The host UI polls `tick` at its own cadence; the session decides when the
//! save and telemetry intervals have elapsed. Everything runs cooperatively
//! on the caller's thread; the only shared external resource is the file
//! system, touched serially.

use anyhow::Result;

use crate::core::book::Book;
use crate::core::config::SessionConfig;
use crate::core::tags::{self, Span};
use crate::telemetry::plot::PlotSurface;
use crate::telemetry::recorder::TelemetryRecorder;

/// An edit delivered by the host for a (document, section) coordinate
#[derive(Debug, Clone)]
pub enum Edit {
    /// Insert text at a character offset
    Insert { pos: usize, text: String },
    /// Remove the character at an offset
    Remove { pos: usize },
    /// Replace the whole section, e.g. from a paste or widget sync
    Replace { text: String },
}

/// Owns the book and the telemetry recorder for one editing session
pub struct WritingSession {
    book: Book,
    telemetry: TelemetryRecorder,
    save_interval: f64,
    telemetry_interval: f64,
    prev_save: f64,
    prev_sample: f64,
}

impl WritingSession {
    pub fn new(book: Book, telemetry: TelemetryRecorder, config: &SessionConfig, now: f64) -> Self {
        Self {
            book,
            telemetry,
            save_interval: config.save_interval_secs,
            telemetry_interval: config.telemetry_interval_secs,
            prev_save: now,
            prev_sample: now,
        }
    }

    pub fn book(&self) -> &Book {
        &self.book
    }

    pub fn telemetry(&self) -> &TelemetryRecorder {
        &self.telemetry
    }

    /// One poll of the host loop
    ///
    /// Saves the whole book and redraws the plot when the save interval has
    /// elapsed, and takes a telemetry sample when the sampling interval has.
    /// Both failures are non-fatal: they are logged and the session
    /// continues.
    pub fn tick(&mut self, now: f64, plot: Option<&mut dyn PlotSurface>) {
        if now - self.prev_save >= self.save_interval {
            self.prev_save = now;
            let report = self.book.save_all();
            if !report.is_ok() {
                tracing::error!(
                    "Autosave wrote {} documents, {} failed",
                    report.saved,
                    report.failures.len()
                );
            }
            if let Some(surface) = plot {
                self.telemetry.draw(surface);
            }
        }

        if now - self.prev_sample >= self.telemetry_interval {
            self.prev_sample = now;
            if let Err(e) = self.telemetry.sample(self.book.total_counts()) {
                tracing::warn!("Telemetry persistence failed: {}", e);
            }
        }
    }

    /// Apply a host edit to a section
    ///
    /// An insert ending in `>` or `]` that closes a well-formed tag triggers
    /// the renderer synchronously: reference tags propagate their fragment
    /// into every target document before this call returns.
    pub fn apply_edit(&mut self, doc: &str, index: usize, edit: Edit) -> Result<()> {
        match edit {
            Edit::Replace { text } => self.book.set_section(doc, index, text)?,
            Edit::Remove { pos } => self.book.remove_char(doc, index, pos)?,
            Edit::Insert { pos, text } => {
                self.book.insert_char(doc, index, pos, &text)?;
                if text.ends_with('>') || text.ends_with(']') {
                    let close_pos = pos + text.chars().count() - 1;
                    self.on_tag_close(doc, index, close_pos);
                }
            }
        }
        Ok(())
    }

    /// Display spans for a section's current text
    pub fn render_section(&self, doc: &str, index: usize) -> Result<Vec<Span>> {
        Ok(tags::render_tags(self.book.section(doc, index)?))
    }

    /// Final save on shutdown, best effort
    pub fn shutdown(&mut self) {
        let report = self.book.save_all();
        if report.is_ok() {
            tracing::info!("Session closed, {} documents saved", report.saved);
        } else {
            tracing::error!(
                "Session closed with {} unsaved documents",
                report.failures.len()
            );
        }
    }

    fn on_tag_close(&mut self, doc: &str, index: usize, close_char_pos: usize) {
        let Ok(section) = self.book.section(doc, index) else {
            return;
        };
        let Some(close_byte) = section.char_indices().nth(close_char_pos).map(|(b, _)| b) else {
            return;
        };
        let section = section.to_string();
        match tags::closing_tag_at(&section, close_byte) {
            Some(Span::Reference { targets, text }) => {
                let ordinal = tags::fragment_ordinal(&section, close_byte);
                // failures are already logged per target; the writer's own
                // buffer is left untouched either way
                let _ = tags::propagate_reference(&mut self.book, &targets, ordinal, &text);
            }
            // style tags only change the rendered view, which the host
            // re-pulls via render_section
            Some(_) | None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{AppConfig, TelemetryConfig};
    use std::fs;
    use std::path::Path;

    fn session_in(dir: &Path, files: &[(&str, &str)]) -> WritingSession {
        for (name, content) in files {
            fs::write(dir.join(name), content).unwrap();
        }
        let config = AppConfig {
            book_dir: dir.to_path_buf(),
            ..AppConfig::default()
        };
        let book = Book::load(&config).unwrap();
        let telemetry = TelemetryRecorder::open(&TelemetryConfig {
            log_path: dir.join("telemetry.csv"),
            smoothing_window: 1000,
        })
        .unwrap();
        WritingSession::new(book, telemetry, &config.session, 0.0)
    }

    #[test]
    fn test_tick_honors_cadences() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(dir.path(), &[("notes", "start")]);
        session
            .apply_edit(
                "notes",
                0,
                Edit::Replace {
                    text: "edited".to_string(),
                },
            )
            .unwrap();

        // both intervals still pending
        session.tick(0.005, None);
        assert_eq!(session.telemetry().samples().len(), 0);
        assert_eq!(fs::read_to_string(dir.path().join("notes")).unwrap(), "start");

        // sampling fires, autosave does not
        session.tick(0.02, None);
        assert_eq!(session.telemetry().samples().len(), 1);
        assert_eq!(fs::read_to_string(dir.path().join("notes")).unwrap(), "start");

        // autosave fires
        session.tick(1.5, None);
        assert_eq!(fs::read_to_string(dir.path().join("notes")).unwrap(), "edited");
    }

    #[test]
    fn test_shutdown_saves() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(dir.path(), &[("notes", "start")]);
        session
            .apply_edit(
                "notes",
                0,
                Edit::Replace {
                    text: "final words".to_string(),
                },
            )
            .unwrap();
        session.shutdown();
        assert_eq!(
            fs::read_to_string(dir.path().join("notes")).unwrap(),
            "final words"
        );
    }

    #[test]
    fn test_closing_bracket_propagates_fragment() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(
            dir.path(),
            &[("notes", "[book|new content"), ("book", "old opening")],
        );

        // typing the closing bracket completes the reference tag
        session
            .apply_edit(
                "notes",
                0,
                Edit::Insert {
                    pos: 17,
                    text: "]".to_string(),
                },
            )
            .unwrap();

        assert!(session
            .book()
            .section("book", 0)
            .unwrap()
            .starts_with("new content]"));
        assert!(fs::read_to_string(dir.path().join("book"))
            .unwrap()
            .starts_with("new content]"));
    }

    #[test]
    fn test_plain_bracket_does_not_propagate() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(
            dir.path(),
            &[("notes", "no pipe here"), ("book", "untouched")],
        );
        session
            .apply_edit(
                "notes",
                0,
                Edit::Insert {
                    pos: 12,
                    text: "]".to_string(),
                },
            )
            .unwrap();
        assert_eq!(session.book().section("book", 0).unwrap(), "untouched");
    }

    #[test]
    fn test_render_section() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_in(dir.path(), &[("notes", "a <bold@b>")]);
        let spans = session.render_section("notes", 0).unwrap();
        assert_eq!(spans.len(), 2);
        assert!(matches!(&spans[1], Span::Styled { label, .. } if label == "bold"));
    }
}
