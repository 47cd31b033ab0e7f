//! Scriptorium - core for a long-form writing application
//!
//! Documents live as flat text files split into `##`-marked sections; inline
//! tags link fragments between the unstructured notes and the formatted
//! book, and writing telemetry is sampled while a session runs. The real
//! editor front-end is external; the host here is a minimal line-oriented
//! stand-in that drives the same session loop.

mod core;
mod session;
mod telemetry;

use std::io::{self, BufRead, Write};

use anyhow::Result;
use chrono::Utc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::core::book::Book;
use crate::core::config::AppConfig;
use crate::core::tags::Span;
use crate::session::{Edit, WritingSession};
use crate::telemetry::TelemetryRecorder;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::filter::LevelFilter::INFO)
        .init();

    tracing::info!("Starting Scriptorium...");

    let config = AppConfig::load().unwrap_or_default();
    if let Err(e) = config.save() {
        tracing::warn!("Could not persist config: {:#}", e);
    }

    let book = Book::load(&config)?;
    if book.is_empty() {
        tracing::warn!("Book directory '{}' has no documents", config.book_dir.display());
    }
    let telemetry = TelemetryRecorder::open(&config.telemetry)?;
    let mut session = WritingSession::new(book, telemetry, &config.session, now_secs());

    run_host(&mut session)?;
    session.shutdown();
    Ok(())
}

/// Seconds since the Unix epoch
fn now_secs() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Line-oriented host loop driving the session
fn run_host(session: &mut WritingSession) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    println!("commands: docs | show <doc> <idx> | raw <doc> <idx> | set <doc> <idx> <text>");
    println!("          type <doc> <idx> <pos> <text> | del <doc> <idx> <pos> | counts | rate | save | quit");

    loop {
        print!("> ");
        stdout.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        session.tick(now_secs(), None);

        if let Err(e) = handle_command(session, line.trim()) {
            println!("error: {e:#}");
        }
        if line.trim() == "quit" {
            break;
        }
    }
    Ok(())
}

fn handle_command(session: &mut WritingSession, line: &str) -> Result<()> {
    let mut parts = line.splitn(2, ' ');
    let command = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("");

    match command {
        "" | "quit" => {}
        "docs" => {
            for name in session.book().names() {
                let sections = session.book().section_count(name)?;
                println!("{name} ({sections} sections)");
            }
        }
        "counts" => {
            let counts = session.book().total_counts();
            println!("{} chars, {} words", counts.chars, counts.words);
        }
        "rate" => {
            let telemetry = session.telemetry();
            println!(
                "{} samples, mean rate {:.1} wpm",
                telemetry.samples().len(),
                telemetry.mean_rate()
            );
        }
        "save" => {
            let report = session.book().save_all();
            println!("saved {} documents, {} failures", report.saved, report.failures.len());
        }
        "show" => {
            let (doc, index, _) = parse_coordinate(rest)?;
            for span in session.render_section(&doc, index)? {
                match span {
                    Span::Plain(text) => print!("{text}"),
                    Span::Styled { text, .. } => print!("{text}"),
                    Span::Reference { text, .. } => print!("{text}"),
                }
            }
            println!();
        }
        "raw" => {
            let (doc, index, _) = parse_coordinate(rest)?;
            println!("{}", session.book().section(&doc, index)?);
        }
        "set" => {
            let (doc, index, text) = parse_coordinate(rest)?;
            session.apply_edit(&doc, index, Edit::Replace { text })?;
        }
        "type" => {
            let (doc, index, tail) = parse_coordinate(rest)?;
            let (pos, text) = parse_offset(&tail)?;
            session.apply_edit(&doc, index, Edit::Insert { pos, text })?;
        }
        "del" => {
            let (doc, index, tail) = parse_coordinate(rest)?;
            let (pos, _) = parse_offset(&tail)?;
            session.apply_edit(&doc, index, Edit::Remove { pos })?;
        }
        other => println!("unknown command: {other}"),
    }
    Ok(())
}

/// Parse `<doc> <idx> [remainder]`
fn parse_coordinate(args: &str) -> Result<(String, usize, String)> {
    let mut parts = args.splitn(3, ' ');
    let doc = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow::anyhow!("expected a document name"))?;
    let index: usize = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("expected a section index"))?
        .parse()?;
    let rest = parts.next().unwrap_or("").to_string();
    Ok((doc.to_string(), index, rest))
}

/// Parse `<pos> [text]`
fn parse_offset(args: &str) -> Result<(usize, String)> {
    let mut parts = args.splitn(2, ' ');
    let pos: usize = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow::anyhow!("expected a character offset"))?
        .parse()?;
    let text = parts.next().unwrap_or("").to_string();
    Ok((pos, text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_coordinate() {
        let (doc, index, rest) = parse_coordinate("book 2 hello world").unwrap();
        assert_eq!(doc, "book");
        assert_eq!(index, 2);
        assert_eq!(rest, "hello world");

        assert!(parse_coordinate("").is_err());
        assert!(parse_coordinate("book x").is_err());
    }

    #[test]
    fn test_parse_offset() {
        let (pos, text) = parse_offset("4 ]").unwrap();
        assert_eq!(pos, 4);
        assert_eq!(text, "]");
    }
}
