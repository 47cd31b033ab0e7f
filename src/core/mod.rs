//! Core functionality for document storage, inline tags, and configuration

pub mod book;
pub mod config;
pub mod tags;
