//! MobileSheets extraction library: scanning, database enrichment,
//! duplicate classification, ChordPro augmentation and export.

pub mod augment;
pub mod chordpro;
pub mod classify;
pub mod cli;
pub mod database;
pub mod error;
pub mod export;
pub mod models;
pub mod progress;
pub mod safety;
pub mod scan;
pub mod song;
pub mod text;
