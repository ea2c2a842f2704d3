//! File system storage
//!
//! Delimited file exports, staged beside their target and committed by rename.

mod delimited;

pub use delimited::{DelimitedFileSession, DelimitedFileWriter, Quoting};
