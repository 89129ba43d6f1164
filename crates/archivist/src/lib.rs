//! Archivist command-line front end
//!
//! Thin layer over `archivist_scout`: every command loads configuration,
//! opens the index and calls one engine or query operation.

pub mod cli;
