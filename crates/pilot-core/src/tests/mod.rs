//! Cross-module tests for pilot-core
//!
//! - Server output pipeline (framing, parsing, sniffing)
//! - Uploading device sets and reading their endpoints
//! - Settings reload

mod fixtures;
