//! Integration tests for header block encoding and compression

mod defaults;
mod encoding;
