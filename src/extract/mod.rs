//! Parsers for the pages and payloads the site serves. All functions here are
//! pure: they take a document and return records, with no I/O.

pub mod detail;
pub mod listing;
pub mod metagraph;
pub mod next_data;
pub mod text;
