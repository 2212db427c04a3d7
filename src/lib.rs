#![doc = "atom2remarkable: recent feed entries to paginated PDFs, delivered to reMarkable Cloud."]

//! The crate is organised as a download → preprocess → upload pipeline driven by
//! [`synchronise`]. Every stage reports a tagged result so one bad feed or entry
//! never aborts the run; only a failed startup precondition is fatal.

pub mod cli;
pub mod config;
pub mod contract;
pub mod download;
pub mod error;
pub mod load_config;
pub mod logging;
pub mod output;
pub mod preprocess;
pub mod recency;
pub mod synchronise;
pub mod upload;
