//! Core library for the budget-ingest command line application.
//!
//! Budget workbooks lay out one account per row with twelve monthly amount
//! columns, interleaved with unit marker rows and free-form noise. The library
//! turns them into narrow per-month facts numbered from an append-only ledger.
//! Row tagging lives in [`budget::ingest::classify`], the stateful fold over a
//! sheet in [`budget::ingest::assemble`], the wide-to-narrow expansion in
//! [`budget::ingest::pivot`], and the spreadsheet and ledger adapters under
//! [`budget::ingest::io`]. [`budget::ingest::import`] ties them together.

pub mod budget;

pub use budget::ingest::{
    IngestError, Result, assemble, chart, classify, code, config, error, import, io, model, pivot,
    registry,
};
