pub mod assemble;
pub mod chart;
pub mod classify;
pub mod code;
pub mod config;
pub mod error;
pub mod import;
pub mod io;
pub mod model;
pub mod pivot;
pub mod registry;

pub use error::{IngestError, Result};
