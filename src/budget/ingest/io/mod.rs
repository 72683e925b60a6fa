pub mod excel_read;
pub mod excel_write;
pub mod sink;

pub use sink::{HighWaterMark, JsonLinesLedger, JsonLinesSink, RecordSink};
