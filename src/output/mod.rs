pub mod reporter;
pub mod summary;
pub mod writer_csv;
pub mod writer_jsonl;

pub use reporter::{Reporter, TargetReport};
pub use summary::ScanSummary;
pub use writer_csv::{write_signals_csv, write_targets_csv};
pub use writer_jsonl::{append_jsonl, write_jsonl};
