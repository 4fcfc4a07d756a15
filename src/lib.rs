pub mod analyze;
pub mod concurrent;
pub mod config;
pub mod discover;
pub mod error;
pub mod external;
pub mod http_client;
pub mod output;
pub mod probe;
pub mod session;
pub mod target;
pub mod utils;

pub use crate::config::{FetchConfig, ScanConfig};
pub use crate::error::{FailureKind, ReconError, Result};
pub use crate::session::{ScanSession, ScanStats};
pub use crate::target::{Scheme, Target};
