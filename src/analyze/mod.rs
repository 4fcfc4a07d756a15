pub mod fingerprint;
pub mod links;
pub mod robots;

pub use fingerprint::{service_names, Fingerprinter, Signal, SignalKind};
pub use links::{LinkInventory, LinkScope};
pub use robots::{is_robots_file, parse_robots, RobotsRules};
