pub mod exploitdb;
pub mod nmap;
pub mod runner;

pub use exploitdb::{Exploit, ExploitLookup, ExploitMatch, LookupError, Searchsploit};
pub use nmap::OpenPort;
