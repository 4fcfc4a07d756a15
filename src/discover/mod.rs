pub mod dns;
pub mod enumerator;
pub mod wordlist;

pub use dns::{subdomain_exists, DnsProbe, DnsResolve, HickoryResolver, RecordKind};
pub use enumerator::{enumerate, Candidates, Mode, Seed};
