pub mod fetcher;
pub mod http_probe;
pub mod result;
pub mod throttle;

pub use fetcher::{Fetcher, FetchRequest, Transport, TransportError};
pub use http_probe::ReqwestTransport;
pub use result::{HttpResponse, ProbeResult, ProbeStatus};
pub use throttle::RateLimiter;
