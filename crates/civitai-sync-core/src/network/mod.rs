//! Network layer: transport, rate gate, retries and the Civitai client.

mod civitai;
mod rate_limit;
mod retry;
#[doc(hidden)]
pub mod testing;
mod transport;

pub use civitai::{list_image_urls, CivitaiClient, LookupResult};
pub use rate_limit::{GatePermit, RateGate, RateLimiterState};
pub use retry::{RetryConfig, RetryStats};
pub use transport::{extract_domain, BodyStream, ReqwestTransport, Transport, TransportResponse};
