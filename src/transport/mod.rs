//! Resilient HTTP transport shared by every outbound XRPC call.
//!
//! - **Pacing**: one process-wide [`RateGate`] spaces out every request.
//! - **Retries**: 429 honours `Retry-After`, 403/5xx and network faults back off
//!   and retry, any other non-2xx fails immediately.
//! - **Interstitials**: transparent proxies that answer with an HTML challenge
//!   page (even with HTTP 200) are satisfied through a side-channel GET before the
//!   original request is replayed.

pub mod client;
pub mod error;
pub mod gate;
pub mod interstitial;

pub use client::{HttpTransport, RetryPolicy, PUBLIC_APPVIEW, USER_AGENT};
pub use error::TransportError;
pub use gate::RateGate;
