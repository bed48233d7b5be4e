//! LLM completion backends for Charmline.
//!
//! Both backends implement `charmline_core::Provider`. The router maps a
//! per-request [`charmline_core::Backend`] to the matching instance.

pub mod anthropic;
pub mod openai_compat;
pub mod router;

pub use anthropic::AnthropicProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderRouter, Route, build_from_config};

use charmline_core::ProviderError;

/// Default per-request HTTP timeout.
pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Map a transport failure to the provider taxonomy.
pub(crate) fn send_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Unavailable(e.to_string())
    }
}

/// Map a non-200 status to the provider taxonomy.
///
/// Throttling and server faults mean the backend cannot serve right now;
/// every other status is a refusal of this particular request.
pub(crate) fn status_error(status: u16, body: String) -> ProviderError {
    match status {
        408 | 504 => ProviderError::Timeout(format!("status {status}: {body}")),
        429 => ProviderError::Unavailable(format!("rate limited: {body}")),
        s if s >= 500 => ProviderError::Unavailable(format!("status {s}: {body}")),
        s => ProviderError::Rejected {
            status_code: s,
            message: body,
        },
    }
}

pub(crate) fn http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}
