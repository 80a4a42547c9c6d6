//! User-Agent for outbound HTTP (meeting provider, webhooks).
//!
//! Format: `tutorcall/{version} ({os}; {arch})`

use std::sync::OnceLock;

static USER_AGENT: OnceLock<String> = OnceLock::new();

pub fn user_agent() -> &'static str {
    USER_AGENT.get_or_init(|| {
        format!(
            "tutorcall/{} ({}; {})",
            env!("CARGO_PKG_VERSION"),
            std::env::consts::OS,
            std::env::consts::ARCH
        )
    })
}
