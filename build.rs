//! Build script for tutorcall
//!
//! Injects the build-time default for MEETING_API_URL from the environment.
//! It can be overridden at runtime via TUTORCALL_MEETING_URL or config.toml.

fn main() {
    // Load .env file if present (for local development)
    let _ = dotenvy::dotenv();

    let meeting_api_url = std::env::var("MEETING_API_URL")
        .unwrap_or_else(|_| "https://api.zoom.us/v2".to_string());

    // Pass to compiler as compile-time env var
    println!("cargo:rustc-env=MEETING_API_URL={}", meeting_api_url);

    // Re-run if this changes
    println!("cargo:rerun-if-env-changed=MEETING_API_URL");
    println!("cargo:rerun-if-changed=.env");
}
