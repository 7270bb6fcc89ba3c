//! Tracing setup and log-safe helpers.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the tracing filter directive.
pub const LOG_ENV: &str = "DOCCHAT_LOG";

const DEFAULT_DIRECTIVE: &str = "warn";

/// Installs a stderr `fmt` subscriber filtered by `DOCCHAT_LOG`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Masks a bearer token for display, keeping a short prefix and suffix.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 12 {
        return "***".to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token("eyJhbGciOiJIUzI1NiJ9.payload"), "eyJhbG...load");
        assert_eq!(mask_token("short"), "***");
    }
}
