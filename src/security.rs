use regex::Regex;

use crate::errors::{AppError, AppResult};

/// Upper bound on attempts per upload accepted from config or the CLI
pub const MAX_RETRY_ATTEMPTS: u32 = 10;

pub struct InputValidator;

impl InputValidator {
    pub fn validate_dashboard_url(url: &str) -> AppResult<()> {
        let trimmed = url.trim();

        if trimmed.is_empty() {
            return Err(AppError::validation("url", "Dashboard URL cannot be empty"));
        }

        let dashboard_pattern = Regex::new(r"^https?://[A-Za-z0-9\-\.]+(:\d{1,5})?(/[^\s?#]*)?$")
            .map_err(|e| AppError::Config(e.to_string()))?;

        if !dashboard_pattern.is_match(trimmed) {
            return Err(AppError::invalid_dashboard_url(trimmed));
        }

        if trimmed.len() > 500 {
            return Err(AppError::validation("url", "Dashboard URL too long"));
        }

        Ok(())
    }

    /// Bearer tokens go straight into a header, so they must be a single
    /// printable line.
    pub fn validate_oauth_token(token: &str) -> AppResult<()> {
        if token.trim().is_empty() {
            return Err(AppError::MissingCredentials(
                "OAuth token cannot be empty".to_string(),
            ));
        }

        if token.chars().any(|c| c.is_control() || c.is_whitespace()) {
            return Err(AppError::validation(
                "oauth_token",
                "OAuth token contains whitespace or control characters",
            ));
        }

        Ok(())
    }

    pub fn validate_retry_settings(max_attempts: u32) -> AppResult<()> {
        if max_attempts == 0 || max_attempts > MAX_RETRY_ATTEMPTS {
            return Err(AppError::validation(
                "max_retry_attempts",
                "Must be between 1 and 10",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dashboard_urls() {
        assert!(InputValidator::validate_dashboard_url("https://chromeperf.appspot.com").is_ok());
        assert!(InputValidator::validate_dashboard_url("http://localhost:8080/").is_ok());
        assert!(InputValidator::validate_dashboard_url("  https://chromeperf.appspot.com  ").is_ok());

        assert!(InputValidator::validate_dashboard_url("").is_err());
        assert!(matches!(
            InputValidator::validate_dashboard_url("ftp://chromeperf.appspot.com"),
            Err(AppError::InvalidDashboardUrl { .. })
        ));
        assert!(InputValidator::validate_dashboard_url("chromeperf.appspot.com").is_err());
        assert!(InputValidator::validate_dashboard_url("https://host/path?query=1").is_err());
    }

    #[test]
    fn test_oauth_tokens() {
        assert!(InputValidator::validate_oauth_token("ya29.a0AfH6SMB-token_value").is_ok());
        assert!(matches!(
            InputValidator::validate_oauth_token("   "),
            Err(AppError::MissingCredentials(_))
        ));
        assert!(InputValidator::validate_oauth_token("token\nInjected: header").is_err());
        assert!(InputValidator::validate_oauth_token("two words").is_err());
    }

    #[test]
    fn test_retry_settings() {
        assert!(InputValidator::validate_retry_settings(1).is_ok());
        assert!(InputValidator::validate_retry_settings(10).is_ok());
        assert!(InputValidator::validate_retry_settings(0).is_err());
        assert!(InputValidator::validate_retry_settings(11).is_err());
    }
}
