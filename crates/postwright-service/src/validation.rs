use std::net::IpAddr;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("URL cannot be empty")]
    EmptyUrl,
    #[error("Malformed URL: {0}")]
    MalformedUrl(String),
    #[error("URL must have a host")]
    MissingHost,
    #[error("Local addresses not allowed: {0}")]
    LocalAddress(String),
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
    #[error("Prompt text is required")]
    EmptyPrompt,
    #[error("Invalid image number {0}. Must be 1 or 2")]
    InvalidImageNumber(i64),
    #[error("Invalid model type \"{0}\". Must be \"nova\" or \"titan\"")]
    UnknownModel(String),
    #[error("Invalid request body: {0}")]
    InvalidBody(String),
}

/// Parses a submitted article URL.
/// Guarantees: HTTP/HTTPS scheme and a non-empty host.
pub fn validate_url(url_str: &str) -> Result<Url, ValidationError> {
    let url_str = url_str.trim();
    if url_str.is_empty() {
        return Err(ValidationError::EmptyUrl);
    }

    let url =
        Url::parse(url_str).map_err(|_| ValidationError::MalformedUrl(url_str.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(ValidationError::UnsupportedScheme(scheme.to_string())),
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(ValidationError::MissingHost),
    }
}

/// Refuses loopback and private-network hosts so the fetcher cannot be
/// pointed at the machine it runs on.
pub fn reject_local_host(url: &Url) -> Result<(), ValidationError> {
    let host = url
        .host_str()
        .ok_or(ValidationError::MissingHost)?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_lowercase();

    let is_local = match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => ip.is_loopback() || ip.is_private() || ip.is_unspecified(),
        Ok(IpAddr::V6(ip)) => ip.is_loopback() || ip.is_unspecified(),
        Err(_) => host == "localhost" || host.ends_with(".localhost"),
    };

    if is_local {
        return Err(ValidationError::LocalAddress(host));
    }
    Ok(())
}

/// Trims prompt text and rejects it when nothing is left.
pub fn validate_prompt_text(prompt: &str) -> Result<String, ValidationError> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(ValidationError::EmptyPrompt);
    }
    Ok(prompt.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_https_url() {
        assert!(validate_url("https://example.com/article").is_ok());
    }

    #[test]
    fn test_validate_trims_whitespace() {
        let url = validate_url("  https://example.com/a  ").unwrap();
        assert_eq!(url.as_str(), "https://example.com/a");
    }

    #[test]
    fn test_empty_url_returns_empty_error() {
        assert_eq!(validate_url("   "), Err(ValidationError::EmptyUrl));
    }

    #[test]
    fn test_url_without_scheme_is_malformed() {
        assert!(matches!(
            validate_url("example.com/article"),
            Err(ValidationError::MalformedUrl(_))
        ));
    }

    #[test]
    fn test_url_without_host_is_malformed() {
        assert!(matches!(
            validate_url("https://"),
            Err(ValidationError::MalformedUrl(_))
        ));
    }

    #[test]
    fn test_ftp_scheme_returns_unsupported_error() {
        assert!(matches!(
            validate_url("ftp://example.com/file"),
            Err(ValidationError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn test_javascript_scheme_returns_unsupported_error() {
        assert!(matches!(
            validate_url("javascript:alert('xss')"),
            Err(ValidationError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn test_local_hosts_are_rejected() {
        for raw in [
            "http://localhost/x",
            "http://127.0.0.1/x",
            "http://10.1.2.3/x",
            "http://192.168.0.1/x",
            "http://[::1]/x",
        ] {
            let url = validate_url(raw).unwrap();
            assert!(
                matches!(reject_local_host(&url), Err(ValidationError::LocalAddress(_))),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn test_public_host_is_accepted() {
        let url = validate_url("https://news.example.org/story").unwrap();
        assert!(reject_local_host(&url).is_ok());
    }

    #[test]
    fn test_blank_prompt_rejected() {
        assert_eq!(validate_prompt_text(" \n"), Err(ValidationError::EmptyPrompt));
        assert_eq!(validate_prompt_text(" red ").unwrap(), "red");
    }
}
