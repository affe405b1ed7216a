use spectrail_core::{Error, Settings};
use std::collections::HashMap;

#[test]
fn settings_defaults_match_spec() {
    let settings = Settings::from_map(&HashMap::new()).unwrap();
    assert_eq!(settings.provider_name, "openai");
    assert_eq!(settings.base_url, "https://api.openai.com/v1");
    assert_eq!(settings.model, "gpt-4o");
    assert_eq!(settings.api_key, "");
    assert!((settings.temperature - 0.2).abs() < f32::EPSILON);
    assert_eq!(settings.max_tokens, 4000);
    assert!(!settings.dev_mode);
}

#[test]
fn settings_rejects_bad_base_url() {
    let mut map = HashMap::new();
    map.insert("base_url".to_string(), "ftp://example.com".to_string());
    let err = Settings::from_map(&map).unwrap_err();
    assert!(matches!(err, Error::InvalidArgs(_)));
}

#[test]
fn settings_rejects_out_of_range_temperature() {
    let mut map = HashMap::new();
    map.insert("temperature".to_string(), "3.5".to_string());
    let err = Settings::from_map(&map).unwrap_err();
    assert!(matches!(err, Error::InvalidArgs(_)));
}

#[test]
fn settings_rejects_zero_max_tokens() {
    let mut map = HashMap::new();
    map.insert("max_tokens".to_string(), "0".to_string());
    assert!(Settings::from_map(&map).is_err());
}

#[test]
fn settings_parses_extra_headers() {
    let mut map = HashMap::new();
    map.insert(
        "extra_headers_json".to_string(),
        r#"{"X-Org": "acme"}"#.to_string(),
    );
    let settings = Settings::from_map(&map).unwrap();
    assert_eq!(settings.extra_headers.get("X-Org").unwrap(), "acme");
}

#[test]
fn settings_falls_back_to_env_api_key() {
    std::env::set_var("SPECTRAIL_API_KEY", "env-key-123");
    let settings = Settings::from_map(&HashMap::new()).unwrap();
    assert_eq!(settings.api_key, "env-key-123");
    std::env::remove_var("SPECTRAIL_API_KEY");
}

#[test]
fn error_codes_are_stable_tags() {
    assert_eq!(Error::InvalidCredentials.code(), "invalid_credentials");
    assert_eq!(Error::RateLimited.code(), "rate_limited");
    assert_eq!(
        Error::ProviderError { status: 500, message: "boom".to_string() }.code(),
        "provider_error"
    );
}

#[test]
fn tool_local_errors_are_recoverable() {
    assert!(Error::UnknownTool("frob".to_string()).is_tool_local());
    assert!(Error::InvalidArgs("bad".to_string()).is_tool_local());
    assert!(Error::PathEscape("../etc".to_string()).is_tool_local());
    assert!(Error::DisallowedCommand("rm -rf".to_string()).is_tool_local());
    assert!(!Error::InvalidCredentials.is_tool_local());
    assert!(!Error::RepoUnavailable("gone".to_string()).is_tool_local());
    assert!(!Error::PersistenceError("disk full".to_string()).is_tool_local());
}
