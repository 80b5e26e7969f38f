//! Unit tests for `AppError` display format and conversions.

use link_digest::AppError;

#[test]
fn display_prefixes_each_kind() {
    let cases = [
        (AppError::Config("bad".into()), "config: bad"),
        (AppError::Slack("bad".into()), "slack: bad"),
        (AppError::Fetch("bad".into()), "fetch: bad"),
        (AppError::Inference("bad".into()), "inference: bad"),
        (AppError::Queue("bad".into()), "queue: bad"),
        (AppError::Io("bad".into()), "io: bad"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn detail_strips_kind_prefix() {
    let err = AppError::Fetch("HTTP 404 Not Found".into());
    assert_eq!(err.detail(), "HTTP 404 Not Found");
}

#[test]
fn error_message_no_trailing_period() {
    let err = AppError::Queue("task queue is closed".into());
    let s = err.to_string();
    assert!(!s.ends_with('.'), "error message must not end with a period: {s}");
}

#[test]
fn toml_error_maps_to_config() {
    let toml_err = toml::from_str::<toml::Value>("= broken").unwrap_err();
    let err: AppError = toml_err.into();
    assert!(err.to_string().starts_with("config: invalid config"));
}

#[test]
fn io_error_maps_to_io() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let err: AppError = io_err.into();
    assert_eq!(err.to_string(), "io: missing");
}

#[test]
fn implements_std_error_trait() {
    fn assert_error<E: std::error::Error>(_: &E) {}
    let err = AppError::Inference("test".into());
    assert_error(&err);
    assert!(!format!("{err:?}").is_empty());
}
