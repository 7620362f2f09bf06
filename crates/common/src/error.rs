//! Configuration and startup error types

use thiserror::Error;

/// Errors raised while loading configuration and secret material.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing secret: {0}")]
    MissingSecret(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_context() {
        let config_err = Error::Config("state_ttl_secs must be between 30 and 600".into());
        assert_eq!(
            config_err.to_string(),
            "Configuration error: state_ttl_secs must be between 30 and 600"
        );

        let secret_err = Error::MissingSecret("JWT_SECRET".into());
        assert_eq!(secret_err.to_string(), "Missing secret: JWT_SECRET");

        let io_err = Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));
        assert!(
            io_err.to_string().starts_with("I/O error:"),
            "got: {io_err}"
        );
    }

    #[test]
    fn toml_errors_convert() {
        let parse_err = toml::from_str::<toml::Table>("not valid {{{{ toml").unwrap_err();
        let err: Error = parse_err.into();
        assert!(matches!(err, Error::Toml(_)));
    }
}
