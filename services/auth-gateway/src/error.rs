//! HTTP error mapping for gateway handlers

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pkce_flow::ErrorKind;
use serde_json::json;
use thiserror::Error;

/// Errors returned by request handlers.
///
/// Flow errors render their public message only; internal detail stays in
/// the logs.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Flow(#[from] pkce_flow::Error),

    #[error("bad request: {0}")]
    BadRequest(String),

    /// The provider redirected back with an `error` parameter.
    #[error("authorization denied by provider: {0}")]
    ProviderDenied(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Flow(e) => match e.kind() {
                kind if kind.is_client_error() => StatusCode::UNAUTHORIZED,
                ErrorKind::UpstreamExchange | ErrorKind::IdentityLookup => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ProviderDenied(_) => StatusCode::UNAUTHORIZED,
        }
    }

    /// Label for the `kind` field of the response body and for metrics.
    pub fn kind_label(&self) -> &'static str {
        match self {
            ApiError::Flow(e) => e.kind().label(),
            ApiError::BadRequest(_) => "bad_request",
            ApiError::ProviderDenied(_) => "provider_denied",
        }
    }

    fn public_message(&self) -> String {
        match self {
            ApiError::Flow(e) => e.public_message().to_string(),
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::ProviderDenied(_) => "authorization was denied, please restart login".into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.public_message(),
            "kind": self.kind_label(),
        });
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkce_flow::Error;

    #[test]
    fn client_errors_map_to_unauthorized() {
        for err in [
            Error::NotFound,
            Error::Expired,
            Error::DuplicateState,
            Error::Revoked,
            Error::CredentialExpired,
            Error::InvalidCredential("bad signature".into()),
        ] {
            assert_eq!(ApiError::from(err).status(), StatusCode::UNAUTHORIZED);
        }
        assert_eq!(
            ApiError::ProviderDenied("access_denied".into()).status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn upstream_errors_map_to_bad_gateway() {
        let err = ApiError::from(Error::UpstreamExchange("timeout".into()));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        let err = ApiError::from(Error::IdentityLookup("500".into()));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn server_errors_map_to_internal() {
        let err = ApiError::from(Error::Signing("bad key".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let err = ApiError::from(Error::EntropySource("no rng".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let err = ApiError::from(Error::InvalidTtl("overflow".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.kind_label(), "invalid_ttl");
    }

    #[tokio::test]
    async fn response_body_hides_internal_detail() {
        let err = ApiError::from(Error::UpstreamExchange(
            "invalid_grant: client secret s3cr3t rejected".into(),
        ));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let text = String::from_utf8_lossy(&body);
        assert!(!text.contains("s3cr3t"), "body leaked detail: {text}");

        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["kind"], "upstream_exchange");
        assert_eq!(json["error"], "sign-in with the identity provider failed");
    }
}
