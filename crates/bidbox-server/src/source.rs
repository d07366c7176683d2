//! Resolution of function specs to raw script text.
//!
//! Fetching happens on the construction path only (startup and refresher
//! thread), never while serving a request, so the HTTP client here is the
//! blocking one.

use bidbox_common::status::{Result, Status};

use crate::config::FunctionSpec;

/// Resolves a [`FunctionSpec`] to the script body it names.
///
/// Implementations must be callable concurrently and must not serve stale
/// bodies across refresh cycles without revalidation.
pub trait ScriptSource: Send + Sync {
    fn fetch(&self, spec: &FunctionSpec) -> Result<String>;
}

/// Production source: inline bodies for `local://` URIs, a blocking HTTP
/// GET for everything else.
pub struct HttpScriptSource {
    client: reqwest::blocking::Client,
}

impl HttpScriptSource {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| Status::internal(format!("Unable to build the fetch client: {e}")))?;
        Ok(Self { client })
    }
}

impl ScriptSource for HttpScriptSource {
    fn fetch(&self, spec: &FunctionSpec) -> Result<String> {
        match scheme_of(&spec.uri)? {
            "local" => spec
                .source
                .clone()
                .ok_or_else(|| {
                    Status::invalid_argument(
                        "Function source code not provided for local function.",
                    )
                }),
            "http" | "https" => {
                tracing::debug!(uri = %spec.uri, "fetching function source");
                let response = self
                    .client
                    .get(&spec.uri)
                    .send()
                    .map_err(|e| Status::internal(format!("Unable to fetch a URL: {e}")))?;
                let status = response.status();
                let body = response
                    .text()
                    .map_err(|e| Status::internal(format!("Unable to fetch a URL: {e}")))?;
                translate_response(status, body)
            }
            other => Err(Status::invalid_argument(format!(
                "Not a valid remote URL scheme '{other}': {}",
                spec.uri
            ))),
        }
    }
}

fn scheme_of(uri: &str) -> Result<&str> {
    match uri.split_once("://") {
        Some((scheme, rest)) if !scheme.is_empty() && !rest.is_empty() => Ok(scheme),
        _ => Err(Status::invalid_argument(format!("Not a valid URL: {uri}"))),
    }
}

fn translate_response(status: reqwest::StatusCode, body: String) -> Result<String> {
    match status.as_u16() {
        200 => Ok(body),
        400 => Err(Status::invalid_argument(
            "The server returned 400 Bad Request status code.",
        )),
        401 | 403 => Err(Status::permission_denied(format!(
            "Unauthenticated or unauthorized request. HTTP status code: {}",
            status.as_u16()
        ))),
        404 => Err(Status::not_found("Resource at the URL was not found.")),
        code => Err(Status::internal(format!("Unable to fetch a URL (HTTP status {code})"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bidbox_common::status::StatusKind;

    fn fetch(spec: FunctionSpec) -> Result<String> {
        HttpScriptSource::new().unwrap().fetch(&spec)
    }

    #[test]
    fn local_uri_returns_inline_source() {
        let body = fetch(FunctionSpec::local("local://double", "input => ({ bid: 2 })")).unwrap();
        assert_eq!(body, "input => ({ bid: 2 })");
    }

    #[test]
    fn local_uri_without_source_is_invalid() {
        let error = fetch(FunctionSpec::remote("local://double")).unwrap_err();
        assert_eq!(error.kind(), StatusKind::InvalidArgument);
        assert!(error.message().contains("not provided for local function"));
    }

    #[test]
    fn schemeless_uri_is_invalid() {
        let error = fetch(FunctionSpec::remote("just-a-name")).unwrap_err();
        assert_eq!(error.kind(), StatusKind::InvalidArgument);
        assert!(error.message().contains("Not a valid URL"));
    }

    #[test]
    fn unknown_scheme_is_invalid() {
        let error = fetch(FunctionSpec::remote("ftp://host/script.js")).unwrap_err();
        assert_eq!(error.kind(), StatusKind::InvalidArgument);
    }

    #[test]
    fn status_translation_covers_the_contract() {
        use reqwest::StatusCode;
        assert_eq!(
            translate_response(StatusCode::OK, "body".into()).unwrap(),
            "body"
        );
        assert_eq!(
            translate_response(StatusCode::BAD_REQUEST, String::new()).unwrap_err().kind(),
            StatusKind::InvalidArgument
        );
        assert_eq!(
            translate_response(StatusCode::UNAUTHORIZED, String::new()).unwrap_err().kind(),
            StatusKind::PermissionDenied
        );
        assert_eq!(
            translate_response(StatusCode::FORBIDDEN, String::new()).unwrap_err().kind(),
            StatusKind::PermissionDenied
        );
        assert_eq!(
            translate_response(StatusCode::NOT_FOUND, String::new()).unwrap_err().kind(),
            StatusKind::NotFound
        );
        assert_eq!(
            translate_response(StatusCode::INTERNAL_SERVER_ERROR, String::new())
                .unwrap_err()
                .kind(),
            StatusKind::Internal
        );
        assert_eq!(
            translate_response(StatusCode::IM_A_TEAPOT, String::new()).unwrap_err().kind(),
            StatusKind::Internal
        );
    }
}
