//! Result envelope produced by GET calls

use crate::error::RestResult;
use crate::response::HttpResponse;

/// A response correlated with the URL that produced it and, optionally, the
/// file name a downstream step should persist it under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultEnvelope {
    response: HttpResponse,
    url: String,
    file_name: Option<String>,
}

impl ResultEnvelope {
    pub fn new(response: HttpResponse, url: impl Into<String>) -> Self {
        Self {
            response,
            url: url.into(),
            file_name: None,
        }
    }

    pub fn with_file_name(
        response: HttpResponse,
        url: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            response,
            url: url.into(),
            file_name: Some(file_name.into()),
        }
    }

    pub fn response(&self) -> &HttpResponse {
        &self.response
    }

    /// URL as passed by the caller
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn status(&self) -> u16 {
        self.response.status_code
    }

    pub fn is_success(&self) -> bool {
        self.response.is_success()
    }

    pub fn text(&self) -> RestResult<String> {
        self.response.text()
    }

    pub fn into_response(self) -> HttpResponse {
        self.response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::HttpResponseBuilder;

    #[test]
    fn test_envelope_equality_by_value() {
        let response = HttpResponseBuilder::new()
            .status_code(200)
            .body("green")
            .build();

        let a = ResultEnvelope::with_file_name(response.clone(), "/_cluster/health", "cluster_health.json");
        let b = ResultEnvelope::with_file_name(response.clone(), "/_cluster/health", "cluster_health.json");
        let c = ResultEnvelope::new(response, "/_cluster/health");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.file_name(), Some("cluster_health.json"));
        assert_eq!(c.file_name(), None);
        assert_eq!(c.status(), 200);
        assert_eq!(c.text().unwrap(), "green");
    }
}
