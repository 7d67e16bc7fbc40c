// src/fetch/http.rs
use reqwest::blocking::Client;
use std::time::Duration;
use tracing::info;
use url::Url;

use super::{file::parse_documents, Document, RecordSource};
use crate::error::{PipelineError, Result};

/// Remote collection served as JSON at `<base>/<database>/<collection>`.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    url: Url,
}

impl HttpSource {
    pub fn new(base: Url, database: &str, collection: &str, timeout: Duration) -> Result<Self> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| PipelineError::InvalidConfig(format!("source.uri `{}` cannot be a base", base)))?
            .pop_if_empty()
            .push(database)
            .push(collection);

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::SourceUnavailable {
                location: url.to_string(),
                source: Box::new(e),
            })?;
        Ok(Self { client, url })
    }
}

impl RecordSource for HttpSource {
    fn location(&self) -> String {
        self.url.to_string()
    }

    fn fetch_documents(&self) -> Result<Vec<Document>> {
        let unavailable = |source: crate::error::BoxError| PipelineError::SourceUnavailable {
            location: self.location(),
            source,
        };

        let body = self
            .client
            .get(self.url.clone())
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.text())
            .map_err(|e| unavailable(Box::new(e)))?;
        let documents = parse_documents(&body).map_err(unavailable)?;
        info!(url = %self.url, documents = documents.len(), "fetched collection");
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_host_is_unavailable() {
        // port 9 on loopback: connection refused well within the timeout
        let src = HttpSource::new(
            Url::parse("http://127.0.0.1:9/api/").unwrap(),
            "db",
            "coll",
            Duration::from_secs(2),
        )
        .unwrap();
        assert_eq!(src.location(), "http://127.0.0.1:9/api/db/coll");
        assert!(matches!(
            src.fetch_documents(),
            Err(PipelineError::SourceUnavailable { .. })
        ));
    }
}
