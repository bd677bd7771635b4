//! NLP enrichment call: one structured document in, the same document with
//! an `instances` section (header list + entity rows) out.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use linkminer_core::{CoreError, Enricher};
use serde_json::{Value, json};

use crate::DocIntClient;

/// Model spec applied by default: link and reference extraction.
pub const DEFAULT_MODEL: &str = "link;reference";

/// [`Enricher`] backed by the service's NLP model endpoint.
pub struct NlpEnricher {
    client: Arc<DocIntClient>,
    model: String,
}

impl NlpEnricher {
    pub fn new(client: Arc<DocIntClient>) -> Self {
        Self::with_model(client, DEFAULT_MODEL)
    }

    pub fn with_model(client: Arc<DocIntClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl Enricher for NlpEnricher {
    fn name(&self) -> &str {
        "docint-nlp"
    }

    fn enrich<'a>(
        &'a self,
        doc: &'a Value,
    ) -> Pin<Box<dyn Future<Output = Result<Value, CoreError>> + Send + 'a>> {
        Box::pin(async move {
            let body = json!({
                "model": self.model,
                "document": doc,
            });
            let enriched = self
                .client
                .post_json("/nlp/apply", &body)
                .await
                .map_err(|e| CoreError::Enrich(e.to_string()))?;
            tracing::debug!(model = %self.model, "document enriched");
            Ok(enriched)
        })
    }
}
