//! SOAP/DSML envelope construction

use crate::config::DirectoryEndpoint;
use crate::query::CompiledQuery;
use quick_xml::escape::escape;
use uuid::Uuid;

/// A request ready to send
#[derive(Debug, Clone)]
pub struct Envelope {
    pub message_id: String,
    pub request_id: String,
    pub body: String,
}

/// Fills the envelope template for a compiled query
#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    template: String,
}

impl EnvelopeCodec {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Build the envelope and apply the endpoint's transform, if any
    pub fn encode(&self, query: &CompiledQuery, endpoint: &DirectoryEndpoint) -> Envelope {
        let message_id = Uuid::new_v4().to_string();
        let request_id = Uuid::new_v4().to_string();
        let search_request = query.search_request_dsml(&request_id);

        let body = self
            .template
            .replace("{message_id}", &message_id)
            .replace("{service_url}", &escape(endpoint.service_url.as_str()))
            .replace("{batch_request_id}", &request_id)
            .replace("{search_request}", &search_request);

        Envelope {
            message_id,
            request_id,
            body: endpoint.transform_envelope(body),
        }
    }
}
