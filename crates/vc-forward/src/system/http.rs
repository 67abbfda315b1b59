//! Local service probing over HTTP

use async_trait::async_trait;
use std::time::Duration;

use vc_core::traits::LocalProbe;
use vc_core::ModelIdentity;

use crate::remote::models_url;

/// Probes `http://127.0.0.1:<port>/v1/models`
#[derive(Clone, Default)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocalProbe for HttpProbe {
    async fn probe(&self, port: u16, timeout: Duration) -> Option<ModelIdentity> {
        let response = match self.client.get(models_url(port)).timeout(timeout).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::trace!("Port {} did not answer: {}", port, e);
                return None;
            }
        };
        if !response.status().is_success() {
            tracing::trace!("Port {} answered {}", port, response.status());
            return None;
        }
        let body = response.text().await.ok()?;
        ModelIdentity::from_listing(&body)
    }
}
