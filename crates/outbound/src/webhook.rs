use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use attendy_core::store::{DispatchError, WebhookDispatcher};

/// JSON POST with a bounded timeout. The response body is ignored; a non-2xx
/// status still counts as a failed dispatch so the caller can log it.
pub struct HttpWebhookDispatcher {
    client: Client,
}

impl HttpWebhookDispatcher {
    pub fn new(request_timeout_secs: u64) -> Result<Self, DispatchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(request_timeout_secs.max(1)))
            .build()
            .map_err(|error| DispatchError(error.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookDispatcher for HttpWebhookDispatcher {
    async fn dispatch(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<(), DispatchError> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|error| DispatchError(error.to_string()))?;

        if !response.status().is_success() {
            return Err(DispatchError(format!(
                "webhook endpoint returned {}",
                response.status()
            )));
        }

        debug!(url, "webhook dispatched");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use attendy_core::store::WebhookDispatcher;
    use serde_json::json;

    use super::HttpWebhookDispatcher;

    #[test]
    fn zero_timeout_is_clamped_to_one_second() {
        assert!(HttpWebhookDispatcher::new(0).is_ok());
    }

    #[tokio::test]
    async fn unreachable_endpoint_reports_a_dispatch_error() {
        let dispatcher = HttpWebhookDispatcher::new(1).expect("client");

        // Nothing listens on the discard port; the connect fails fast.
        let error = dispatcher
            .dispatch("http://127.0.0.1:9/hook", &json!({"probe": true}))
            .await
            .expect_err("nothing is listening");
        assert!(!error.0.is_empty());
    }
}
