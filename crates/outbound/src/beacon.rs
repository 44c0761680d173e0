use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use attendy_core::resilience::{AbandonmentBeacon, AbandonmentNotice};
use attendy_core::store::DispatchError;

/// Marks an attendance incomplete over the record store's HTTP surface
/// during process teardown. An attendance that was never persisted is
/// created in the same request; one that exists is patched in place.
pub struct HttpAbandonmentBeacon {
    client: Client,
    base_url: String,
}

impl HttpAbandonmentBeacon {
    pub fn new(base_url: impl Into<String>, request_timeout_secs: u64) -> Result<Self, DispatchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(request_timeout_secs.max(1)))
            .build()
            .map_err(|error| DispatchError(error.to_string()))?;
        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_owned() })
    }

    fn target_url(&self, notice: &AbandonmentNotice) -> String {
        match &notice.session.id {
            Some(id) => format!("{}/attendance/{}", self.base_url, id.0),
            None => format!("{}/attendance", self.base_url),
        }
    }
}

/// The wire shape of the incomplete-attendance write.
fn notice_payload(notice: &AbandonmentNotice) -> serde_json::Value {
    let session = &notice.session;
    json!({
        "org_id": session.org_id.0,
        "operator_id": session.operator_id.0,
        "lead_id": session.lead_id.as_ref().map(|lead| lead.0.clone()),
        "phone_searched": session.phone_searched,
        "lead_existed": session.lead_existed,
        "conversation_mode": session.conversation_mode.map(|mode| mode.as_str()),
        "current_step": session.current_step.as_str(),
        "started_at": session.started_at.to_rfc3339(),
        "completed": false,
    })
}

#[async_trait]
impl AbandonmentBeacon for HttpAbandonmentBeacon {
    async fn send(&self, notice: &AbandonmentNotice) -> Result<(), DispatchError> {
        let url = self.target_url(notice);
        let response = self
            .client
            .post(&url)
            .json(&notice_payload(notice))
            .send()
            .await
            .map_err(|error| DispatchError(error.to_string()))?;

        if !response.status().is_success() {
            return Err(DispatchError(format!(
                "beacon endpoint returned {}",
                response.status()
            )));
        }

        debug!(url, "abandonment beacon delivered");
        Ok(())
    }
}
