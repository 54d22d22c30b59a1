//! Incoming-webhook notifications (Slack style `{"text": ...}` payload)

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::Notifier;
use crate::error::TradeError;

#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    webhook_url: String,
    product_id: String,
}

impl WebhookNotifier {
    pub fn new(webhook_url: String, product_id: String) -> Self {
        Self {
            client: Client::new(),
            webhook_url,
            product_id,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, message: &str) -> Result<(), TradeError> {
        let payload = json!({
            "text": format!("[{}] {}", self.product_id, message),
        });

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TradeError::Gateway(format!(
                "webhook returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_posts_text_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_body(Matcher::Json(json!({
                "text": "[BTC-EUR] stop placed at 116.40"
            })))
            .with_status(200)
            .create_async()
            .await;

        let notifier = WebhookNotifier::new(format!("{}/hook", server.url()), "BTC-EUR".to_string());
        notifier.notify("stop placed at 116.40").await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/hook")
            .with_status(500)
            .create_async()
            .await;

        let notifier = WebhookNotifier::new(format!("{}/hook", server.url()), "BTC-EUR".to_string());
        let result = notifier.notify("hello").await;

        assert!(matches!(result, Err(TradeError::Gateway(_))));
    }
}
