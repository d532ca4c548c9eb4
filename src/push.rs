use axum::async_trait;
use tracing::debug;

/// Delivers a push message to a single device token. Delivery is
/// best-effort: callers log failures and move on.
#[async_trait]
pub trait PushClient: Send + Sync {
    async fn send(
        &self,
        token: &str,
        title: &str,
        body: &str,
        data: &serde_json::Value,
    ) -> anyhow::Result<()>;
}

/// FCM-style HTTPS gateway: one JSON POST per message, authorized with a
/// server key.
pub struct HttpPush {
    client: reqwest::Client,
    url: String,
    server_key: String,
}

impl HttpPush {
    pub fn new(url: String, server_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            server_key,
        }
    }
}

#[async_trait]
impl PushClient for HttpPush {
    async fn send(
        &self,
        token: &str,
        title: &str,
        body: &str,
        data: &serde_json::Value,
    ) -> anyhow::Result<()> {
        let payload = serde_json::json!({
            "to": token,
            "notification": { "title": title, "body": body },
            "data": data,
        });
        let res = self
            .client
            .post(&self.url)
            .bearer_auth(&self.server_key)
            .json(&payload)
            .send()
            .await?;
        if !res.status().is_success() {
            anyhow::bail!("push gateway returned {}", res.status());
        }
        debug!(%title, "push delivered");
        Ok(())
    }
}

/// Used when no gateway is configured: accepts and drops every message.
pub struct NoopPush;

#[async_trait]
impl PushClient for NoopPush {
    async fn send(
        &self,
        _token: &str,
        title: &str,
        _body: &str,
        _data: &serde_json::Value,
    ) -> anyhow::Result<()> {
        debug!(%title, "push gateway not configured; dropping message");
        Ok(())
    }
}
