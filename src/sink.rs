//! Fire-and-forget event sink

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::error::SourceResult;

/// Notifications the session sends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkAction {
    Fire,
    Decay,
}

impl SinkAction {
    pub fn as_str(self) -> &'static str {
        match self {
            SinkAction::Fire => "fire",
            SinkAction::Decay => "decay",
        }
    }
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn notify(&self, action: SinkAction, body: &Value) -> SourceResult<()>;
}

/// POSTs `?action=<name>` with a JSON body
pub struct RestSink {
    client: Client,
    url: String,
}

impl RestSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> SourceResult<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl EventSink for RestSink {
    async fn notify(&self, action: SinkAction, body: &Value) -> SourceResult<()> {
        self.client
            .post(&self.url)
            .query(&[("action", action.as_str())])
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Sink used when none is configured
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn notify(&self, _action: SinkAction, _body: &Value) -> SourceResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_names() {
        assert_eq!(SinkAction::Fire.as_str(), "fire");
        assert_eq!(
            serde_json::to_string(&SinkAction::Decay).unwrap(),
            "\"decay\""
        );
    }

    #[tokio::test]
    async fn null_sink_accepts_everything() {
        assert!(NullSink.notify(SinkAction::Fire, &Value::Null).await.is_ok());
    }

    #[tokio::test]
    async fn unreachable_sink_reports_an_error() {
        let sink = RestSink::new("http://127.0.0.1:9/sink", Duration::from_millis(500)).unwrap();
        assert!(sink.notify(SinkAction::Decay, &serde_json::json!({})).await.is_err());
    }
}
