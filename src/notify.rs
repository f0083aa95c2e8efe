//! Outbound notifications.
//!
//! Delivery is best-effort: a message is posted once on a background task
//! and failures are only logged.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, WhereaboutsError};
use crate::settings::Settings;

/// The two independently configured destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Boot,
    Location,
}
impl Channel {
    pub fn name(&self) -> &'static str {
        match self {
            Channel::Boot => "boot",
            Channel::Location => "location",
        }
    }
}

/// Fire-and-forget dispatch of a formatted message.
pub trait Notifier: Send + Sync {
    fn dispatch(&self, channel: Channel, text: String);
}

/// The JSON body posted to a webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub value1: String,
}

pub struct WebhookNotifier {
    client: reqwest::Client,
    boot_url: Option<String>,
    location_url: Option<String>,
}

impl WebhookNotifier {
    pub fn new(
        boot_url: Option<String>,
        location_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, boot_url, location_url })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            settings.boot_webhook_url.clone(),
            settings.location_webhook_url.clone(),
            settings.notify_timeout(),
        )
    }

    fn url(&self, channel: Channel) -> Option<&str> {
        let url = match channel {
            Channel::Boot => self.boot_url.as_deref(),
            Channel::Location => self.location_url.as_deref(),
        };
        url.filter(|url| !url.is_empty())
    }

    /// Posts one message and waits for the answer.
    pub async fn deliver(&self, channel: Channel, text: String) -> Result<()> {
        let url = self.url(channel).ok_or_else(|| {
            let name = channel.name();
            WhereaboutsError::Delivery(format!("no webhook configured for the {name} channel"))
        })?;
        post(&self.client, url, text).await
    }
}

impl Notifier for WebhookNotifier {
    /// Must be called from within a Tokio runtime.
    fn dispatch(&self, channel: Channel, text: String) {
        let Some(url) = self.url(channel).map(str::to_owned) else {
            debug!(channel = channel.name(), "no webhook configured, message dropped");
            return;
        };
        let client = self.client.clone();
        tokio::spawn(async move {
            match post(&client, &url, text).await {
                Ok(()) => debug!(channel = channel.name(), "notification delivered"),
                Err(e) => warn!(channel = channel.name(), error = %e, "notification not delivered"),
            }
        });
    }
}

async fn post(client: &reqwest::Client, url: &str, text: String) -> Result<()> {
    let body = serde_json::to_vec(&Payload { value1: text })
        .map_err(|e| WhereaboutsError::Delivery(e.to_string()))?;
    let response = client
        .post(url)
        .header(CONTENT_TYPE, "application/json; charset=UTF-8")
        .body(body)
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        return Err(WhereaboutsError::Delivery(format!("{url} answered {status}")));
    }
    Ok(())
}
