//! Notification sink (§4.4), grounded on `notifications.py`'s
//! `PushoverClient`: fixed endpoint, `retry=60`/`expire=3600` exactly at
//! priority 2, 10 s outbound timeout, credential-lazy no-op when
//! token/user are absent.

use async_trait::async_trait;
use isahc::{AsyncReadResponseExt, HttpClient, Request};
use std::time::Duration;

const PUSHOVER_API_URL: &str = "https://api.pushover.net/1/messages.json";
const SEND_TIMEOUT: Duration = Duration::from_secs(10);
const EMERGENCY_RETRY_SECS: u64 = 60;
const EMERGENCY_EXPIRE_SECS: u64 = 3600;

#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// `priority` in `[-2, 2]`. Returns `true` on a dispatched (or
    /// fire-and-forget-accepted) send, `false` on any failure, including
    /// absent credentials, which is a no-op rather than an error.
    async fn send(&self, title: &str, body: &str, priority: i8) -> bool;
}

pub struct PushoverClient {
    http_client: HttpClient,
    token: Option<String>,
    user_key: Option<String>,
}

impl PushoverClient {
    pub fn new() -> Self {
        Self {
            http_client: HttpClient::new().expect("isahc client construction never fails"),
            token: None,
            user_key: None,
        }
    }

    /// Hot-swappable credential configuration (§4.4).
    pub fn configure(&mut self, token: Option<String>, user_key: Option<String>) {
        self.token = token;
        self.user_key = user_key;
    }

    pub fn from_env(token_env: &str, user_key_env: &str) -> Self {
        let mut client = Self::new();
        client.configure(std::env::var(token_env).ok(), std::env::var(user_key_env).ok());
        client
    }
}

impl Default for PushoverClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationSink for PushoverClient {
    async fn send(&self, title: &str, body: &str, priority: i8) -> bool {
        let (Some(token), Some(user_key)) = (&self.token, &self.user_key) else {
            return false;
        };

        let mut form = vec![
            ("token".to_string(), token.clone()),
            ("user".to_string(), user_key.clone()),
            ("title".to_string(), title.to_string()),
            ("message".to_string(), body.to_string()),
            ("priority".to_string(), priority.to_string()),
        ];
        if priority == 2 {
            form.push(("retry".to_string(), EMERGENCY_RETRY_SECS.to_string()));
            form.push(("expire".to_string(), EMERGENCY_EXPIRE_SECS.to_string()));
        }

        let encoded = form
            .iter()
            .map(|(k, v)| format!("{k}={}", url::form_urlencoded::byte_serialize(v.as_bytes()).collect::<String>()))
            .collect::<Vec<_>>()
            .join("&");

        let request = match Request::post(PUSHOVER_API_URL)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(encoded)
        {
            Ok(req) => req,
            Err(_) => return false,
        };

        let send_future = self.http_client.send_async(request);
        match tokio::time::timeout(SEND_TIMEOUT, send_future).await {
            Ok(Ok(mut response)) => {
                let _ = response.consume().await;
                response.status().is_success()
            }
            Ok(Err(_)) | Err(_) => false,
        }
    }
}

/// In-memory sink for tests: records every call instead of dispatching
/// network traffic.
#[cfg(any(test, feature = "test-support"))]
pub struct MockNotificationSink {
    pub sent: std::sync::Mutex<Vec<(String, String, i8)>>,
}

#[cfg(any(test, feature = "test-support"))]
impl MockNotificationSink {
    pub fn new() -> Self {
        Self {
            sent: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Default for MockNotificationSink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl NotificationSink for MockNotificationSink {
    async fn send(&self, title: &str, body: &str, priority: i8) -> bool {
        self.sent
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string(), priority));
        true
    }
}
