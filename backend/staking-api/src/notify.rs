//! Outbound webhook notifications for operator-facing events.
//!
//! ## Resilience
//!
//! * Delivery runs on a spawned task and never fails the request that
//!   triggered it.
//! * Connection errors, `429` and `5xx` responses are retried with
//!   exponential back-off, up to [`MAX_ATTEMPTS`] tries.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::errors::Result;

const MAX_BACKOFF_SECS: u64 = 60;
const INITIAL_BACKOFF_SECS: u64 = 2;
pub const MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    WithdrawalRequested {
        withdrawal_id: i64,
        investment_id: i64,
        user_email: String,
        kind: String,
        amount: f64,
        trc20_address: Option<String>,
    },
    EarlyWithdrawalRequested {
        withdrawal_id: i64,
        investment_id: i64,
        user_email: String,
        amount: f64,
        forfeited_interest: f64,
        days_invested: i64,
    },
    ReferralWithdrawalRequested {
        withdrawal_id: i64,
        user_email: String,
        amount: f64,
        earning_count: i64,
        trc20_address: String,
    },
    InvestmentConfirmed {
        investment_id: i64,
        user_email: String,
        package: String,
        amount: f64,
        tx_hash: String,
        network: String,
    },
}

#[derive(Debug, Clone)]
pub struct Notifier {
    client: Client,
    url: Option<String>,
}

impl Notifier {
    pub fn new(client: Client, url: Option<String>) -> Self {
        Notifier { client, url }
    }

    /// A notifier that drops every event.
    #[cfg(test)]
    pub fn disabled() -> Self {
        Notifier {
            client: Client::new(),
            url: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    /// Fire-and-forget delivery.
    pub fn send(&self, event: Event) {
        let Some(url) = self.url.clone() else {
            debug!("Webhook disabled, dropping {event:?}");
            return;
        };
        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(e) = deliver(&client, &url, &event).await {
                error!("Webhook delivery failed: {e}");
            }
        });
    }
}

/// Post one event, retrying transient failures.
pub async fn deliver(client: &Client, url: &str, event: &Event) -> Result<()> {
    let mut backoff = INITIAL_BACKOFF_SECS;
    let mut attempt = 1;

    loop {
        let response = client.post(url).json(event).send().await;

        let retry_reason = match response {
            Err(e) if attempt < MAX_ATTEMPTS => format!("{e}"),
            Err(e) => return Err(e.into()),
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    debug!("Webhook delivered on attempt {attempt}");
                    return Ok(());
                }
                let transient = status == reqwest::StatusCode::TOO_MANY_REQUESTS
                    || status.is_server_error();
                if !transient || attempt >= MAX_ATTEMPTS {
                    return resp.error_for_status().map(|_| ()).map_err(Into::into);
                }
                format!("status {status}")
            }
        };

        warn!("Webhook attempt {attempt} failed (will retry in {backoff}s): {retry_reason}");
        tokio::time::sleep(Duration::from_secs(backoff)).await;
        backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
        attempt += 1;
    }
}
