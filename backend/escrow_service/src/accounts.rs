//! Core-banking account service client.
//!
//! `POST {base_url}/accounts` with `{"anchorAccount", "mode"}` answers
//! `{"accountNumber"}`. A missing number (or `"NIL"`, which the lifecycle
//! checks for) is a provisioning failure, not a transport one.
//!
//! ## Resilience
//!
//! * Connection failures and rate-limit responses never reached the account
//!   ledger, so they are retried with exponential back-off, at most
//!   [`MAX_ATTEMPTS`] times.
//! * Anything else (timeouts, server errors) may have opened an account and is
//!   returned as an error instead of being retried.

use std::time::Duration;

use async_trait::async_trait;
use escrow_lifecycle::provisioning::{AccountCreationService, AccountMode};
use escrow_lifecycle::storage::StoreResult;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::Result;

const MAX_BACKOFF_SECS: u64 = 8;
const INITIAL_BACKOFF_SECS: u64 = 1;
const MAX_ATTEMPTS: u32 = 4;

// ─────────────────────────────────────────────────────────
// Wire shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AccountRequest<'a> {
    anchor_account: &'a str,
    mode: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    account_number: Option<String>,
}

/// Decode a successful response body into the returned account number.
fn decode_account(body: &str) -> Result<Option<String>> {
    let response: AccountResponse = serde_json::from_str(body)?;
    Ok(response.account_number)
}

fn next_backoff(current: u64) -> u64 {
    (current * 2).min(MAX_BACKOFF_SECS)
}

// ─────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────

pub struct HttpAccountService {
    client: Client,
    endpoint: String,
}

impl HttpAccountService {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/accounts", base_url.trim_end_matches('/')),
        }
    }

    async fn request(&self, anchor_account: &str, mode: AccountMode) -> Result<Option<String>> {
        let payload = AccountRequest {
            anchor_account,
            mode: mode.as_str(),
        };
        let mut backoff = INITIAL_BACKOFF_SECS;
        let mut attempt = 1;

        loop {
            let response = self.client.post(&self.endpoint).json(&payload).send().await;

            match response {
                Err(e) if e.is_connect() && attempt < MAX_ATTEMPTS => {
                    warn!("Account service unreachable (will retry in {backoff}s): {e}");
                }
                Err(e) => return Err(e.into()),
                Ok(resp)
                    if resp.status() == StatusCode::TOO_MANY_REQUESTS && attempt < MAX_ATTEMPTS =>
                {
                    warn!("Rate-limited by account service (will retry in {backoff}s)");
                }
                Ok(resp) => {
                    let resp = resp.error_for_status()?;
                    let body = resp.text().await?;
                    let account = decode_account(&body)?;
                    debug!(
                        "Account service answered {:?} for {} ({})",
                        account,
                        anchor_account,
                        mode.as_str()
                    );
                    return Ok(account);
                }
            }

            tokio::time::sleep(Duration::from_secs(backoff)).await;
            backoff = next_backoff(backoff);
            attempt += 1;
        }
    }
}

#[async_trait]
impl AccountCreationService for HttpAccountService {
    async fn create(
        &self,
        anchor_account: &str,
        mode: AccountMode,
    ) -> StoreResult<Option<String>> {
        Ok(self.request(anchor_account, mode).await?)
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
