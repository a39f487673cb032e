//! Frankfurter (ECB reference data) rate source.

use crate::core::money::Currency;
use crate::core::rate::{ExchangeRate, RateSource};
use crate::providers::util::with_retry;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

pub const SOURCE_NAME: &str = "frankfurter";

const FETCH_RETRIES: usize = 2;
const RETRY_DELAY_MS: u64 = 250;

pub struct FrankfurterSource {
    base_url: String,
    client: reqwest::Client,
}

impl FrankfurterSource {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("hauskasse/0.2")
            .build()?;
        Ok(FrankfurterSource {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[derive(Deserialize, Debug)]
struct FrankfurterResponse {
    base: String,
    /// The date the rates actually belong to; weekends and holidays come
    /// back as the preceding business day.
    date: NaiveDate,
    rates: HashMap<String, Decimal>,
}

#[async_trait]
impl RateSource for FrankfurterSource {
    #[instrument(
        name = "FrankfurterFetch",
        skip(self),
        fields(base = %base, target = %target, date = %date)
    )]
    async fn fetch_rate(
        &self,
        base: &Currency,
        target: &Currency,
        date: NaiveDate,
    ) -> Result<ExchangeRate> {
        let url = format!("{}/{}?from={}&to={}", self.base_url, date, base, target);
        debug!("Requesting exchange rate from {}", url);

        let response = with_retry(
            || self.client.get(&url).send(),
            FETCH_RETRIES,
            RETRY_DELAY_MS,
        )
        .await
        .map_err(|e| anyhow!("Request error: {} for pair {}->{}", e, base, target))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for pair {}->{}",
                response.status(),
                base,
                target
            ));
        }

        let text = response.text().await?;
        let data: FrankfurterResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse rate response for {base}->{target}: {e}"))?;

        if !data.base.eq_ignore_ascii_case(base.as_str()) {
            return Err(anyhow!(
                "Rate response is for base {}, requested {}",
                data.base,
                base
            ));
        }
        let rate = data
            .rates
            .get(target.as_str())
            .copied()
            .ok_or_else(|| anyhow!("No rate in response for pair {}->{}", base, target))?;

        Ok(ExchangeRate::new(
            base.clone(),
            target.clone(),
            data.date,
            rate,
            SOURCE_NAME,
        )?)
    }
}
