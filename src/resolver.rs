//! Exchange-rate resolution. A resolution walks an ordered list of lookup
//! steps and short-circuits on the first hit: identity, in-memory TTL
//! cache, exact store row, nearest prior store row within the look-back
//! window, external fetch (single-flight, write-through), inverse pair.
//! A miss everywhere is `RateError::Unavailable`, never a default rate.

use crate::core::money::Currency;
use crate::core::rate::{
    ExchangeRate, RATE_SIGNIFICANT_DIGITS, RateError, RateSource, ResolvedRate,
};
use crate::core::store::RateStore;
use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub cache_ttl: Duration,
    pub lookback_days: u32,
    pub fetch_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            lookback_days: 7,
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RateKey {
    base: Currency,
    target: Currency,
    date: NaiveDate,
}

struct CacheEntry {
    value: ResolvedRate,
    expires_at: Instant,
}

/// Process-lifetime cache of resolved rates, keyed by (base, target, date).
struct RateCache {
    inner: Mutex<HashMap<RateKey, CacheEntry>>,
    ttl: Duration,
}

impl RateCache {
    fn new(ttl: Duration) -> Self {
        RateCache {
            inner: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    async fn get(&self, key: &RateKey) -> Option<ResolvedRate> {
        let mut cache = self.inner.lock().await;
        if let Some(entry) = cache.get(key) {
            if entry.expires_at < Instant::now() {
                debug!(?key, "cache entry expired");
                cache.remove(key);
                return None;
            }
            debug!(?key, "cache HIT");
            return Some(entry.value.clone());
        }
        debug!(?key, "cache MISS");
        None
    }

    async fn put(&self, key: RateKey, value: ResolvedRate) {
        let mut cache = self.inner.lock().await;
        debug!(?key, "cache PUT");
        cache.insert(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }
}

/// One step of the resolution chain. Steps answer `Ok(None)` for "no rate
/// here, keep walking"; adding a source is adding a step, the walk itself
/// never changes.
#[async_trait]
pub trait ResolveStep: Send + Sync {
    fn name(&self) -> &'static str;

    async fn lookup(
        &self,
        base: &Currency,
        target: &Currency,
        date: NaiveDate,
    ) -> Result<Option<ResolvedRate>, RateError>;
}

struct StoreExact {
    store: Arc<dyn RateStore>,
}

#[async_trait]
impl ResolveStep for StoreExact {
    fn name(&self) -> &'static str {
        "store-exact"
    }

    async fn lookup(
        &self,
        base: &Currency,
        target: &Currency,
        date: NaiveDate,
    ) -> Result<Option<ResolvedRate>, RateError> {
        let row = match self.store.find_exact(base, target, date).await {
            Ok(row) => row,
            Err(e) => {
                warn!(%base, %target, %date, error = %e, "rate store read failed");
                return Ok(None);
            }
        };
        Ok(row.map(|r| ResolvedRate {
            rate: r.rate,
            date: r.date,
            source: r.source,
            approximated: false,
        }))
    }
}

struct NearestPrior {
    store: Arc<dyn RateStore>,
    lookback_days: u32,
}

#[async_trait]
impl ResolveStep for NearestPrior {
    fn name(&self) -> &'static str {
        "nearest-prior"
    }

    async fn lookup(
        &self,
        base: &Currency,
        target: &Currency,
        date: NaiveDate,
    ) -> Result<Option<ResolvedRate>, RateError> {
        let earliest = date
            .checked_sub_days(Days::new(self.lookback_days as u64))
            .unwrap_or(NaiveDate::MIN);
        let row = match self
            .store
            .find_latest_before(base, target, date, earliest)
            .await
        {
            Ok(row) => row,
            Err(e) => {
                warn!(%base, %target, %date, error = %e, "rate store read failed");
                return Ok(None);
            }
        };
        Ok(row.map(|r| {
            debug!(%base, %target, requested = %date, actual = %r.date, "using prior-date rate");
            ResolvedRate {
                rate: r.rate,
                date: r.date,
                source: r.source,
                // exact matches are handled by the previous step; anything
                // here is from an earlier day and must be flagged
                approximated: r.date != date,
            }
        }))
    }
}

struct ExternalFetch {
    source: Arc<dyn RateSource>,
    store: Arc<dyn RateStore>,
    cache: Arc<RateCache>,
    flights: Mutex<HashMap<RateKey, Arc<Mutex<()>>>>,
    timeout: Duration,
}

#[async_trait]
impl ResolveStep for ExternalFetch {
    fn name(&self) -> &'static str {
        "external"
    }

    async fn lookup(
        &self,
        base: &Currency,
        target: &Currency,
        date: NaiveDate,
    ) -> Result<Option<ResolvedRate>, RateError> {
        let key = RateKey {
            base: base.clone(),
            target: target.clone(),
            date,
        };

        // Single-flight: concurrent misses for one key coalesce on a
        // per-key gate; followers re-check the cache once the leader is
        // done instead of issuing their own fetch.
        let gate = {
            let mut flights = self.flights.lock().await;
            flights.entry(key.clone()).or_default().clone()
        };
        let _leader = gate.lock().await;

        if let Some(cached) = self.cache.get(&key).await {
            return Ok(Some(cached));
        }

        let fetched = tokio::time::timeout(self.timeout, self.source.fetch_rate(base, target, date))
            .await;

        let result = match fetched {
            Ok(Ok(rate)) => {
                if let Err(e) = self.store.insert(&rate).await {
                    warn!(%base, %target, %date, error = %e, "write-through of fetched rate failed");
                }
                let resolved = ResolvedRate {
                    rate: rate.rate,
                    approximated: rate.date != date,
                    date: rate.date,
                    source: rate.source,
                };
                self.cache.put(key.clone(), resolved.clone()).await;
                Some(resolved)
            }
            Ok(Err(e)) => {
                warn!(%base, %target, %date, error = %e, "external rate fetch failed");
                None
            }
            Err(_) => {
                warn!(%base, %target, %date, timeout = ?self.timeout, "external rate fetch timed out");
                None
            }
        };

        self.flights.lock().await.remove(&key);
        Ok(result)
    }
}

/// Consults the reversed pair through the store and external steps and
/// returns the reciprocal, rounded to the resolver precision.
struct InversePair {
    inner: Vec<Arc<dyn ResolveStep>>,
}

#[async_trait]
impl ResolveStep for InversePair {
    fn name(&self) -> &'static str {
        "inverse-pair"
    }

    async fn lookup(
        &self,
        base: &Currency,
        target: &Currency,
        date: NaiveDate,
    ) -> Result<Option<ResolvedRate>, RateError> {
        for step in &self.inner {
            if let Some(found) = step.lookup(target, base, date).await? {
                let Some(rate) = Decimal::ONE
                    .checked_div(found.rate)
                    .and_then(|r| r.round_sf(RATE_SIGNIFICANT_DIGITS))
                else {
                    warn!(%base, %target, rate = %found.rate, "reverse rate cannot be inverted");
                    return Ok(None);
                };
                debug!(%base, %target, %date, via = step.name(), "resolved through inverse pair");
                return Ok(Some(ResolvedRate {
                    rate,
                    date: found.date,
                    source: format!("inverse:{}", found.source),
                    approximated: found.approximated,
                }));
            }
        }
        Ok(None)
    }
}

pub struct RateResolver {
    cache: Arc<RateCache>,
    steps: Vec<Arc<dyn ResolveStep>>,
    store: Arc<dyn RateStore>,
}

impl RateResolver {
    pub fn new(
        store: Arc<dyn RateStore>,
        source: Arc<dyn RateSource>,
        config: ResolverConfig,
    ) -> Self {
        let cache = Arc::new(RateCache::new(config.cache_ttl));
        let exact: Arc<dyn ResolveStep> = Arc::new(StoreExact {
            store: Arc::clone(&store),
        });
        let prior: Arc<dyn ResolveStep> = Arc::new(NearestPrior {
            store: Arc::clone(&store),
            lookback_days: config.lookback_days,
        });
        let external: Arc<dyn ResolveStep> = Arc::new(ExternalFetch {
            source,
            store: Arc::clone(&store),
            cache: Arc::clone(&cache),
            flights: Mutex::new(HashMap::new()),
            timeout: config.fetch_timeout,
        });
        let inverse: Arc<dyn ResolveStep> = Arc::new(InversePair {
            inner: vec![
                Arc::clone(&exact),
                Arc::clone(&prior),
                Arc::clone(&external),
            ],
        });

        RateResolver {
            cache,
            steps: vec![exact, prior, external, inverse],
            store,
        }
    }

    pub async fn resolve(
        &self,
        base: &Currency,
        target: &Currency,
        date: NaiveDate,
    ) -> Result<ResolvedRate, RateError> {
        if base == target {
            return Ok(ResolvedRate::identity(date));
        }

        let key = RateKey {
            base: base.clone(),
            target: target.clone(),
            date,
        };
        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached);
        }

        for step in &self.steps {
            if let Some(found) = step.lookup(base, target, date).await? {
                debug!(%base, %target, %date, step = step.name(), rate = %found.rate, "rate resolved");
                self.cache.put(key, found.clone()).await;
                return Ok(found);
            }
        }

        Err(RateError::Unavailable {
            base: base.clone(),
            target: target.clone(),
            date,
        })
    }

    /// Persisted rate rows for a pair, one winning row per date.
    pub async fn historical_rates(
        &self,
        base: &Currency,
        target: &Currency,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ExchangeRate>, RateError> {
        self.store
            .find_range(base, target, start, end)
            .await
            .map_err(RateError::Storage)
    }
}
