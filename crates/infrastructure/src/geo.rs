use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use nodewatch_application::ports::GeoLocator;
use nodewatch_domain::{DomainError, GeoRecord};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

const DEFAULT_CACHE_CAPACITY: usize = 4096;

#[derive(Debug, Deserialize)]
struct ProviderResponse {
    country: Option<String>,
    city: Option<String>,
    asn: Option<u32>,
}

/// HTTP geolocation client against a configurable provider, with an
/// in-memory LRU cache keyed by address so repeated lookups of the same
/// hub's IP don't re-hit the provider every cycle.
pub struct HttpGeoLocator {
    client: reqwest::Client,
    provider_url: String,
    api_key: Option<String>,
    cache: Mutex<LruCache<IpAddr, Option<GeoRecord>>>,
}

impl HttpGeoLocator {
    pub fn new(provider_url: String, api_key: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            client,
            provider_url,
            api_key,
            cache: Mutex::new(LruCache::new(
                std::num::NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).unwrap(),
            )),
        }
    }
}

#[async_trait]
impl GeoLocator for HttpGeoLocator {
    async fn locate(&self, address: IpAddr) -> Result<Option<GeoRecord>, DomainError> {
        if let Some(cached) = self.cache.lock().await.get(&address) {
            return Ok(cached.clone());
        }

        let mut request = self.client.get(&self.provider_url).query(&[("ip", address.to_string())]);
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DomainError::Geo(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DomainError::Geo(format!(
                "provider returned status {}",
                response.status()
            )));
        }

        let body: ProviderResponse = response
            .json()
            .await
            .map_err(|e| DomainError::Geo(e.to_string()))?;

        let record = GeoRecord {
            country: body.country,
            city: body.city,
            asn: body.asn,
        };
        debug!(%address, country = ?record.country, "geolocation resolved");

        let record = Some(record);
        self.cache.lock().await.put(address, record.clone());
        Ok(record)
    }
}
