use std::net::IpAddr;

use async_trait::async_trait;
use nodewatch_domain::{DomainError, GeoRecord};

/// Pure function from IP to geographic record. A `None` result (provider has
/// nothing for this address) is not an error; only transport/provider
/// failures are `Err`.
#[async_trait]
pub trait GeoLocator: Send + Sync {
    async fn locate(&self, address: IpAddr) -> Result<Option<GeoRecord>, DomainError>;
}
