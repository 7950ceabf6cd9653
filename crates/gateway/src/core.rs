//! Shared gateway state.
//!
//! One `Core` is built at startup and handed to every tool invocation.
//! Tests construct an alternative `Core` over an in-memory transport.

use std::sync::Arc;

use spg_catalog::CatalogStore;
use spg_client::{CredentialProvider, Dispatcher, HttpTransport, RateLimiter, ReqwestTransport};
use spg_domain::config::GatewayConfig;
use spg_domain::error::{ErrorKind, Result};
use spg_domain::marketplace::Marketplace;

use crate::session::SessionGate;

pub struct Core {
    pub config: GatewayConfig,
    pub catalog: CatalogStore,
    pub sessions: SessionGate,
    pub dispatcher: Dispatcher,
    /// Raw transport, for the one unsigned call (feed document upload).
    pub transport: Arc<dyn HttpTransport>,
}

impl Core {
    /// Build the production core: reqwest transport, catalog at the
    /// configured path.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new()?);
        Self::with_transport(config, transport)
    }

    /// Build a core over any transport (tests inject an in-memory one).
    pub fn with_transport(config: GatewayConfig, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        let catalog = CatalogStore::open(&config.catalog.path)?;
        let credentials = Arc::new(CredentialProvider::new(
            config.credentials.clone(),
            transport.clone(),
        ));
        let limiter = Arc::new(RateLimiter::new(config.limits.clone()));
        let dispatcher = Dispatcher::new(
            transport.clone(),
            credentials,
            limiter,
            config.wait_for_rate_limit,
        );

        Ok(Self {
            config,
            catalog,
            sessions: SessionGate::new(),
            dispatcher,
            transport,
        })
    }

    /// Resolve the marketplace for a call from an optional caller-supplied
    /// id list; validation happens before any network traffic.
    pub fn marketplace(&self, requested: Option<&[String]>) -> Result<&'static Marketplace> {
        match requested.and_then(|ids| ids.first()) {
            Some(id) => Marketplace::by_id(id).ok_or_else(|| {
                ErrorKind::InvalidInput(format!("unknown marketplace id '{id}'"))
            }),
            None => Marketplace::by_country(&self.config.default_marketplace).ok_or_else(|| {
                ErrorKind::InvalidInput(format!(
                    "unknown default marketplace '{}'",
                    self.config.default_marketplace
                ))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marketplace_resolution_validates_ids() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = GatewayConfig::default();
        config.catalog.path = dir.path().join("catalog.json");
        let core = Core::with_transport(
            config,
            Arc::new(NoopTransport),
        )
        .unwrap();

        assert_eq!(core.marketplace(None).unwrap().country, "UK");
        let ids = vec!["ATVPDKIKX0DER".to_string()];
        assert_eq!(core.marketplace(Some(&ids)).unwrap().country, "US");
        let bad = vec!["NOPE".to_string()];
        assert!(core.marketplace(Some(&bad)).is_err());
    }

    struct NoopTransport;

    #[async_trait::async_trait]
    impl HttpTransport for NoopTransport {
        async fn send(
            &self,
            _request: spg_client::HttpRequest,
        ) -> Result<spg_client::HttpResponse> {
            Err(ErrorKind::NetworkError("no transport in tests".into()))
        }
    }
}
