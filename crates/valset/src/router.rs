use futures::future::try_join_all;
use relay_types::{CrossChainAddress, OperatorVotingPower};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::client::{with_timeout, ClientError, EvmClient, ExternalVotingPowerClient};
use crate::{Result, ValsetError};

/// Default ceiling on simultaneously in-flight external provider calls.
pub const MAX_EXTERNAL_CONCURRENCY: usize = 10;

/// Voting power reported by one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderVotingPowers {
    pub provider: CrossChainAddress,
    pub operators: Vec<OperatorVotingPower>,
}

/// Sends each provider query to the EVM client or to the external client,
/// depending on the provider's chain id.
pub struct VotingPowerRouter {
    evm: Arc<dyn EvmClient>,
    external: Option<Arc<dyn ExternalVotingPowerClient>>,
    external_permits: Arc<Semaphore>,
    query_timeout: Option<Duration>,
}

impl VotingPowerRouter {
    pub fn new(evm: Arc<dyn EvmClient>) -> Self {
        Self {
            evm,
            external: None,
            external_permits: Arc::new(Semaphore::new(MAX_EXTERNAL_CONCURRENCY)),
            query_timeout: None,
        }
    }

    pub fn with_external(mut self, client: Arc<dyn ExternalVotingPowerClient>) -> Self {
        self.external = Some(client);
        self
    }

    pub fn with_max_external_concurrency(mut self, max_concurrent: usize) -> Self {
        self.external_permits = Arc::new(Semaphore::new(max_concurrent.max(1)));
        self
    }

    pub fn with_query_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Voting power of a single provider at `timestamp`.
    pub async fn get_voting_powers(
        &self,
        provider: &CrossChainAddress,
        timestamp: u64,
    ) -> Result<Vec<OperatorVotingPower>> {
        let provider_error = |source: ClientError| ValsetError::Provider {
            provider: *provider,
            source,
        };

        if !provider.is_external() {
            return with_timeout(
                self.query_timeout,
                self.evm.get_voting_powers(provider, timestamp),
            )
            .await
            .map_err(provider_error);
        }

        let external = self
            .external
            .as_ref()
            .ok_or(ValsetError::ExternalClientMissing {
                provider: *provider,
            })?;
        let _permit = self
            .external_permits
            .acquire()
            .await
            .map_err(|e| provider_error(Box::new(e) as ClientError))?;

        with_timeout(
            self.query_timeout,
            external.get_voting_powers(provider, timestamp),
        )
        .await
        .map_err(provider_error)
    }

    /// Queries every provider concurrently. The first failure drops the
    /// remaining queries and is returned; results keep the input order.
    pub async fn get_all_voting_powers(
        &self,
        providers: &[CrossChainAddress],
        timestamp: u64,
    ) -> Result<Vec<ProviderVotingPowers>> {
        if self.external.is_none() {
            if let Some(provider) = providers.iter().find(|p| p.is_external()) {
                return Err(ValsetError::ExternalClientMissing {
                    provider: *provider,
                });
            }
        }

        let queries = providers.iter().map(|provider| async move {
            let operators = self.get_voting_powers(provider, timestamp).await?;
            debug!(%provider, operators = operators.len(), "Fetched voting powers");
            Ok::<_, ValsetError>(ProviderVotingPowers {
                provider: *provider,
                operators,
            })
        });

        try_join_all(queries).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClientResult;
    use async_trait::async_trait;
    use relay_types::{
        Address, Epoch, NetworkConfig, OperatorWithKeys, VaultVotingPower,
        EXTERNAL_CHAIN_ID_THRESHOLD, U256,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn response(tag: u64) -> Vec<OperatorVotingPower> {
        vec![OperatorVotingPower {
            operator: Address::from_low_u64(tag),
            vaults: vec![VaultVotingPower {
                vault: Address::from_low_u64(tag + 1000),
                voting_power: U256::from(tag),
            }],
        }]
    }

    #[derive(Default)]
    struct Evm {
        calls: AtomicUsize,
        failing_chain: Option<u64>,
    }

    #[async_trait]
    impl EvmClient for Evm {
        async fn get_current_epoch(&self) -> ClientResult<Epoch> {
            Ok(0)
        }

        async fn get_epoch_start(&self, _epoch: Epoch) -> ClientResult<u64> {
            Ok(0)
        }

        async fn get_config(&self, _timestamp: u64, _epoch: Epoch) -> ClientResult<NetworkConfig> {
            Ok(NetworkConfig::default())
        }

        async fn get_voting_powers(
            &self,
            provider: &CrossChainAddress,
            _timestamp: u64,
        ) -> ClientResult<Vec<OperatorVotingPower>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing_chain == Some(provider.chain_id) {
                return Err("rpc unavailable".into());
            }
            Ok(response(provider.chain_id))
        }

        async fn get_keys(
            &self,
            _registry: &CrossChainAddress,
            _timestamp: u64,
        ) -> ClientResult<Vec<OperatorWithKeys>> {
            Ok(vec![])
        }
    }

    #[derive(Default)]
    struct External {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl ExternalVotingPowerClient for External {
        async fn get_voting_powers(
            &self,
            provider: &CrossChainAddress,
            _timestamp: u64,
        ) -> ClientResult<Vec<OperatorVotingPower>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(response(provider.chain_id - EXTERNAL_CHAIN_ID_THRESHOLD))
        }
    }

    fn evm_provider(chain_id: u64) -> CrossChainAddress {
        CrossChainAddress::new(chain_id, Address::from_low_u64(0xaa))
    }

    fn external_provider(offset: u64) -> CrossChainAddress {
        CrossChainAddress::new(EXTERNAL_CHAIN_ID_THRESHOLD + offset, Address::from_low_u64(0xbb))
    }

    #[tokio::test]
    async fn test_routes_by_chain_id() {
        let evm = Arc::new(Evm::default());
        let external = Arc::new(External::default());
        let router = VotingPowerRouter::new(evm.clone()).with_external(external.clone());

        let results = router
            .get_all_voting_powers(&[evm_provider(0), evm_provider(1), external_provider(7)], 10)
            .await
            .unwrap();

        assert_eq!(evm.calls.load(Ordering::SeqCst), 2);
        assert_eq!(results.len(), 3);
        assert_eq!(results[2].provider, external_provider(7));
        assert_eq!(results[2].operators, response(7));
    }

    #[tokio::test]
    async fn test_missing_external_client_fails_fast() {
        let evm = Arc::new(Evm::default());
        let router = VotingPowerRouter::new(evm.clone());

        let err = router
            .get_all_voting_powers(&[evm_provider(1), external_provider(1)], 10)
            .await
            .unwrap_err();

        assert!(matches!(err, ValsetError::ExternalClientMissing { provider } if provider == external_provider(1)));
        assert_eq!(evm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_provider_failure_names_provider() {
        let evm = Arc::new(Evm {
            failing_chain: Some(2),
            ..Default::default()
        });
        let router = VotingPowerRouter::new(evm);

        let err = router
            .get_all_voting_powers(&[evm_provider(1), evm_provider(2), evm_provider(3)], 10)
            .await
            .unwrap_err();

        match err {
            ValsetError::Provider { provider, source } => {
                assert_eq!(provider, evm_provider(2));
                assert_eq!(source.to_string(), "rpc unavailable");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_external_concurrency_is_bounded() {
        let external = Arc::new(External::default());
        let router = VotingPowerRouter::new(Arc::new(Evm::default()))
            .with_external(external.clone())
            .with_max_external_concurrency(3);

        let providers: Vec<_> = (0..20).map(external_provider).collect();
        let results = router.get_all_voting_powers(&providers, 10).await.unwrap();

        assert_eq!(results.len(), 20);
        let max = external.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 3, "max in flight was {max}");
        assert!(max >= 1);
    }
}
