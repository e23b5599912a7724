use alloy::primitives::{Address, Bytes};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use std::sync::Arc;

use super::contracts::{creator_type, ITokenManager, TAX_CREATOR_TYPE, TOKEN_MANAGER};
use crate::ports::chain::ChainClient;
use crate::ports::classifier::{ClassifierError, TokenClassifier};

/// Classifies launchpad tokens by the creator type in their template word
pub struct TokenManagerClassifier {
    client: Arc<dyn ChainClient>,
    manager: Address,
    tracked_type: u64,
}

impl TokenManagerClassifier {
    /// Tracks fee-on-transfer tokens of the launchpad token manager
    pub fn new(client: Arc<dyn ChainClient>) -> Self {
        Self::with_manager(client, TOKEN_MANAGER, TAX_CREATOR_TYPE)
    }

    pub fn with_manager(client: Arc<dyn ChainClient>, manager: Address, tracked_type: u64) -> Self {
        Self {
            client,
            manager,
            tracked_type,
        }
    }
}

#[async_trait]
impl TokenClassifier for TokenManagerClassifier {
    async fn is_tracked(&self, token: Address) -> Result<bool, ClassifierError> {
        let call = ITokenManager::_tokenInfosCall { token };
        let out = self
            .client
            .call_read_only(self.manager, Bytes::from(call.abi_encode()))
            .await?;

        let template = ITokenManager::_tokenInfosCall::abi_decode_returns(&out)
            .map_err(|e| ClassifierError::DecodeError(e.to_string()))?;

        let kind = creator_type(template);
        tracing::debug!("Token {} creator type {}", token, kind);
        Ok(kind == self.tracked_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::mocks::MockChainClient;
    use alloy::primitives::{address, U256};
    use alloy::sol_types::SolValue;

    const TOKEN: Address = address!("00000000000000000000000000000000000000aa");

    fn client_with_template(template: U256) -> Arc<MockChainClient> {
        Arc::new(MockChainClient::new().with_read_response(
            TOKEN_MANAGER,
            ITokenManager::_tokenInfosCall::SELECTOR,
            template.abi_encode(),
        ))
    }

    #[tokio::test]
    async fn test_tax_token_is_tracked() {
        let classifier = TokenManagerClassifier::new(client_with_template(U256::from(5u64 << 10)));
        assert!(classifier.is_tracked(TOKEN).await.unwrap());
    }

    #[tokio::test]
    async fn test_other_creator_type_is_not_tracked() {
        let classifier = TokenManagerClassifier::new(client_with_template(U256::from(1u64 << 10)));
        assert!(!classifier.is_tracked(TOKEN).await.unwrap());
    }

    #[tokio::test]
    async fn test_call_failure_is_error() {
        let classifier = TokenManagerClassifier::new(Arc::new(MockChainClient::new()));
        assert!(matches!(
            classifier.is_tracked(TOKEN).await,
            Err(ClassifierError::ChainError(_))
        ));
    }

    #[tokio::test]
    async fn test_short_response_is_decode_error() {
        let client = Arc::new(MockChainClient::new().with_read_response(
            TOKEN_MANAGER,
            ITokenManager::_tokenInfosCall::SELECTOR,
            vec![0u8; 3],
        ));
        let classifier = TokenManagerClassifier::new(client);
        assert!(matches!(
            classifier.is_tracked(TOKEN).await,
            Err(ClassifierError::DecodeError(_))
        ));
    }
}
