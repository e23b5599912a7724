//! PancakeSwap V2 trade execution for one wallet
//!
//! Builds router calls, signs them as legacy transactions and broadcasts
//! through a [`ChainClient`]. Nothing waits for receipts.

use alloy::consensus::TxLegacy;
use alloy::primitives::{Address, Bytes, TxKind, B256, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use super::contracts::{IPancakeRouter, IERC20, PANCAKE_ROUTER, SWAP_DEADLINE_SECS, USDT, WBNB};
use super::wallet::WalletSigner;
use crate::ports::chain::ChainClient;
use crate::ports::execution::{ExecutionError, TradeExecutor};

const GWEI: u128 = 1_000_000_000;

/// Gas and slippage settings shared by every wallet
#[derive(Debug, Clone, PartialEq)]
pub struct SwapSettings {
    pub gas_limit: u64,
    pub gas_price_gwei: u64,
    /// Tolerated output shortfall in whole percent
    pub slippage_percent: u8,
    /// Quote before each swap and set a minimum output; otherwise accept any output
    pub enforce_slippage: bool,
    /// Sign but never broadcast
    pub dry_run: bool,
}

impl Default for SwapSettings {
    fn default() -> Self {
        Self {
            gas_limit: 300_000,
            gas_price_gwei: 5,
            slippage_percent: 10,
            enforce_slippage: false,
            dry_run: false,
        }
    }
}

impl SwapSettings {
    fn gas_price_wei(&self) -> u128 {
        u128::from(self.gas_price_gwei) * GWEI
    }

    /// `quote * (100 - slippage) / 100`
    pub fn min_output(&self, quoted: U256) -> U256 {
        let keep = U256::from(100u8.saturating_sub(self.slippage_percent.min(100)));
        quoted.saturating_mul(keep) / U256::from(100u8)
    }
}

pub struct PancakeSwapper {
    client: Arc<dyn ChainClient>,
    signer: WalletSigner,
    settings: SwapSettings,
    chain_id: u64,
}

impl PancakeSwapper {
    pub fn new(
        client: Arc<dyn ChainClient>,
        signer: WalletSigner,
        settings: SwapSettings,
        chain_id: u64,
    ) -> Self {
        Self {
            client,
            signer,
            settings,
            chain_id,
        }
    }

    /// Build a swapper, asking the node for the chain id
    pub async fn connect(
        client: Arc<dyn ChainClient>,
        signer: WalletSigner,
        settings: SwapSettings,
    ) -> Result<Self, ExecutionError> {
        let chain_id = client.chain_id().await?;
        Ok(Self::new(client, signer, settings, chain_id))
    }

    fn deadline() -> U256 {
        let deadline = Utc::now().timestamp().saturating_add(SWAP_DEADLINE_SECS);
        U256::from(u64::try_from(deadline).unwrap_or_default())
    }

    async fn amounts_out(
        &self,
        amount_in: U256,
        path: Vec<Address>,
    ) -> Result<U256, ExecutionError> {
        let token = path.first().copied().unwrap_or_default();
        let call = IPancakeRouter::getAmountsOutCall {
            amountIn: amount_in,
            path,
        };
        let out = self
            .client
            .call_read_only(PANCAKE_ROUTER, Bytes::from(call.abi_encode()))
            .await?;

        let amounts = IPancakeRouter::getAmountsOutCall::abi_decode_returns(&out)
            .map_err(|e| ExecutionError::DecodeError(e.to_string()))?;

        amounts.last().copied().ok_or(ExecutionError::EmptyQuote(token))
    }

    async fn min_out(&self, amount_in: U256, path: &[Address]) -> Result<U256, ExecutionError> {
        if !self.settings.enforce_slippage {
            return Ok(U256::ZERO);
        }
        let quoted = self.amounts_out(amount_in, path.to_vec()).await?;
        Ok(self.settings.min_output(quoted))
    }

    async fn submit(
        &self,
        to: Address,
        value: U256,
        input: Vec<u8>,
    ) -> Result<B256, ExecutionError> {
        let wallet = self.signer.address();
        let nonce = self.client.pending_nonce(wallet).await?;

        let tx = TxLegacy {
            chain_id: Some(self.chain_id),
            nonce,
            gas_price: self.settings.gas_price_wei(),
            gas_limit: self.settings.gas_limit,
            to: TxKind::Call(to),
            value,
            input: Bytes::from(input),
        };

        let raw = self
            .signer
            .sign_legacy(tx)
            .map_err(|e| ExecutionError::SigningError(e.to_string()))?;

        if self.settings.dry_run {
            let hash = alloy::primitives::keccak256(&raw);
            tracing::info!(
                "[DRY RUN] {} -> {} signed, not broadcast ({})",
                wallet,
                to,
                hash
            );
            return Ok(hash);
        }

        Ok(self.client.send_raw_transaction(raw).await?)
    }
}

#[async_trait]
impl TradeExecutor for PancakeSwapper {
    fn wallet(&self) -> Address {
        self.signer.address()
    }

    async fn buy(&self, token: Address, native_amount: U256) -> Result<B256, ExecutionError> {
        if native_amount.is_zero() {
            return Err(ExecutionError::InvalidParameters("buy amount is zero".to_string()));
        }
        let path = vec![WBNB, token];
        let amount_out_min = self.min_out(native_amount, &path).await?;

        let call = IPancakeRouter::swapExactETHForTokensSupportingFeeOnTransferTokensCall {
            amountOutMin: amount_out_min,
            path,
            to: self.wallet(),
            deadline: Self::deadline(),
        };
        self.submit(PANCAKE_ROUTER, native_amount, call.abi_encode()).await
    }

    async fn sell(&self, token: Address, token_amount: U256) -> Result<B256, ExecutionError> {
        if token_amount.is_zero() {
            return Err(ExecutionError::InvalidParameters("sell amount is zero".to_string()));
        }
        let path = vec![token, WBNB];
        let amount_out_min = self.min_out(token_amount, &path).await?;

        let call = IPancakeRouter::swapExactTokensForETHSupportingFeeOnTransferTokensCall {
            amountIn: token_amount,
            amountOutMin: amount_out_min,
            path,
            to: self.wallet(),
            deadline: Self::deadline(),
        };
        self.submit(PANCAKE_ROUTER, U256::ZERO, call.abi_encode()).await
    }

    async fn approve(&self, token: Address, amount: U256) -> Result<B256, ExecutionError> {
        let call = IERC20::approveCall {
            spender: PANCAKE_ROUTER,
            amount,
        };
        self.submit(token, U256::ZERO, call.abi_encode()).await
    }

    async fn token_balance(&self, token: Address) -> Result<U256, ExecutionError> {
        let call = IERC20::balanceOfCall { owner: self.wallet() };
        let out = self
            .client
            .call_read_only(token, Bytes::from(call.abi_encode()))
            .await?;
        IERC20::balanceOfCall::abi_decode_returns(&out)
            .map_err(|e| ExecutionError::DecodeError(e.to_string()))
    }

    async fn value_in_native(&self, token: Address, amount: U256) -> Result<U256, ExecutionError> {
        self.amounts_out(amount, vec![token, WBNB]).await
    }

    async fn value_in_quote(&self, token: Address, amount: U256) -> Result<U256, ExecutionError> {
        self.amounts_out(amount, vec![token, WBNB, USDT]).await
    }
}
