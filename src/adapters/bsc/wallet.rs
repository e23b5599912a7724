use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{Address, Bytes};
use alloy::signers::local::PrivateKeySigner;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Invalid private key for wallet {index}: {reason}")]
    InvalidKey { index: usize, reason: String },
    #[error("No private keys configured")]
    NoKeys,
    #[error("Failed to sign transaction: {0}")]
    SigningError(String),
}

/// Key holder for one trading wallet; signs legacy transactions
#[derive(Clone)]
pub struct WalletSigner {
    signer: PrivateKeySigner,
}

impl std::fmt::Debug for WalletSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletSigner")
            .field("address", &self.address())
            .finish()
    }
}

impl WalletSigner {
    /// Parse a hex private key, with or without `0x`
    pub fn from_hex(index: usize, key: &str) -> Result<Self, WalletError> {
        let clean = key.trim().trim_start_matches("0x");
        let signer = format!("0x{}", clean)
            .parse::<PrivateKeySigner>()
            .map_err(|e| WalletError::InvalidKey {
                index,
                reason: e.to_string(),
            })?;
        Ok(Self { signer })
    }

    /// Parse a comma separated key list as found in `PRIVATE_KEYS`
    pub fn from_key_list(keys: &str) -> Result<Vec<Self>, WalletError> {
        let signers = keys
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .enumerate()
            .map(|(i, k)| Self::from_hex(i, k))
            .collect::<Result<Vec<_>, _>>()?;

        if signers.is_empty() {
            return Err(WalletError::NoKeys);
        }
        Ok(signers)
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Sign and return the EIP-2718 encoded transaction ready for broadcast
    pub fn sign_legacy(&self, mut tx: TxLegacy) -> Result<Bytes, WalletError> {
        let sig = TxSignerSync::sign_transaction_sync(&self.signer, &mut tx)
            .map_err(|e| WalletError::SigningError(e.to_string()))?;
        let signed: TxEnvelope = tx.into_signed(sig).into();
        Ok(Bytes::from(signed.encoded_2718()))
    }
}
