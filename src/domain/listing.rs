//! Launchpad listing events
//!
//! The launchpad emits `LiquidityAdded(address,uint256,address,uint256)` with
//! every field non-indexed, so the payload is four ABI words in the log data.

use alloy::primitives::{Address, B256, U256};
use alloy::sol;
use alloy::sol_types::SolEvent;
use thiserror::Error;

sol! {
    #[derive(Debug)]
    event LiquidityAdded(address base, uint256 offers, address quote, uint256 funds);
}

const WORD: usize = 32;
const PAYLOAD_LEN: usize = 4 * WORD;

#[derive(Debug, Error, PartialEq)]
pub enum EventDecodeError {
    #[error("Invalid data length: {0} (expected at least {PAYLOAD_LEN})")]
    InvalidLength(usize),
}

/// A new pair listed on the launchpad.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEvent {
    /// Token being listed
    pub base: Address,
    /// Token amount provided as liquidity
    pub offers: U256,
    /// Currency it is paired against
    pub quote: Address,
    /// Quote amount provided as liquidity
    pub funds: U256,
}

impl ListingEvent {
    /// Topic0 of the listing event
    pub fn topic() -> B256 {
        LiquidityAdded::SIGNATURE_HASH
    }

    /// Decode the raw log data. Extra trailing bytes are ignored.
    pub fn decode(data: &[u8]) -> Result<Self, EventDecodeError> {
        if data.len() < PAYLOAD_LEN {
            return Err(EventDecodeError::InvalidLength(data.len()));
        }

        Ok(Self {
            base: Address::from_slice(&data[12..WORD]),
            offers: U256::from_be_slice(&data[WORD..2 * WORD]),
            quote: Address::from_slice(&data[3 * WORD - 20..3 * WORD]),
            funds: U256::from_be_slice(&data[3 * WORD..PAYLOAD_LEN]),
        })
    }

    /// ABI-encode the payload (the inverse of `decode`)
    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(PAYLOAD_LEN);
        data.extend_from_slice(B256::left_padding_from(self.base.as_slice()).as_slice());
        data.extend_from_slice(&self.offers.to_be_bytes::<32>());
        data.extend_from_slice(B256::left_padding_from(self.quote.as_slice()).as_slice());
        data.extend_from_slice(&self.funds.to_be_bytes::<32>());
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, keccak256};

    fn sample() -> ListingEvent {
        ListingEvent {
            base: address!("1111111111111111111111111111111111111111"),
            offers: U256::from(800_000_000u64),
            quote: address!("0000000000000000000000000000000000000000"),
            funds: U256::from(16_000_000_000_000_000_000u128),
        }
    }

    #[test]
    fn test_topic_matches_signature() {
        let expected = keccak256("LiquidityAdded(address,uint256,address,uint256)");
        assert_eq!(ListingEvent::topic(), expected);
    }

    #[test]
    fn test_decode_encoded_payload() {
        let event = sample();
        let decoded = ListingEvent::decode(&event.encode()).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_decode_short_data() {
        let result = ListingEvent::decode(&[0u8; 100]);
        assert_eq!(result, Err(EventDecodeError::InvalidLength(100)));
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let mut data = sample().encode();
        data.extend_from_slice(&[0xff; 32]);
        assert_eq!(ListingEvent::decode(&data).unwrap(), sample());
    }
}
