//! Contract bindings and well-known BSC addresses

use alloy::primitives::{address, Address, U256};
use alloy::sol;

/// PancakeSwap V2 router
pub const PANCAKE_ROUTER: Address = address!("10ED43C718714eb63d5aA57B78B54704E256024E");
pub const WBNB: Address = address!("bb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c");
/// Binance-Peg BSC-USD, the quote currency for take-profit valuation
pub const USDT: Address = address!("55d398326f99059fF775485246999027B3197955");
/// Launchpad token manager holding per-token template info
pub const TOKEN_MANAGER: Address = address!("5c952063c7fc8610FFDB798152D69F0B9550762b");

/// Creator type of fee-on-transfer tokens in the token manager template
pub const TAX_CREATOR_TYPE: u64 = 5;

const CREATOR_TYPE_SHIFT: usize = 10;
const CREATOR_TYPE_MASK: u64 = 0x3F;

/// Seconds a swap stays valid after it is signed
pub const SWAP_DEADLINE_SECS: i64 = 300;

sol! {
    interface IPancakeRouter {
        function getAmountsOut(uint256 amountIn, address[] calldata path)
            external
            view
            returns (uint256[] memory amounts);

        function swapExactETHForTokensSupportingFeeOnTransferTokens(
            uint256 amountOutMin,
            address[] calldata path,
            address to,
            uint256 deadline
        ) external payable;

        function swapExactTokensForETHSupportingFeeOnTransferTokens(
            uint256 amountIn,
            uint256 amountOutMin,
            address[] calldata path,
            address to,
            uint256 deadline
        ) external;
    }

    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
    }

    interface ITokenManager {
        function _tokenInfos(address token) external view returns (uint256 template);
    }
}

/// Extract the creator type (bits 10..16) from a token manager template word
pub fn creator_type(template: U256) -> u64 {
    (template >> CREATOR_TYPE_SHIFT).as_limbs()[0] & CREATOR_TYPE_MASK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creator_type_extraction() {
        let template = U256::from(5u64 << 10);
        assert_eq!(creator_type(template), TAX_CREATOR_TYPE);
    }

    #[test]
    fn test_creator_type_ignores_other_bits() {
        // low 10 bits and bits above 16 are noise
        let template = U256::from((0xABu64 << 16) | (3u64 << 10) | 0x3FF);
        assert_eq!(creator_type(template), 3);
    }

    #[test]
    fn test_creator_type_high_word() {
        let template = (U256::from(1u64) << 200) | U256::from(5u64 << 10);
        assert_eq!(creator_type(template), 5);
    }
}
