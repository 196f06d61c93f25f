//! Router and factory ABI fragments
//!
//! Calldata encoding for the snipe swap and the pair-creation log signature.
//! The swap uses the fee-on-transfer-tolerant router entry point with
//! `min_amount_out = 0`: the engine optimizes for inclusion speed over price
//! protection and accepts whatever amount results.

use ethers::abi::Token;
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::{id, keccak256};
use once_cell::sync::Lazy;

/// `PairCreated(address indexed token0, address indexed token1, address pair, uint256)`
pub static PAIR_CREATED_TOPIC: Lazy<H256> =
    Lazy::new(|| H256::from(keccak256("PairCreated(address,address,address,uint256)")));

/// Signature of the fee-on-transfer-tolerant swap entry point.
const SWAP_SIGNATURE: &str =
    "swapExactETHForTokensSupportingFeeOnTransferTokens(uint256,address[],address,uint256)";

/// Encode the snipe swap call.
///
/// `path` is the two-hop route from the base asset to the target token. The
/// native value of the transaction carries the input amount.
pub fn encode_snipe_swap(
    min_amount_out: U256,
    path: &[Address],
    recipient: Address,
    deadline: U256,
) -> Bytes {
    let selector = id(SWAP_SIGNATURE);
    let args = ethers::abi::encode(&[
        Token::Uint(min_amount_out),
        Token::Array(path.iter().map(|a| Token::Address(*a)).collect()),
        Token::Address(recipient),
        Token::Uint(deadline),
    ]);
    Bytes::from([selector.as_slice(), args.as_slice()].concat())
}
