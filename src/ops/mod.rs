//! Operator commands: staking, transfers, balances, disputes
//!
//! Thin wrappers over the chain client used by the CLI. Read commands print
//! to stdout; write commands log the transaction hash.

use alloy_primitives::{Address, U256};
use tracing::info;

use crate::chain::Chain;
use crate::crypto::address_hex;
use crate::error::{Error, Result};

/// Decimal places of the oracle token
const TOKEN_DECIMALS: u32 = 18;

/// Parse a human token amount ("1", "2.5") into base units
pub fn parse_token_amount(raw: &str) -> Result<U256> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::config("empty token amount"));
    }
    let (int_part, frac_part) = match raw.split_once('.') {
        Some((i, f)) => (i, f),
        None => (raw, ""),
    };
    if frac_part.len() > TOKEN_DECIMALS as usize {
        return Err(Error::config(format!(
            "token amount \"{raw}\" has more than {TOKEN_DECIMALS} decimal places"
        )));
    }
    let int_value = if int_part.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(int_part, 10)
            .map_err(|e| Error::config(format!("invalid token amount \"{raw}\": {e}")))?
    };
    let mut frac = frac_part.to_string();
    while frac.len() < TOKEN_DECIMALS as usize {
        frac.push('0');
    }
    let frac_value = if frac_part.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(&frac, 10)
            .map_err(|e| Error::config(format!("invalid token amount \"{raw}\": {e}")))?
    };
    let scale = U256::from(10u64).pow(U256::from(TOKEN_DECIMALS));
    Ok(int_value * scale + frac_value)
}

/// Render base units as a human amount with trailing zeros trimmed
pub fn format_token_amount(value: U256) -> String {
    let scale = U256::from(10u64).pow(U256::from(TOKEN_DECIMALS));
    let int_part = value / scale;
    let frac_part = value % scale;
    if frac_part.is_zero() {
        return int_part.to_string();
    }
    let frac = format!("{frac_part:0>18}");
    let frac = frac.trim_end_matches('0');
    format!("{int_part}.{frac}")
}

/// Deposit the staking amount
pub async fn deposit(chain: &dyn Chain) -> Result<()> {
    let tx = chain.deposit_stake().await?;
    info!(%tx, "stake deposit sent");
    Ok(())
}

/// Withdraw a previously requested stake
pub async fn withdraw(chain: &dyn Chain) -> Result<()> {
    let tx = chain.withdraw_stake().await?;
    info!(%tx, "stake withdrawal sent");
    Ok(())
}

/// Begin the staking withdrawal waiting period
pub async fn request_withdraw(chain: &dyn Chain) -> Result<()> {
    let tx = chain.request_staking_withdraw().await?;
    info!(%tx, "staking withdrawal requested");
    Ok(())
}

/// Print the staking status of the miner address
pub async fn show_status(chain: &dyn Chain, address: Address) -> Result<()> {
    let info = chain.staker_info(address).await?;
    let meaning = match u64::try_from(info.status).unwrap_or(u64::MAX) {
        0 => "not staked",
        1 => "staked",
        2 => "withdrawal requested",
        3 => "in dispute",
        _ => "unknown",
    };
    println!(
        "address: {}\nstatus:  {} ({meaning})\nstaked:  {}",
        address_hex(address),
        info.status,
        info.staked_at
    );
    Ok(())
}

/// Transfer oracle tokens
pub async fn transfer(chain: &dyn Chain, to: Address, amount: U256) -> Result<()> {
    let tx = chain.transfer(to, amount).await?;
    info!(%tx, to = %address_hex(to), amount = %format_token_amount(amount), "transfer sent");
    Ok(())
}

/// Approve an oracle token allowance
pub async fn approve(chain: &dyn Chain, spender: Address, amount: U256) -> Result<()> {
    let tx = chain.approve(spender, amount).await?;
    info!(%tx, spender = %address_hex(spender), amount = %format_token_amount(amount), "approval sent");
    Ok(())
}

/// Print token and native balances of an address
pub async fn balance(chain: &dyn Chain, address: Address) -> Result<()> {
    let tokens = chain.balance_of(address).await?;
    let eth = chain.eth_balance(address).await?;
    println!(
        "address: {}\ntokens:  {}\neth:     {}",
        address_hex(address),
        format_token_amount(tokens),
        format_token_amount(eth)
    );
    Ok(())
}

/// Vote on an open dispute
pub async fn vote(chain: &dyn Chain, dispute_id: u64, supports: bool) -> Result<()> {
    let tx = chain.vote(dispute_id, supports).await?;
    info!(%tx, dispute_id, supports, "vote sent");
    Ok(())
}

/// Open a new dispute against a submitted value
pub async fn new_dispute(
    chain: &dyn Chain,
    request_id: u64,
    timestamp: u64,
    miner_index: u64,
) -> Result<()> {
    if miner_index >= crate::core::constants::SLOT_COUNT {
        return Err(Error::config(format!(
            "miner index {miner_index} out of range 0..{}",
            crate::core::constants::SLOT_COUNT - 1
        )));
    }
    let tx = chain.begin_dispute(request_id, timestamp, miner_index).await?;
    info!(%tx, request_id, timestamp, miner_index, "dispute opened");
    Ok(())
}

/// Print a summary of every dispute
pub async fn show_disputes(chain: &dyn Chain) -> Result<()> {
    let count = chain.dispute_count().await?;
    if count == 0 {
        println!("no disputes");
        return Ok(());
    }
    for id in 1..=count {
        let d = chain.dispute_info(id).await?;
        println!(
            "dispute {}: request {} at {} (slot {}), miner {}, votes {}, {}",
            d.id,
            d.request_id,
            d.timestamp,
            d.miner_slot,
            address_hex(d.reported_miner),
            d.votes,
            if d.executed {
                if d.passed {
                    "passed"
                } else {
                    "failed"
                }
            } else {
                "open"
            }
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units(n: u64) -> U256 {
        U256::from(n) * U256::from(10u64).pow(U256::from(18u64))
    }

    #[test]
    fn test_parse_token_amount() {
        assert_eq!(parse_token_amount("1").unwrap(), units(1));
        assert_eq!(
            parse_token_amount("2.5").unwrap(),
            units(2) + units(1) / U256::from(2u64)
        );
        assert_eq!(parse_token_amount("0.000000000000000001").unwrap(), U256::from(1u64));
        assert_eq!(parse_token_amount(".5").unwrap(), units(1) / U256::from(2u64));
    }

    #[test]
    fn test_parse_token_amount_rejects_bad_input() {
        assert!(parse_token_amount("").is_err());
        assert!(parse_token_amount("abc").is_err());
        assert!(parse_token_amount("1.0000000000000000001").is_err());
    }

    #[test]
    fn test_format_token_amount() {
        assert_eq!(format_token_amount(units(5)), "5");
        assert_eq!(format_token_amount(units(1) / U256::from(2u64)), "0.5");
        assert_eq!(format_token_amount(U256::from(1u64)), "0.000000000000000001");
    }

    #[test]
    fn test_amount_round_trip() {
        for raw in ["1", "2.5", "0.125", "1000"] {
            let parsed = parse_token_amount(raw).unwrap();
            assert_eq!(parse_token_amount(&format_token_amount(parsed)).unwrap(), parsed);
        }
    }
}
