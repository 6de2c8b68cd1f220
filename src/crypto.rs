//! Cryptographic primitives for the mining client
//!
//! Keccak hashing, recoverable secp256k1 signatures and address handling.
//! Signatures use the 65-byte `r || s || v` layout so the data server can
//! recover the signer address from the request alone.

use alloy_primitives::{keccak256, Address, B256};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;

use crate::error::{Error, Result};

/// Length of a recoverable signature on the wire
pub const SIGNATURE_LEN: usize = 65;

/// Parse a 64-hex-character private key (an optional `0x` prefix is accepted)
pub fn parse_private_key(raw: &str) -> Result<SigningKey> {
    let trimmed = raw.trim().trim_start_matches("0x");
    let bytes = hex::decode(trimmed).map_err(|e| Error::crypto(format!("invalid private key hex: {e}")))?;
    if bytes.len() != 32 {
        return Err(Error::crypto(format!(
            "expecting 32 byte private key, got {}",
            bytes.len()
        )));
    }
    SigningKey::from_slice(&bytes).map_err(|e| Error::crypto(format!("invalid private key: {e}")))
}

/// Parse a 40-hex-character public address (an optional `0x` prefix is accepted)
pub fn parse_address(raw: &str) -> Result<Address> {
    let trimmed = raw.trim().trim_start_matches("0x");
    let bytes = hex::decode(trimmed).map_err(|e| Error::crypto(format!("invalid address hex: {e}")))?;
    if bytes.len() != 20 {
        return Err(Error::crypto(format!(
            "expecting 40 hex character public address, got \"{raw}\""
        )));
    }
    Ok(Address::from_slice(&bytes))
}

/// Derive the public address from a signing key
pub fn address_of(key: &SigningKey) -> Address {
    address_of_verifying(key.verifying_key())
}

fn address_of_verifying(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    // Skip the 0x04 SEC1 tag, hash the 64-byte public key, keep the low 20 bytes.
    let digest = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&digest[12..])
}

/// Render an address as `0x` + 40 lowercase hex characters
///
/// This is the canonical form used in KV key prefixes and whitelist
/// comparisons; the EIP-55 mixed-case form is never used internally.
pub fn address_hex(addr: Address) -> String {
    format!("0x{}", hex::encode(addr.as_slice()))
}

/// Sign a 32-byte digest, producing a recoverable `r || s || v` signature
pub fn sign_digest(key: &SigningKey, digest: B256) -> Result<[u8; SIGNATURE_LEN]> {
    let (sig, recid) = key
        .sign_prehash_recoverable(digest.as_slice())
        .map_err(|e| Error::crypto(format!("signing failed: {e}")))?;
    let mut out = [0u8; SIGNATURE_LEN];
    out[..64].copy_from_slice(sig.to_bytes().as_slice());
    out[64] = recid.to_byte();
    Ok(out)
}

/// Recover the signer address from a digest and a recoverable signature
pub fn recover_address(digest: B256, sig: &[u8]) -> Result<Address> {
    if sig.len() != SIGNATURE_LEN {
        return Err(Error::crypto(format!(
            "expecting {SIGNATURE_LEN} byte signature, got {}",
            sig.len()
        )));
    }
    let signature =
        Signature::from_slice(&sig[..64]).map_err(|e| Error::crypto(format!("malformed signature: {e}")))?;
    // Accept both the raw recovery id and the legacy 27/28 encoding.
    let v = if sig[64] >= 27 { sig[64] - 27 } else { sig[64] };
    let recid =
        RecoveryId::from_byte(v).ok_or_else(|| Error::crypto(format!("invalid recovery id {}", sig[64])))?;
    let key = VerifyingKey::recover_from_prehash(digest.as_slice(), &signature, recid)
        .map_err(|e| Error::crypto(format!("signature recovery failed: {e}")))?;
    Ok(address_of_verifying(&key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> SigningKey {
        // secp256k1 private key 0x...01, a standard test vector.
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        SigningKey::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_address_derivation() {
        // keccak(pubkey(1))[12..] is a well-known constant.
        let addr = address_of(&test_key());
        assert_eq!(
            address_hex(addr),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }

    #[test]
    fn test_sign_and_recover_round_trip() {
        let key = test_key();
        let digest = keccak256(b"request payload");
        let sig = sign_digest(&key, digest).unwrap();
        let recovered = recover_address(digest, &sig).unwrap();
        assert_eq!(recovered, address_of(&key));
    }

    #[test]
    fn test_recover_rejects_wrong_digest() {
        let key = test_key();
        let sig = sign_digest(&key, keccak256(b"one")).unwrap();
        let recovered = recover_address(keccak256(b"two"), &sig).unwrap();
        // Recovery over the wrong digest yields some other address.
        assert_ne!(recovered, address_of(&key));
    }

    #[test]
    fn test_parse_address_forms() {
        let a = parse_address("0x7e5f4552091a69125d5dfcb7b8c2659029395bdf").unwrap();
        let b = parse_address("7e5f4552091a69125d5dfcb7b8c2659029395bdf").unwrap();
        assert_eq!(a, b);
        assert!(parse_address("0x1234").is_err());
    }

    #[test]
    fn test_parse_private_key_length() {
        assert!(parse_private_key("0x01").is_err());
        assert!(parse_private_key(&"00".repeat(32)).is_err()); // all-zero scalar is invalid
        let mut hexkey = "00".repeat(31);
        hexkey.push_str("01");
        assert!(parse_private_key(&hexkey).is_ok());
    }
}
