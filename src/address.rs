//! Base-58 addresses for pay-to-pubkey-hash outputs
//!
//! An address is base58check(version ‖ pubkey_hash), where the checksum is the
//! first four bytes of the double SHA-256 of version ‖ payload. The ledger only
//! ever stores the raw 20-byte hash; addresses exist for display and input.

use secp256k1::PublicKey;

use crate::constants::ADDRESS_VERSION;
use crate::error::{ConsensusError, Result};
use crate::script::{extract_pubkey_hash, hash160};
use crate::types::*;

const BASE58_ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

const CHECKSUM_LEN: usize = 4;

pub fn encode_base58(data: &[u8]) -> String {
    let zeros = data.iter().take_while(|&&b| b == 0).count();

    // Base-58 digits, least significant first
    let mut digits: Vec<u8> = Vec::with_capacity(data.len() * 138 / 100 + 1);
    for &byte in &data[zeros..] {
        let mut carry = u32::from(byte);
        for digit in digits.iter_mut() {
            carry += u32::from(*digit) << 8;
            *digit = (carry % 58) as u8;
            carry /= 58;
        }
        while carry > 0 {
            digits.push((carry % 58) as u8);
            carry /= 58;
        }
    }

    let mut encoded = String::with_capacity(zeros + digits.len());
    encoded.extend(std::iter::repeat('1').take(zeros));
    encoded.extend(digits.iter().rev().map(|&d| BASE58_ALPHABET[d as usize] as char));
    encoded
}

pub fn decode_base58(encoded: &str) -> Result<Vec<u8>> {
    let zeros = encoded.bytes().take_while(|&c| c == b'1').count();

    // Base-256 bytes, least significant first
    let mut bytes: Vec<u8> = Vec::with_capacity(encoded.len());
    for (position, c) in encoded.bytes().enumerate().skip(zeros) {
        let value = BASE58_ALPHABET
            .iter()
            .position(|&a| a == c)
            .ok_or_else(|| {
                ConsensusError::InvalidAddress(format!(
                    "invalid base58 character {:?} at {}",
                    c as char, position
                ))
            })?;
        let mut carry = value as u32;
        for byte in bytes.iter_mut() {
            carry += u32::from(*byte) * 58;
            *byte = (carry & 0xff) as u8;
            carry >>= 8;
        }
        while carry > 0 {
            bytes.push((carry & 0xff) as u8);
            carry >>= 8;
        }
    }

    let mut decoded = vec![0u8; zeros];
    decoded.extend(bytes.iter().rev());
    Ok(decoded)
}

fn checksum(data: &[u8]) -> [u8; CHECKSUM_LEN] {
    let hash = double_sha256(data);
    let mut check = [0u8; CHECKSUM_LEN];
    check.copy_from_slice(&hash[..CHECKSUM_LEN]);
    check
}

pub fn encode_base58_check(version: u8, payload: &[u8]) -> String {
    let mut data = Vec::with_capacity(1 + payload.len() + CHECKSUM_LEN);
    data.push(version);
    data.extend_from_slice(payload);
    let check = checksum(&data);
    data.extend_from_slice(&check);
    encode_base58(&data)
}

/// Decode and verify, returning (version, payload)
pub fn decode_base58_check(encoded: &str) -> Result<(u8, Vec<u8>)> {
    let data = decode_base58(encoded)?;
    if data.len() < 1 + CHECKSUM_LEN {
        return Err(ConsensusError::InvalidAddress(format!(
            "{} bytes is too short for base58check",
            data.len()
        )));
    }

    let (body, check) = data.split_at(data.len() - CHECKSUM_LEN);
    if checksum(body).as_slice() != check {
        return Err(ConsensusError::InvalidAddress("checksum mismatch".to_string()));
    }
    Ok((body[0], body[1..].to_vec()))
}

/// hash160 of the compressed public key
pub fn pubkey_hash(pubkey: &PublicKey) -> PubKeyHash {
    hash160(&pubkey.serialize())
}

pub fn address_from_pubkey_hash(pubkey_hash: &PubKeyHash) -> String {
    encode_base58_check(ADDRESS_VERSION, pubkey_hash)
}

pub fn pubkey_hash_from_address(address: &str) -> Result<PubKeyHash> {
    let (version, payload) = decode_base58_check(address)?;
    if version != ADDRESS_VERSION {
        return Err(ConsensusError::InvalidAddress(format!(
            "unexpected version byte {:#04x}",
            version
        )));
    }
    payload.as_slice().try_into().map_err(|_| {
        ConsensusError::InvalidAddress(format!("payload is {} bytes, expected 20", payload.len()))
    })
}

/// Address for a pay-to-pubkey-hash output script
pub fn address_from_script(script_pubkey: &[u8]) -> Option<String> {
    extract_pubkey_hash(script_pubkey).map(|hash| address_from_pubkey_hash(&hash))
}
