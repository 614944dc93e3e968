//! The pay-to-pubkey-hash output template and input signatures
//!
//! Outputs lock coins to `OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG`.
//! There is no script interpreter: the template is matched byte for byte.
//! Signatures commit to the transaction id and are checked at the wallet and
//! submission boundary, not during block connection.

use ripemd::Ripemd160;
use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};

use crate::error::{ConsensusError, Result};
use crate::types::*;

pub const OP_DUP: u8 = 0x76;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_PUSH_20: u8 = 0x14;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_CHECKSIG: u8 = 0xac;

/// Length of a pay-to-pubkey-hash script
pub const P2PKH_SCRIPT_LEN: usize = 25;

/// RIPEMD160(SHA256(data))
pub fn hash160(data: &[u8]) -> PubKeyHash {
    let sha256_hash = Sha256::digest(data);
    let ripemd160_hash = Ripemd160::digest(sha256_hash);
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&ripemd160_hash);
    hash
}

pub fn pay_to_pubkey_hash(pubkey_hash: &PubKeyHash) -> ByteString {
    let mut script = Vec::with_capacity(P2PKH_SCRIPT_LEN);
    script.extend_from_slice(&[OP_DUP, OP_HASH160, OP_PUSH_20]);
    script.extend_from_slice(pubkey_hash);
    script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
    script
}

/// The 20-byte hash wrapped by a pay-to-pubkey-hash script, if `script` is one
pub fn extract_pubkey_hash(script: &[u8]) -> Option<PubKeyHash> {
    match script {
        [OP_DUP, OP_HASH160, OP_PUSH_20, hash @ .., OP_EQUALVERIFY, OP_CHECKSIG] if hash.len() == 20 => {
            let mut pubkey_hash = [0u8; 20];
            pubkey_hash.copy_from_slice(hash);
            Some(pubkey_hash)
        }
        _ => None,
    }
}

fn signing_message(tx: &Transaction) -> Result<Message> {
    Message::from_digest_slice(&tx.txid())
        .map_err(|e| ConsensusError::InvalidSignature(e.to_string()))
}

/// Sign input `index` of `tx` with `secret_key`
///
/// Writes a DER signature over the transaction id and the compressed public
/// key into the input. The id excludes both, so every input can be signed
/// independently.
pub fn sign_input(tx: &mut Transaction, index: usize, secret_key: &SecretKey) -> Result<()> {
    if index >= tx.inputs().len() {
        return Err(ConsensusError::TransactionValidation(format!(
            "No input at index {}",
            index
        )));
    }

    let secp = Secp256k1::signing_only();
    let message = signing_message(tx)?;
    let signature = secp.sign_ecdsa(&message, secret_key);
    let pubkey = PublicKey::from_secret_key(&secp, secret_key);

    let input = &mut tx.inputs_mut()[index];
    input.signature = signature.serialize_der().to_vec();
    input.pubkey = pubkey.serialize().to_vec();
    Ok(())
}

/// VerifyInput: 𝒯𝒳 × ℕ × 𝕊 → {true, false}
///
/// 1. The script must be pay-to-pubkey-hash
/// 2. hash160(input.pubkey) must equal the script's hash
/// 3. input.signature must be a valid ECDSA signature over txid(tx)
pub fn verify_input(tx: &Transaction, index: usize, script_pubkey: &[u8]) -> Result<bool> {
    let input = tx.inputs().get(index).ok_or_else(|| {
        ConsensusError::TransactionValidation(format!("No input at index {}", index))
    })?;

    let expected = match extract_pubkey_hash(script_pubkey) {
        Some(hash) => hash,
        None => return Ok(false),
    };
    if hash160(&input.pubkey) != expected {
        return Ok(false);
    }

    let pubkey = match PublicKey::from_slice(&input.pubkey) {
        Ok(pk) => pk,
        Err(_) => return Ok(false),
    };
    let signature = match Signature::from_der(&input.signature) {
        Ok(sig) => sig,
        Err(_) => return Ok(false),
    };

    let secp = Secp256k1::verification_only();
    Ok(secp.verify_ecdsa(&signing_message(tx)?, &signature, &pubkey).is_ok())
}
