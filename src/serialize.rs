//! Binary wire codec for transactions and blocks
//!
//! Fixed-width integers are little-endian. Counts and byte-string lengths use
//! a variable-length integer:
//! - `< 0xfd`: one byte
//! - `<= 0xffff`: `0xfd` followed by 2 bytes
//! - `<= 0xffff_ffff`: `0xfe` followed by 4 bytes
//!
//! There is no 8-byte form on the decode side. Decoders bound every read by the
//! remaining input, reject non-canonical varints, and reject any length that
//! claims more bytes than remain.

use nom::{
    IResult, Parser as _,
    bytes::complete::take,
    combinator::map,
    error::{Error, ErrorKind},
    multi::count,
    number::complete::{le_u16, le_u32, le_u64, u8 as decode_u8},
};

use crate::constants::MAX_SCRIPT_SIZE;
use crate::error::{ConsensusError, Result};
use crate::types::*;

/// Types with a canonical binary encoding
pub trait Encodable {
    fn encode(&self, out: &mut Vec<u8>);

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }
}

// ==============================================================================
// Encoders
// ==============================================================================

/// Append a variable-length integer
///
/// Values above `u32::MAX` are written with an `0xff` marker and 8 bytes, which
/// no decoder accepts.
pub fn write_varint(out: &mut Vec<u8>, value: usize) {
    let value = value as u64;
    if value < 0xfd {
        out.push(value as u8);
    } else if value <= 0xffff {
        out.push(0xfd);
        out.extend_from_slice(&(value as u16).to_le_bytes());
    } else if value <= 0xffff_ffff {
        out.push(0xfe);
        out.extend_from_slice(&(value as u32).to_le_bytes());
    } else {
        out.push(0xff);
        out.extend_from_slice(&value.to_le_bytes());
    }
}

fn write_var_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_varint(out, bytes.len());
    out.extend_from_slice(bytes);
}

impl Encodable for OutPoint {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.hash);
        out.extend_from_slice(&self.index.to_le_bytes());
    }
}

impl Encodable for TxInput {
    fn encode(&self, out: &mut Vec<u8>) {
        self.prevout.encode(out);
        write_var_bytes(out, &self.signature);
        write_var_bytes(out, &self.pubkey);
    }
}

impl Encodable for TxOutput {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.amount.to_le_bytes());
        write_var_bytes(out, &self.script_pubkey);
    }
}

impl Encodable for Transaction {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.version().to_le_bytes());
        write_varint(out, self.inputs().len());
        for input in self.inputs() {
            input.encode(out);
        }
        write_varint(out, self.outputs().len());
        for output in self.outputs() {
            output.encode(out);
        }
        out.extend_from_slice(&self.lock_time().to_le_bytes());
    }
}

/// Full header encoding, carrying the 64-bit timestamp
impl Encodable for BlockHeader {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.prev_block_hash);
        out.extend_from_slice(&self.merkle_root);
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.bits.to_le_bytes());
        out.extend_from_slice(&self.nonce.to_le_bytes());
    }
}

impl Encodable for Block {
    fn encode(&self, out: &mut Vec<u8>) {
        self.header.encode(out);
        write_varint(out, self.transactions.len());
        for tx in &self.transactions {
            tx.encode(out);
        }
    }
}

pub fn serialize_transaction(tx: &Transaction) -> Vec<u8> {
    tx.to_bytes()
}

pub fn serialize_block(block: &Block) -> Vec<u8> {
    block.to_bytes()
}

// ==============================================================================
// Top-Level Decoders
// ==============================================================================

/// Decode a transaction, rejecting truncated input and trailing bytes
pub fn deserialize_transaction(bytes: &[u8]) -> Result<Transaction> {
    finish(bytes, decode_transaction(bytes))
}

/// Decode a block, rejecting truncated input and trailing bytes
pub fn deserialize_block(bytes: &[u8]) -> Result<Block> {
    finish(bytes, decode_block(bytes))
}

fn finish<T>(full: &[u8], parsed: IResult<&[u8], T>) -> Result<T> {
    match parsed {
        Ok((rest, value)) if rest.is_empty() => Ok(value),
        Ok((rest, _)) => Err(ConsensusError::Serialization(format!(
            "{} trailing bytes after offset {}",
            rest.len(),
            full.len() - rest.len()
        ))),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(ConsensusError::Serialization(
            format!("{:?} at offset {}", e.code, full.len() - e.input.len()),
        )),
        Err(nom::Err::Incomplete(_)) => {
            Err(ConsensusError::Serialization("unexpected end of input".to_string()))
        }
    }
}

pub fn decode_block(input: &[u8]) -> IResult<&[u8], Block> {
    let (input, header) = decode_header(input)?;
    let (input, tx_count) = decode_count(input)?;
    let (input, transactions) = count(decode_transaction, tx_count).parse(input)?;
    Ok((input, Block { header, transactions }))
}

pub fn decode_transaction(input: &[u8]) -> IResult<&[u8], Transaction> {
    let (input, version) = decode_uint32(input)?;
    let (input, input_count) = decode_count(input)?;
    let (input, inputs) = count(decode_tx_input, input_count).parse(input)?;
    let (input, output_count) = decode_count(input)?;
    let (input, outputs) = count(decode_tx_output, output_count).parse(input)?;
    let (input, lock_time) = decode_uint32(input)?;
    Ok((input, Transaction::new(version, inputs, outputs, lock_time)))
}

// ==============================================================================
// Structure Decoders
// ==============================================================================

fn decode_header(input: &[u8]) -> IResult<&[u8], BlockHeader> {
    let (input, version) = decode_uint32(input)?;
    let (input, prev_block_hash) = decode_hash32(input)?;
    let (input, merkle_root) = decode_hash32(input)?;
    let (input, timestamp) = decode_uint64(input)?;
    let (input, bits) = decode_uint32(input)?;
    let (input, nonce) = decode_uint32(input)?;
    Ok((
        input,
        BlockHeader {
            version,
            prev_block_hash,
            merkle_root,
            timestamp,
            bits,
            nonce,
        },
    ))
}

fn decode_outpoint(input: &[u8]) -> IResult<&[u8], OutPoint> {
    let (input, hash) = decode_hash32(input)?;
    let (input, index) = decode_uint32(input)?;
    Ok((input, OutPoint { hash, index }))
}

fn decode_tx_input(input: &[u8]) -> IResult<&[u8], TxInput> {
    let (input, prevout) = decode_outpoint(input)?;
    let (input, signature) = decode_var_bytes(input)?;
    let (input, pubkey) = decode_var_bytes(input)?;
    Ok((input, TxInput { prevout, signature, pubkey }))
}

fn decode_tx_output(input: &[u8]) -> IResult<&[u8], TxOutput> {
    let (input, amount) = decode_uint64(input)?;
    let (input, script_pubkey) = decode_var_bytes(input)?;
    Ok((input, TxOutput { amount, script_pubkey }))
}

// ==============================================================================
// Primitive Decoders
// ==============================================================================

/// Canonical variable-length integer; the `0xff` form is rejected
pub fn decode_varint(input: &[u8]) -> IResult<&[u8], u64> {
    let (rest, marker) = decode_byte(input)?;
    match marker {
        0xfd => {
            let (rest, value) = le_u16(rest)?;
            if value < 0xfd {
                return Err(nom::Err::Error(Error::new(input, ErrorKind::Verify)));
            }
            Ok((rest, u64::from(value)))
        }
        0xfe => {
            let (rest, value) = decode_uint32(rest)?;
            if value <= 0xffff {
                return Err(nom::Err::Error(Error::new(input, ErrorKind::Verify)));
            }
            Ok((rest, u64::from(value)))
        }
        0xff => Err(nom::Err::Error(Error::new(input, ErrorKind::TooLarge))),
        small => Ok((rest, u64::from(small))),
    }
}

/// Element count; every element takes at least one byte, so a count larger
/// than the remaining input is rejected before anything is allocated
fn decode_count(input: &[u8]) -> IResult<&[u8], usize> {
    let (rest, value) = decode_varint(input)?;
    if value > rest.len() as u64 {
        return Err(nom::Err::Error(Error::new(input, ErrorKind::LengthValue)));
    }
    Ok((rest, value as usize))
}

fn decode_var_bytes(input: &[u8]) -> IResult<&[u8], Vec<u8>> {
    let (rest, len) = decode_count(input)?;
    if len > MAX_SCRIPT_SIZE {
        return Err(nom::Err::Error(Error::new(input, ErrorKind::TooLarge)));
    }
    map(take(len), |bytes: &[u8]| bytes.to_vec()).parse(rest)
}

fn decode_hash32(input: &[u8]) -> IResult<&[u8], Hash> {
    map(take(32usize), |bytes: &[u8]| {
        let mut hash = [0u8; 32];
        hash.copy_from_slice(bytes);
        hash
    })
    .parse(input)
}

fn decode_uint64(input: &[u8]) -> IResult<&[u8], u64> {
    le_u64(input)
}

fn decode_uint32(input: &[u8]) -> IResult<&[u8], u32> {
    le_u32(input)
}

fn decode_byte(input: &[u8]) -> IResult<&[u8], u8> {
    decode_u8(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block() -> Block {
        let coinbase = Transaction::new(
            1,
            vec![TxInput {
                prevout: OutPoint::null(),
                signature: b"height 1".to_vec(),
                pubkey: vec![],
            }],
            vec![TxOutput { amount: 25 * 100_000_000, script_pubkey: vec![0x76; 25] }],
            1,
        );
        let spend = Transaction::new(
            2,
            vec![TxInput {
                prevout: OutPoint::new([9u8; 32], 1),
                signature: vec![0x30; 300],
                pubkey: vec![0x02; 33],
            }],
            vec![
                TxOutput { amount: 1, script_pubkey: vec![] },
                TxOutput { amount: 2, script_pubkey: vec![0xac] },
            ],
            0,
        );
        Block {
            header: BlockHeader {
                version: 1,
                prev_block_hash: [3u8; 32],
                merkle_root: [4u8; 32],
                timestamp: 0x1_2345_6789,
                bits: 0x207fffff,
                nonce: 77,
            },
            transactions: vec![coinbase, spend],
        }
    }

    fn varint(value: usize) -> Vec<u8> {
        let mut out = Vec::new();
        write_varint(&mut out, value);
        out
    }

    #[test]
    fn test_varint_widths() {
        assert_eq!(varint(0xfc), vec![0xfc]);
        assert_eq!(varint(0xfd), vec![0xfd, 0xfd, 0x00]);
        assert_eq!(varint(0xffff), vec![0xfd, 0xff, 0xff]);
        assert_eq!(varint(0x10000), vec![0xfe, 0x00, 0x00, 0x01, 0x00]);
        assert_eq!(decode_varint(&varint(0x10000)).unwrap().1, 0x10000);
    }

    #[test]
    fn test_varint_non_canonical_rejected() {
        assert!(decode_varint(&[0xfd, 0x10, 0x00]).is_err());
        assert!(decode_varint(&[0xfe, 0xff, 0xff, 0x00, 0x00]).is_err());
        assert!(decode_varint(&[0xff, 1, 0, 0, 0, 0, 0, 0, 0]).is_err());
    }

    #[test]
    fn test_block_round_trip() {
        let block = sample_block();
        let bytes = serialize_block(&block);
        let decoded = deserialize_block(&bytes).unwrap();
        assert_eq!(decoded, block);
        assert_eq!(serialize_block(&decoded), bytes);
        assert_eq!(decoded.transactions[1].txid(), block.transactions[1].txid());
    }

    #[test]
    fn test_every_truncation_rejected() {
        let bytes = serialize_block(&sample_block());
        for len in 0..bytes.len() {
            assert!(deserialize_block(&bytes[..len]).is_err(), "prefix of {} bytes decoded", len);
        }
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = serialize_transaction(&sample_block().transactions[0]);
        bytes.push(0);
        assert!(matches!(
            deserialize_transaction(&bytes),
            Err(ConsensusError::Serialization(_))
        ));
    }

    #[test]
    fn test_length_beyond_remaining_rejected() {
        // version, one input, outpoint, then a signature length of 0xfd00
        let mut bytes = vec![1, 0, 0, 0, 1];
        bytes.extend_from_slice(&[0u8; 36]);
        bytes.extend_from_slice(&[0xfd, 0x00, 0xfd]);
        bytes.extend_from_slice(&[0u8; 16]);
        assert!(deserialize_transaction(&bytes).is_err());
    }

    #[test]
    fn test_oversized_script_rejected() {
        let tx = Transaction::new(
            1,
            vec![],
            vec![TxOutput { amount: 1, script_pubkey: vec![0u8; MAX_SCRIPT_SIZE + 1] }],
            0,
        );
        assert!(deserialize_transaction(&serialize_transaction(&tx)).is_err());
    }

    #[test]
    fn test_huge_count_rejected_without_allocation() {
        // version then an input count of 0xffff_ffff with nothing behind it
        let bytes = [1, 0, 0, 0, 0xfe, 0xff, 0xff, 0xff, 0xff];
        assert!(deserialize_transaction(&bytes).is_err());
    }
}
