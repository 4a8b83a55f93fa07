//! Minimal Solidity ABI codec for the settlement contract's fixed interface.
//!
//! Only the types the interface uses are supported: `uint256` (limited to
//! values that fit `u128`), `uint8`, `bool`, `address`, `string` and
//! `string[]`. Dynamic values use the standard head/tail layout with offsets
//! relative to the start of the enclosing tuple.

use sidebet_types::{Address, Result, SidebetError};

pub const WORD: usize = 32;

/// Four-byte function selectors (first bytes of keccak-256 of the signature).
pub mod selectors {
    /// `joinBet(uint256,uint256)`
    pub const JOIN_BET: [u8; 4] = [0x59, 0xb0, 0xa8, 0xed];
    /// `resolveBet(uint256)`
    pub const RESOLVE_BET: [u8; 4] = [0x4c, 0x36, 0xc3, 0x6e];
    /// `claimWinnings()`
    pub const CLAIM_WINNINGS: [u8; 4] = [0xb4, 0x01, 0xfa, 0xf1];
    /// `getBetDetails()`
    pub const GET_BET_DETAILS: [u8; 4] = [0x8a, 0x2f, 0xd0, 0x29];
    /// `getParticipation(address)`
    pub const GET_PARTICIPATION: [u8; 4] = [0xca, 0xd9, 0x25, 0xef];
    /// `approve(address,uint256)`
    pub const APPROVE: [u8; 4] = [0x09, 0x5e, 0xa7, 0xb3];
    /// `allowance(address,address)`
    pub const ALLOWANCE: [u8; 4] = [0xdd, 0x62, 0xed, 0x3e];
    /// `balanceOf(address)`
    pub const BALANCE_OF: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];
}

/// A value to encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Uint(u128),
    Address(Address),
    Bool(bool),
    String(String),
    StringArray(Vec<String>),
}

impl Token {
    fn is_dynamic(&self) -> bool {
        matches!(self, Self::String(_) | Self::StringArray(_))
    }
}

fn uint_word(v: u128) -> [u8; WORD] {
    let mut w = [0u8; WORD];
    w[16..].copy_from_slice(&v.to_be_bytes());
    w
}

fn usize_word(v: usize) -> [u8; WORD] {
    // usize always fits in u128 on supported targets.
    uint_word(v as u128)
}

fn address_word(a: &Address) -> [u8; WORD] {
    let mut w = [0u8; WORD];
    w[12..].copy_from_slice(a.as_bytes());
    w
}

fn encode_bytes(bytes: &[u8]) -> Vec<u8> {
    let padded = bytes.len().div_ceil(WORD) * WORD;
    let mut out = Vec::with_capacity(WORD + padded);
    out.extend_from_slice(&usize_word(bytes.len()));
    out.extend_from_slice(bytes);
    out.resize(WORD + padded, 0);
    out
}

fn encode_tail(token: &Token) -> Vec<u8> {
    match token {
        Token::String(s) => encode_bytes(s.as_bytes()),
        Token::StringArray(items) => {
            let mut out = usize_word(items.len()).to_vec();
            let heads_len = WORD * items.len();
            let mut tails = Vec::new();
            for item in items {
                out.extend_from_slice(&usize_word(heads_len + tails.len()));
                tails.extend(encode_bytes(item.as_bytes()));
            }
            out.extend(tails);
            out
        }
        Token::Uint(_) | Token::Address(_) | Token::Bool(_) => Vec::new(),
    }
}

/// Encode `tokens` as an ABI tuple.
#[must_use]
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let head_len = WORD * tokens.len();
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();
    for token in tokens {
        if token.is_dynamic() {
            head.extend_from_slice(&usize_word(head_len + tail.len()));
            tail.extend(encode_tail(token));
        } else {
            let word = match token {
                Token::Uint(v) => uint_word(*v),
                Token::Bool(b) => uint_word(u128::from(*b)),
                Token::Address(a) => address_word(a),
                Token::String(_) | Token::StringArray(_) => unreachable!("dynamic"),
            };
            head.extend_from_slice(&word);
        }
    }
    head.extend(tail);
    head
}

/// Selector followed by the encoded arguments.
#[must_use]
pub fn encode_call(selector: [u8; 4], args: &[Token]) -> Vec<u8> {
    let mut out = selector.to_vec();
    out.extend(encode(args));
    out
}

/// Reads values out of an ABI-encoded tuple.
pub struct Decoder<'a> {
    data: &'a [u8],
}

impl<'a> Decoder<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn word_at(&self, at: usize) -> Result<&'a [u8]> {
        at.checked_add(WORD)
            .and_then(|end| self.data.get(at..end))
            .ok_or_else(|| {
                SidebetError::AbiDecode(format!(
                    "word at byte {at} is past the end of {} bytes",
                    self.data.len()
                ))
            })
    }

    fn uint_at(&self, at: usize) -> Result<u128> {
        let w = self.word_at(at)?;
        if w[..16].iter().any(|b| *b != 0) {
            return Err(SidebetError::AbiDecode(format!(
                "uint at byte {at} does not fit in 128 bits"
            )));
        }
        let mut low = [0u8; 16];
        low.copy_from_slice(&w[16..]);
        Ok(u128::from_be_bytes(low))
    }

    fn usize_at(&self, at: usize) -> Result<usize> {
        let v = self.uint_at(at)?;
        usize::try_from(v).map_err(|_| SidebetError::AbiDecode(format!("length {v} too large")))
    }

    fn string_at(&self, at: usize) -> Result<String> {
        let len = self.usize_at(at)?;
        let start = at
            .checked_add(WORD)
            .ok_or_else(|| SidebetError::AbiDecode(format!("string offset {at} overflows")))?;
        let bytes = start
            .checked_add(len)
            .and_then(|end| self.data.get(start..end))
            .ok_or_else(|| SidebetError::AbiDecode(format!("string of {len} bytes truncated")))?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| SidebetError::AbiDecode(format!("string is not utf-8: {e}")))
    }

    fn string_array_at(&self, at: usize) -> Result<Vec<String>> {
        let overflow = || SidebetError::AbiDecode(format!("array at byte {at} overflows"));
        let count = self.usize_at(at)?;
        let base = at.checked_add(WORD).ok_or_else(overflow)?;
        if count.saturating_mul(WORD) > self.data.len().saturating_sub(base) {
            return Err(SidebetError::AbiDecode(format!(
                "array of {count} elements exceeds payload"
            )));
        }
        (0..count)
            .map(|i| {
                let head = i
                    .checked_mul(WORD)
                    .and_then(|rel| base.checked_add(rel))
                    .ok_or_else(overflow)?;
                let offset = self.usize_at(head)?;
                self.string_at(base.checked_add(offset).ok_or_else(overflow)?)
            })
            .collect()
    }

    /// `uint256` in head slot `slot`.
    pub fn uint(&self, slot: usize) -> Result<u128> {
        self.uint_at(slot * WORD)
    }

    /// `uint256` in head slot `slot`, narrowed to `u64`.
    pub fn uint_u64(&self, slot: usize) -> Result<u64> {
        let v = self.uint(slot)?;
        u64::try_from(v).map_err(|_| SidebetError::AbiDecode(format!("value {v} exceeds u64")))
    }

    pub fn bool(&self, slot: usize) -> Result<bool> {
        match self.uint(slot)? {
            0 => Ok(false),
            1 => Ok(true),
            v => Err(SidebetError::AbiDecode(format!("invalid bool {v}"))),
        }
    }

    pub fn address(&self, slot: usize) -> Result<Address> {
        let w = self.word_at(slot * WORD)?;
        if w[..12].iter().any(|b| *b != 0) {
            return Err(SidebetError::AbiDecode("dirty address padding".into()));
        }
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&w[12..]);
        Ok(Address(bytes))
    }

    /// `string` whose offset is stored in head slot `slot`.
    pub fn string(&self, slot: usize) -> Result<String> {
        let offset = self.usize_at(slot * WORD)?;
        self.string_at(offset)
    }

    /// `string[]` whose offset is stored in head slot `slot`.
    pub fn string_array(&self, slot: usize) -> Result<Vec<String>> {
        let offset = self.usize_at(slot * WORD)?;
        self.string_array_at(offset)
    }
}

/// Parse `0x`-prefixed hex payloads returned by the node.
pub fn decode_hex_payload(s: &str) -> Result<Vec<u8>> {
    let digits = s.trim().trim_start_matches("0x");
    hex::decode(digits).map_err(|e| SidebetError::AbiDecode(format!("bad hex payload: {e}")))
}
