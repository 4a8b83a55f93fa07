//! Local key custody and transaction signing.
//!
//! Addresses created through [`LocalKeys`] are backed by secp256k1 keys
//! held in process. Transactions from them are signed here as EIP-155
//! legacy transactions and submitted raw; senders without a local key go
//! through the signer endpoint instead.

use std::collections::HashMap;

use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use parking_lot::RwLock;
use rand::rngs::OsRng;
use sha3::{Digest, Keccak256};
use sidebet_types::{Address, Result, SidebetError, TxHash};

use crate::call::TxRequest;

#[must_use]
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// Ledger address of a key: the last 20 bytes of the keccak-256 of the
/// uncompressed public point, tag byte excluded.
#[must_use]
pub fn address_of(key: &SigningKey) -> Address {
    let point = key.verifying_key().as_affine().to_encoded_point(false);
    let digest = keccak256(&point.as_bytes()[1..]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest[12..]);
    Address::from_bytes(out)
}

/// Recursive-length-prefix encoding, just enough for legacy transactions.
mod rlp {
    pub(super) fn trimmed(be: &[u8]) -> &[u8] {
        let start = be.iter().position(|b| *b != 0).unwrap_or(be.len());
        &be[start..]
    }

    fn header(len: usize, offset: u8) -> Vec<u8> {
        match u8::try_from(len) {
            Ok(n) if n <= 55 => vec![offset + n],
            _ => {
                let be = len.to_be_bytes();
                let be = trimmed(&be);
                let width = u8::try_from(be.len()).unwrap_or(8);
                let mut out = Vec::with_capacity(1 + be.len());
                out.push(offset + 55 + width);
                out.extend_from_slice(be);
                out
            }
        }
    }

    pub(super) fn bytes(data: &[u8]) -> Vec<u8> {
        if let [b] = data {
            if *b < 0x80 {
                return vec![*b];
            }
        }
        let mut out = header(data.len(), 0x80);
        out.extend_from_slice(data);
        out
    }

    pub(super) fn uint(v: u128) -> Vec<u8> {
        bytes(trimmed(&v.to_be_bytes()))
    }

    pub(super) fn list(items: &[Vec<u8>]) -> Vec<u8> {
        let payload = items.concat();
        let mut out = header(payload.len(), 0xc0);
        out.extend(payload);
        out
    }
}

/// A signed transaction, ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTx {
    pub raw: Vec<u8>,
    /// Known before submission, so a lost send response can still be polled.
    pub hash: TxHash,
}

struct Legacy<'a> {
    nonce: u64,
    gas_price: u128,
    gas_limit: u64,
    to: Option<Address>,
    value: u128,
    data: &'a [u8],
}

impl Legacy<'_> {
    fn fields(&self) -> Vec<Vec<u8>> {
        vec![
            rlp::uint(u128::from(self.nonce)),
            rlp::uint(self.gas_price),
            rlp::uint(u128::from(self.gas_limit)),
            rlp::bytes(self.to.as_ref().map_or(&[][..], |a| &a.as_bytes()[..])),
            rlp::uint(self.value),
            rlp::bytes(self.data),
        ]
    }

    fn signing_payload(&self, chain_id: u64) -> Vec<u8> {
        let mut fields = self.fields();
        fields.extend([rlp::uint(u128::from(chain_id)), rlp::uint(0), rlp::uint(0)]);
        rlp::list(&fields)
    }

    fn sign(&self, key: &SigningKey, chain_id: u64) -> Result<SignedTx> {
        let digest = keccak256(&self.signing_payload(chain_id));
        let (signature, recovery) = key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| SidebetError::Internal(format!("transaction signing failed: {e}")))?;
        let v = u128::from(recovery.to_byte()) + u128::from(chain_id) * 2 + 35;
        let (r, s) = signature.split_bytes();

        let mut fields = self.fields();
        fields.extend([
            rlp::uint(v),
            rlp::bytes(rlp::trimmed(&r)),
            rlp::bytes(rlp::trimmed(&s)),
        ]);
        let raw = rlp::list(&fields);
        let hash = TxHash(keccak256(&raw));
        Ok(SignedTx { raw, hash })
    }
}

/// In-process keys, by address.
#[derive(Default)]
pub struct LocalKeys {
    keys: RwLock<HashMap<Address, SigningKey>>,
}

impl std::fmt::Debug for LocalKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKeys")
            .field("held", &self.keys.read().len())
            .finish_non_exhaustive()
    }
}

impl LocalKeys {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw a new key from the OS CSPRNG and return its address.
    pub fn generate(&self) -> Address {
        let key = SigningKey::random(&mut OsRng);
        let address = address_of(&key);
        self.keys.write().insert(address, key);
        address
    }

    /// Adopt a hex-encoded 32-byte secret.
    pub fn import(&self, secret: &str) -> Result<Address> {
        let bytes = hex::decode(secret.trim().trim_start_matches("0x"))
            .map_err(|e| SidebetError::Configuration(format!("key is not hex: {e}")))?;
        let key = SigningKey::from_slice(&bytes)
            .map_err(|e| SidebetError::Configuration(format!("invalid secp256k1 key: {e}")))?;
        let address = address_of(&key);
        self.keys.write().insert(address, key);
        Ok(address)
    }

    /// Hex-encoded secret behind `address`, for persisting the keystore.
    #[must_use]
    pub fn export(&self, address: &Address) -> Option<String> {
        self.keys
            .read()
            .get(address)
            .map(|key| hex::encode(key.to_bytes()))
    }

    #[must_use]
    pub fn holds(&self, address: &Address) -> bool {
        self.keys.read().contains_key(address)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sign `tx` carrying `data` for `chain_id`, if its sender is held here.
    pub fn sign(&self, tx: &TxRequest, data: &[u8], chain_id: u64) -> Result<Option<SignedTx>> {
        let keys = self.keys.read();
        let Some(key) = keys.get(&tx.from) else {
            return Ok(None);
        };
        Legacy {
            nonce: tx.nonce,
            gas_price: tx.gas_price,
            gas_limit: tx.gas_limit,
            to: tx.to,
            value: 0,
            data,
        }
        .sign(key, chain_id)
        .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

    use super::*;
    use crate::call::ContractCall;

    #[test]
    fn address_from_known_key() {
        let keys = LocalKeys::new();
        let address = keys
            .import("0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318")
            .unwrap();
        assert_eq!(
            address,
            "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23".parse().unwrap()
        );
        assert!(keys.holds(&address));
    }

    #[test]
    fn generated_keys_round_trip() {
        let keys = LocalKeys::new();
        let a = keys.generate();
        let b = keys.generate();
        assert_ne!(a, b);
        assert!(!a.is_zero());
        assert_eq!(keys.len(), 2);

        let secret = keys.export(&a).unwrap();
        assert_eq!(secret.len(), 64);
        assert_eq!(LocalKeys::new().import(&secret).unwrap(), a);
        assert!(keys.export(&Address::from_low_u8(1)).is_none());
    }

    #[test]
    fn rejects_malformed_secrets() {
        let keys = LocalKeys::new();
        assert!(keys.import("not hex").is_err());
        assert!(keys.import("0x00").is_err());
        assert!(keys.import(&"00".repeat(32)).is_err(), "zero is not a valid scalar");
        assert!(keys.is_empty());
    }

    #[test]
    fn rlp_primitives() {
        assert_eq!(rlp::uint(0), vec![0x80]);
        assert_eq!(rlp::uint(0x7f), vec![0x7f]);
        assert_eq!(rlp::uint(0x80), vec![0x81, 0x80]);
        assert_eq!(rlp::uint(1024), vec![0x82, 0x04, 0x00]);
        assert_eq!(rlp::bytes(b"dog"), vec![0x83, b'd', b'o', b'g']);
        assert_eq!(rlp::list(&[]), vec![0xc0]);

        let long = vec![0xaa; 56];
        let encoded = rlp::bytes(&long);
        assert_eq!(&encoded[..2], &[0xb8, 56]);
        assert_eq!(encoded.len(), 58);
    }

    fn eip155_example(data: &[u8]) -> Legacy<'_> {
        Legacy {
            nonce: 9,
            gas_price: 20_000_000_000,
            gas_limit: 21_000,
            to: Some(Address([0x35; 20])),
            value: 1_000_000_000_000_000_000,
            data,
        }
    }

    #[test]
    fn eip155_signing_payload() {
        let tx = eip155_example(&[]);
        assert_eq!(
            hex::encode(tx.signing_payload(1)),
            "ec098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a764000080018080"
        );
        assert_eq!(
            hex::encode(keccak256(&tx.signing_payload(1))),
            "daf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
        );
    }

    #[test]
    fn signature_recovers_the_sender() {
        let keys = LocalKeys::new();
        let sender = keys.import(&"46".repeat(32)).unwrap();
        let chain_id = 10143;
        let tx = TxRequest {
            from: sender,
            to: Some(Address::from_low_u8(0xbe)),
            call: ContractCall::ClaimWinnings,
            gas_limit: 200_000,
            gas_price: 60_000_000_000,
            nonce: 3,
        };
        let data = tx.call.calldata();
        let signed = keys.sign(&tx, &data, chain_id).unwrap().unwrap();
        assert_eq!(signed.hash, TxHash(keccak256(&signed.raw)));

        // v, r and s are the last three fields; r and s are 32 bytes here
        // unless they happen to start with zero bytes.
        let unsigned = Legacy {
            nonce: tx.nonce,
            gas_price: tx.gas_price,
            gas_limit: tx.gas_limit,
            to: tx.to,
            value: 0,
            data: &data,
        };
        let digest = keccak256(&unsigned.signing_payload(chain_id));
        let key = SigningKey::from_slice(&[0x46; 32]).unwrap();
        let (signature, recovery): (Signature, RecoveryId) =
            key.sign_prehash_recoverable(&digest).unwrap();
        let recovered = VerifyingKey::recover_from_prehash(&digest, &signature, recovery).unwrap();
        assert_eq!(recovered, *key.verifying_key());

        let (r, s) = signature.split_bytes();
        let tail = [rlp::bytes(rlp::trimmed(&r)), rlp::bytes(rlp::trimmed(&s))].concat();
        assert!(signed.raw.ends_with(&tail), "deterministic signature embedded");
        let v = u128::from(recovery.to_byte()) + u128::from(chain_id) * 2 + 35;
        let v = rlp::uint(v);
        assert_eq!(&signed.raw[signed.raw.len() - tail.len() - v.len()..signed.raw.len() - tail.len()], &v[..]);
    }

    #[test]
    fn foreign_senders_are_not_signed() {
        let keys = LocalKeys::new();
        let tx = TxRequest {
            from: Address::from_low_u8(1),
            to: None,
            call: ContractCall::ClaimWinnings,
            gas_limit: 1,
            gas_price: 1,
            nonce: 0,
        };
        assert!(keys.sign(&tx, &[], 1).unwrap().is_none());
    }
}
