use chrono::{DateTime, Utc};
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use sha3::{Digest, Keccak256};
use std::fmt;
use thiserror::Error;

use crate::http::ProviderError;

/// Seconds a signed key request stays valid
pub const SIGNED_KEY_REQUEST_TTL_SECS: i64 = 24 * 60 * 60;

const DOMAIN_NAME: &str = "Farcaster SignedKeyRequestValidator";
const DOMAIN_VERSION: &str = "1";
const DOMAIN_CHAIN_ID: u64 = 10;
const VALIDATOR_ADDRESS: [u8; 20] = [
    0x00, 0x00, 0x00, 0x00, 0xfc, 0x70, 0x04, 0x72, 0x60, 0x6e, 0xd4, 0xfa, 0x22, 0x62, 0x3a, 0xcf,
    0x62, 0xc6, 0x05, 0x53,
];

const DOMAIN_TYPE: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";
const SIGNED_KEY_REQUEST_TYPE: &str =
    "SignedKeyRequest(uint256 requestFid,bytes key,uint256 deadline)";

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("Invalid app private key: {0}")]
    InvalidKey(String),

    #[error("Invalid signer public key: {0}")]
    InvalidPublicKey(String),

    #[error("Signing failed: {0}")]
    Signature(String),
}

impl From<SigningError> for ProviderError {
    fn from(err: SigningError) -> Self {
        ProviderError::Signing(err.to_string())
    }
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

fn uint256(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

fn decode_hex(value: &str) -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(value.trim().trim_start_matches("0x"))
}

/// Request to add `key` as a signer on behalf of the app `request_fid`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedKeyRequest {
    pub request_fid: u64,
    pub key: Vec<u8>,
    pub deadline: u64,
}

impl SignedKeyRequest {
    /// Build a request for a hex-encoded ed25519 signer public key
    pub fn new(request_fid: u64, public_key: &str, deadline: u64) -> Result<Self, SigningError> {
        let key = decode_hex(public_key).map_err(|e| SigningError::InvalidPublicKey(e.to_string()))?;
        if key.is_empty() {
            return Err(SigningError::InvalidPublicKey("empty key".to_string()));
        }
        Ok(Self {
            request_fid,
            key,
            deadline,
        })
    }

    pub fn deadline_from(now: DateTime<Utc>) -> u64 {
        (now.timestamp() + SIGNED_KEY_REQUEST_TTL_SECS).max(0) as u64
    }

    fn struct_hash(&self) -> [u8; 32] {
        let mut encoded = Vec::with_capacity(4 * 32);
        encoded.extend_from_slice(&keccak256(SIGNED_KEY_REQUEST_TYPE.as_bytes()));
        encoded.extend_from_slice(&uint256(self.request_fid));
        encoded.extend_from_slice(&keccak256(&self.key));
        encoded.extend_from_slice(&uint256(self.deadline));
        keccak256(&encoded)
    }

    /// EIP-712 digest the app key signs
    pub fn digest(&self) -> [u8; 32] {
        let mut encoded = Vec::with_capacity(2 + 64);
        encoded.extend_from_slice(&[0x19, 0x01]);
        encoded.extend_from_slice(&domain_separator());
        encoded.extend_from_slice(&self.struct_hash());
        keccak256(&encoded)
    }
}

pub fn domain_separator() -> [u8; 32] {
    let mut contract = [0u8; 32];
    contract[12..].copy_from_slice(&VALIDATOR_ADDRESS);

    let mut encoded = Vec::with_capacity(5 * 32);
    encoded.extend_from_slice(&keccak256(DOMAIN_TYPE.as_bytes()));
    encoded.extend_from_slice(&keccak256(DOMAIN_NAME.as_bytes()));
    encoded.extend_from_slice(&keccak256(DOMAIN_VERSION.as_bytes()));
    encoded.extend_from_slice(&uint256(DOMAIN_CHAIN_ID));
    encoded.extend_from_slice(&contract);
    keccak256(&encoded)
}

/// EIP-55 mixed-case form of a 20-byte address
pub fn checksum_address(address: &[u8; 20]) -> String {
    let lower = hex::encode(address);
    let hash = keccak256(lower.as_bytes());
    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = (hash[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// The app's custody key, used to sign key requests for new signers
pub struct AppSigner {
    key: SigningKey,
    address: [u8; 20],
}

impl AppSigner {
    pub fn from_hex(private_key: &str) -> Result<Self, SigningError> {
        let bytes = decode_hex(private_key).map_err(|e| SigningError::InvalidKey(e.to_string()))?;
        let key = SigningKey::from_slice(&bytes).map_err(|e| SigningError::InvalidKey(e.to_string()))?;

        let point = key.verifying_key().to_encoded_point(false);
        let hash = keccak256(&point.as_bytes()[1..]);
        let mut address = [0u8; 20];
        address.copy_from_slice(&hash[12..]);

        Ok(Self { key, address })
    }

    /// Checksummed custody address
    pub fn address(&self) -> String {
        checksum_address(&self.address)
    }

    fn sign_digest(&self, digest: &[u8; 32]) -> Result<String, SigningError> {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(digest)
            .map_err(|e| SigningError::Signature(e.to_string()))?;

        let mut bytes = Vec::with_capacity(65);
        bytes.extend_from_slice(&signature.to_bytes());
        bytes.push(27 + recovery_id.to_byte());
        Ok(format!("0x{}", hex::encode(bytes)))
    }

    /// 65-byte `r || s || v` signature over the request's EIP-712 digest
    pub fn sign_key_request(&self, request: &SignedKeyRequest) -> Result<String, SigningError> {
        self.sign_digest(&request.digest())
    }

    /// EIP-191 personal-message signature
    pub fn sign_message(&self, message: &[u8]) -> Result<String, SigningError> {
        let mut prefixed = format!("\x19Ethereum Signed Message:\n{}", message.len()).into_bytes();
        prefixed.extend_from_slice(message);
        self.sign_digest(&keccak256(&prefixed))
    }
}

impl fmt::Debug for AppSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppSigner")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}
