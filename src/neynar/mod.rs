// Neynar Module - REST client for managed signers, signed key requests and user profiles

pub mod client;
pub mod signed_key;
pub mod types;

pub use client::NeynarClient;
pub use signed_key::{AppSigner, SignedKeyRequest, SigningError};
pub use types::{NeynarSigner, NeynarUser, Sponsor};
