/// Account wallet credentials
///
/// The secret key is stored base58 encoded (Phantom / Solana CLI export format)
/// and is only turned into a `Keypair` at signing time.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use solana_sdk::signature::{Keypair, Signer};
use std::fmt;

use super::error::SniperError;

const INVALID_KEY_HINT: &str = "Invalid private key. Please enter your Phantom wallet private key. \
The private key format should be 4TYcXh*********LL5SqM.";

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct WalletCredentials {
    pub public_key: String,
    pub private_key: String,
}

impl fmt::Debug for WalletCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletCredentials")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

impl WalletCredentials {
    /// Validates a base58 secret key and derives the public key from it
    pub fn import(secret: &str) -> Result<Self, SniperError> {
        let keypair = decode_keypair(secret.trim())
            .map_err(|_| SniperError::Validation(INVALID_KEY_HINT.to_string()))?;

        Ok(Self {
            public_key: keypair.pubkey().to_string(),
            private_key: bs58::encode(keypair.to_bytes()).into_string(),
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.private_key.is_empty()
    }

    pub fn keypair(&self) -> Result<Keypair> {
        decode_keypair(&self.private_key).context("Failed to load wallet keypair")
    }
}

fn decode_keypair(secret: &str) -> Result<Keypair> {
    let bytes = bs58::decode(secret)
        .into_vec()
        .context("Secret key is not valid base58")?;
    if bytes.len() != 64 {
        anyhow::bail!("Secret key must be 64 bytes, got {}", bytes.len());
    }
    Keypair::from_bytes(&bytes).context("Failed to create keypair from secret key bytes")
}
