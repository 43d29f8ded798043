/// Mint and Metaplex metadata lookup

use anyhow::{Context, Result};
use async_trait::async_trait;
use borsh::BorshDeserialize;
use solana_sdk::program_pack::Pack;
use solana_sdk::pubkey::Pubkey;
use spl_token::state::Mint;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use crate::core::TOKEN_METADATA_PROGRAM;
use crate::trading::ChainRpc;

#[derive(Debug, Clone, PartialEq)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub freeze_authority: bool,
    pub mint_authority: bool,
}

#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn metadata(&self, mint: &str) -> Result<TokenMetadata>;
}

/// Leading fields of a Metaplex metadata account; the rest is ignored
#[derive(BorshDeserialize)]
struct MetadataHeader {
    _key: u8,
    _update_authority: [u8; 32],
    _mint: [u8; 32],
    name: String,
    symbol: String,
}

pub struct TokenMetadataClient {
    rpc: Arc<dyn ChainRpc>,
}

impl TokenMetadataClient {
    pub fn new(rpc: Arc<dyn ChainRpc>) -> Self {
        Self { rpc }
    }
}

pub fn metadata_address(mint: &Pubkey) -> Result<Pubkey> {
    let program = Pubkey::from_str(TOKEN_METADATA_PROGRAM)?;
    let (address, _) = Pubkey::find_program_address(
        &[b"metadata", program.as_ref(), mint.as_ref()],
        &program,
    );
    Ok(address)
}

/// Names are stored NUL padded to a fixed width
fn clean(text: &str) -> String {
    text.trim_end_matches('\0').trim().to_string()
}

fn decode_header(data: &[u8]) -> Result<(String, String)> {
    let header = MetadataHeader::deserialize(&mut &data[..])
        .context("Failed to decode token metadata")?;
    Ok((clean(&header.name), clean(&header.symbol)))
}

#[async_trait]
impl MetadataSource for TokenMetadataClient {
    async fn metadata(&self, mint: &str) -> Result<TokenMetadata> {
        let mint_key = Pubkey::from_str(mint).with_context(|| format!("Invalid mint: {}", mint))?;

        let mint_data = self
            .rpc
            .get_account_data(mint)
            .await?
            .with_context(|| format!("Mint account {} not found", mint))?;
        let mint_state = Mint::unpack(&mint_data)
            .map_err(|e| anyhow::anyhow!("Invalid mint account {}: {}", mint, e))?;

        let (name, symbol) = match self
            .rpc
            .get_account_data(&metadata_address(&mint_key)?.to_string())
            .await?
        {
            Some(data) => decode_header(&data)?,
            None => {
                debug!(mint = %mint, "No metadata account");
                (String::new(), String::new())
            }
        };

        Ok(TokenMetadata {
            name,
            symbol,
            decimals: mint_state.decimals,
            freeze_authority: mint_state.freeze_authority.is_some(),
            mint_authority: mint_state.mint_authority.is_some(),
        })
    }
}
