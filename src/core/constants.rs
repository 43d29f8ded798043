/// Well-known addresses and protocol constants

/// Wrapped SOL pseudo-mint used by the router and the AMM for the native asset
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// Raydium Liquidity Pool V4 program
pub const RAYDIUM_AMM_PROGRAM: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";

/// Log marker emitted when a Raydium V4 pool is initialized
pub const POOL_INIT_MARKER: &str = "initialize2";

/// Metaplex token metadata program
pub const TOKEN_METADATA_PROGRAM: &str = "metaqbxxUerdq28cw5RLtpdGoeWpQHSXu3vVbVcB6Bw";

/// Instruction account slots of `initialize2` (position based, protocol defined)
pub const POOL_ACCOUNT_SLOT: usize = 4;
pub const COIN_MINT_SLOT: usize = 8;
pub const PC_MINT_SLOT: usize = 9;

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Risk scores derived from mint authorities
pub const RISK_HIGH: u8 = 100;
pub const RISK_MEDIUM: u8 = 50;
pub const RISK_LOW: u8 = 0;

/// Capacity of the recent-signature window used for event dedup
pub const SIGNATURE_HISTORY_CAPACITY: usize = 10;

/// Maximum submission attempts for a signed swap
pub const MAX_SUBMIT_ATTEMPTS: u32 = 5;

pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

pub fn sol_to_lamports(sol: f64) -> u64 {
    (sol * LAMPORTS_PER_SOL as f64).round() as u64
}

/// Truncates `value` toward zero at `decimals` places for display
pub fn round_down(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).trunc() / factor
}
