/// Trading Execution Module
///
/// Chain access, swap routing and the swap pipeline that both the buy
/// dispatcher and the position monitor run their trades through.

pub mod jupiter_client;
pub mod ledger;
pub mod rpc;
pub mod swap;

pub use jupiter_client::{JupiterClient, QuoteResponse, SwapFees, SwapRouter};
pub use rpc::{ChainRpc, Finality, LedgerSnapshot, ParsedInstruction, ParsedTransaction, SignatureState, SolanaRpc};
pub use swap::{PipelineOptions, SwapError, SwapOrder, SwapPipeline, SwapReceipt};
