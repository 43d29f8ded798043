pub mod dispatcher;
pub mod handler;

pub use dispatcher::{BuyDispatcher, BuyOutcome, DispatchSummary};
pub use handler::MigrationHandler;
