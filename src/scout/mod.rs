pub mod metadata;
pub mod parser;

pub use metadata::{MetadataSource, TokenMetadata, TokenMetadataClient};
pub use parser::{MigrationParser, ParseRejection, PoolAccounts};
