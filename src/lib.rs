pub mod api_server;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod fetcher_free;
pub mod gex;
pub mod logging;
pub mod models;
pub mod schwab_client;
pub mod token_store;

// Re-exports for convenience
pub use config::{Credentials, GexConfig};
pub use error::GexError;
pub use gex::{calculate_gex, filter_strikes_around_atm, format_gex_value, GexResult};
pub use models::ContractRecord;
pub use schwab_client::SchwabClient;
pub use token_store::{TokenRecord, TokenStore};
