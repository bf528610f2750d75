//! Port Definitions
//!
//! Driven ports used by the application services. All are object safe
//! and `Send + Sync` so they can be shared as `Arc<dyn Port>` across
//! workers.

mod auth_port;
mod company_data_port;
mod market_data_port;
mod ranked_list_port;
mod store_port;

pub use auth_port::{ConsentPrompt, CredentialError, CredentialSource, TokenEndpoint};
#[cfg(test)]
pub use auth_port::MockTokenEndpoint;
pub use company_data_port::CompanyDataPort;
pub use market_data_port::{MarketDataPort, MoversFilter, MoversSort, ProviderError};
pub use ranked_list_port::{RankedCategory, RankedListPort};
pub use store_port::{CredentialStore, StoreError, TickerStore};
