//! Session credentials: persistence, exchange with the provider's accounts
//! service, and proactive renewal ahead of expiry.

pub mod accounts;
pub mod refresh_scheduler;
pub mod token_store;

pub use accounts::{
    AccountsClient, AuthError, AuthResult, ProxyTokenEndpoint, TokenEndpoint, TokenGrant,
};
pub use refresh_scheduler::{plan_refresh, RefreshOutcome, RefreshPlan, RefreshScheduler};
pub use token_store::{SessionCredentials, TokenStore};
