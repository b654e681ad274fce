pub mod client;
pub mod models;

pub use client::{GatewayClient, GatewayError};
pub use models::{AccessToken, BillingAddress, OrderRequest, StatusResult, SubmittedOrder};
