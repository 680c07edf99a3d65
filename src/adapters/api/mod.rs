//! REST API Adapter
//!
//! Signed access to the portfolio snapshot endpoints:
//! - `auth`: HMAC-SHA256 credential provider
//! - `client`: retrying HTTP client
//! - `types`: wire DTOs
//! - `portfolio`: cursor-paginated `PortfolioSource`

pub mod auth;
pub mod client;
pub mod portfolio;
pub mod types;

pub use auth::HmacAuth;
pub use client::{ApiClient, ApiClientConfig};
pub use portfolio::RestPortfolio;
