//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the usecases layer requires from
//! the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `CredentialProvider`: Signed, short-lived request credentials
//! - `StreamConnector`: Long-lived market data connection
//! - `PortfolioSource`: Paginated position/activity snapshots

pub mod credentials;
pub mod portfolio;
pub mod stream;
