//! Repository traits for data access layer
//!
//! Services talk to storage only through these traits. Every lookup returns an
//! `Option` and every delete reports whether something was removed, so "not found"
//! is always distinguishable from a storage failure.
//!
//! # Trait Hierarchy
//!
//! - [`ApplicationRepository`] and [`TokenRepository`] define the operations
//! - `*RepositoryProvider` traits give access to each repository
//! - [`RepositoryProvider`] combines both plus lifecycle methods
//!
//! The registry and the token engine share one provider but only agree on the key
//! prefix convention in [`crate::id`]; neither touches the other's records directly.

pub mod adapter;
pub mod application;
pub mod token;

pub use adapter::{ApplicationRepositoryAdapter, TokenRepositoryAdapter};
pub use application::ApplicationRepository;
pub use token::TokenRepository;

use async_trait::async_trait;

use crate::Error;

/// Provider trait for application repository access.
pub trait ApplicationRepositoryProvider: Send + Sync + 'static {
    /// The application repository implementation type
    type ApplicationRepo: ApplicationRepository;

    /// Get the application repository
    fn application(&self) -> &Self::ApplicationRepo;
}

/// Provider trait for token repository access.
pub trait TokenRepositoryProvider: Send + Sync + 'static {
    /// The token repository implementation type
    type TokenRepo: TokenRepository;

    /// Get the token repository
    fn token(&self) -> &Self::TokenRepo;
}

/// Provider trait that storage implementations must implement to provide all repositories.
///
/// # Implementing a Custom Storage Backend
///
/// ```rust,ignore
/// use linkauth_core::repositories::*;
///
/// struct MyStorage { /* ... */ }
///
/// impl ApplicationRepositoryProvider for MyStorage {
///     type ApplicationRepo = MyApplicationRepository;
///     fn application(&self) -> &Self::ApplicationRepo { &self.applications }
/// }
///
/// // ... TokenRepositoryProvider ...
///
/// #[async_trait]
/// impl RepositoryProvider for MyStorage {
///     async fn migrate(&self) -> Result<(), Error> { /* ... */ }
///     async fn health_check(&self) -> Result<(), Error> { /* ... */ }
/// }
/// ```
#[async_trait]
pub trait RepositoryProvider: ApplicationRepositoryProvider + TokenRepositoryProvider {
    /// Run migrations for all repositories
    async fn migrate(&self) -> Result<(), Error>;

    /// Health check for all repositories
    async fn health_check(&self) -> Result<(), Error>;
}
