//! Core functionality for linkauth
//!
//! This crate contains the application registry and the token lifecycle engine
//! behind magic-link sign-in.
//!
//! An application is registered with an admin email; its id is derived from that
//! email and it receives a random admin secret of which only the hash is stored.
//! Tokens have the form `<app_id>-<subject_id>-<nonce>`, so every token of an
//! application shares one key prefix and every token of one user within an
//! application shares a longer one. The services rely on those prefixes to count
//! users against a quota and to keep at most one live token per user.
//!
//! See [`ApplicationService`] for the registry, [`TokenService`] for issuing and
//! validating tokens, and [`repositories`] for the storage traits a backend must
//! implement. An in-memory backend lives in [`storage`].
pub mod application;
pub mod config;
pub mod crypto;
pub mod error;
pub mod id;
pub mod link;
pub mod repositories;
pub mod services;
pub mod storage;
pub mod validation;

pub use application::{AppRegistration, AppUpdate, AppView, Application, IssuedToken, NewApplication};
pub use config::{DEFAULT_USERS_QUOTA, MAX_SESSION_DURATION, MIN_SESSION_DURATION, TokenConfig};
pub use error::Error;
pub use id::TokenKey;
pub use link::build_magic_link;
pub use repositories::{
    ApplicationRepository, ApplicationRepositoryProvider, RepositoryProvider, TokenRepository,
    TokenRepositoryProvider,
};
pub use services::{ApplicationService, TokenService};
pub use storage::MemoryRepositoryProvider;
