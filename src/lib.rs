//! Client-side caching and state synchronization for PromptRepo.
//!
//! Prompts, evals, repository configuration and the signed-in session each
//! live in a store that hydrates from local storage, skips the network while
//! its cache is fresh, and resynchronizes with the REST backend on demand.

pub mod api;
pub mod config;
pub mod entity;
pub mod error;
pub mod freshness;
pub mod hydration;
pub mod logging;
pub mod persist;
pub mod store;
pub mod types;
pub mod workspace;

pub use error::{ApiError, StoreError};
pub use workspace::{Backend, Storages, Workspace};
