//! Core primitives shared by the session and network layers.

pub mod token;

pub use token::{derive_token, random_seed, SessionToken, MAX_SEED};
