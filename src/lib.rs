//! # Shapeguard
//!
//! Client for APIs protected by attestation tokens and device
//! fingerprinting.
//!
//! Every outgoing request carries a static API key plus a short-lived
//! attestation token issued by a remote attestation backend. Tokens are
//! only issued inside an established session, and the backend can
//! invalidate a session at any time, so acquisition is a two-phase
//! protocol:
//!
//! ## Token Acquisition
//!
//! ### Phase 1: Direct Fetch
//! - Request a token for the target API against the current session
//! - On success the token is attached and the request goes out
//!
//! ### Phase 2: Session Recovery (only on a session-classified failure)
//! - Collect fresh device evidence from the fingerprint provider
//! - Initialize a replacement session with the fixed site parameters
//! - Retry the token fetch exactly once, supplying the evidence so the
//!   backend can bind the new session to this device
//!
//! Non-session failures (network, backend outage) are never retried, and
//! the retry outcome is terminal either way: worst-case latency stays
//! bounded and a systemically broken backend cannot turn into a loop.
//!
//! The fingerprint provider has its own asynchronous bootstrap. It runs
//! at most once per process; concurrent first callers share the
//! in-flight load, and every evidence request performs a fresh
//! evaluation against the loaded agent.
//!
//! ## Example
//!
//! ```rust,ignore
//! use shapeguard::{Config, ShapesClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ShapesClient::new(Config::from_env()?)?;
//!
//!     // Optional: overlap the fingerprint bootstrap with startup.
//!     client.initialize().await?;
//!
//!     let shape = client.shape().await?;
//!     println!("{:?}", shape.shape);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod attestation;
pub mod client;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod token;

pub use api::{HelloResponse, ShapeResponse};
pub use client::{Protection, ShapesClient};
pub use config::Config;
pub use error::{Error, Result};
pub use fingerprint::{Evidence, FingerprintSource};
pub use token::TokenAcquirer;
