//! # sidstore core
//!
//! Server-side session storage keyed by a signed cookie.
//!
//! A client carries only `<signature>-<session id>`; everything else lives in
//! a [`Record`] held by a pluggable [`Backend`]. This crate ships the
//! in-process [`MemoryBackend`]; `sidstore-redis` adds a pooled Redis backend.
//!
//! ## Pieces
//!
//! - **[`Record`]**: attributes, absolute expiry and a flash queue for one
//!   session.
//! - **[`codec`]**: `Record` ⇄ bytes for backends that store blobs.
//! - **[`Backend`]**: get / set / delete by [`SessionId`], selected by name
//!   through the [`registry`].
//! - **[`SessionHandle`]**: per-request façade with lazy creation, dirty
//!   tracking, refresh, flashes and cookie emission.
//! - **[`SessionManager`]**: built once at startup from a [`SessionConfig`];
//!   mints handles.
//!
//! ## Request lifecycle
//!
//! ```
//! use sidstore_core::{SessionConfig, SessionManager};
//!
//! # async fn example(cookie_header: Option<&str>) -> sidstore_core::Result<()> {
//! let manager = SessionManager::open(SessionConfig::new("secret123"))?;
//!
//! let mut session = manager.handle_from_header(cookie_header);
//! if !session.init().await? {
//!     session.create(0);
//! }
//! session.set_key("visits", 1)?;
//!
//! // On every exit path:
//! if let Some(cookie) = session.finish().await {
//!     println!("Set-Cookie: {cookie}");
//! }
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

pub mod backend;
pub mod codec;
pub mod config;
pub mod cookie;
pub mod environment;
pub mod error;
pub mod handle;
pub mod manager;
pub mod memory;
pub mod registry;
pub mod record;
pub mod signer;

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

pub use backend::{Backend, BackendFactory, Fetched};
pub use config::SessionConfig;
pub use cookie::SessionCookie;
pub use environment::{Clock, SystemClock};
pub use error::{Result, SessionError};
pub use handle::{SessionHandle, SessionState};
pub use manager::SessionManager;
pub use memory::{MemoryBackend, MemoryFactory, ResidentRecord};
pub use record::{Record, SessionId, Value};
pub use registry::BackendRegistry;
pub use signer::{CookieSigner, HmacSigner};
