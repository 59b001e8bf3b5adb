//! # z0rath core
//!
//! Client-side authorization checks that stay correct while permissions
//! change on the server.
//!
//! The pieces, leaf first:
//!
//! - [`bus`]: typed in-process publish/subscribe keyed by event kind
//! - [`session`]: the current identity behind a single mutation path
//! - [`realtime`]: exchanges a ticket for a push channel and republishes
//!   its invalidations on the bus
//! - [`permission`]: per-slug queries that re-validate on invalidation
//! - [`guard`]: render boundary with a lost-access callback
//! - [`provider`]: wires all of the above from a [`ClientConfig`]
//!
//! ```no_run
//! use z0rath_core::{ClientConfig, GuardProps, Provider};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = Provider::new(ClientConfig::new("api-key"))?;
//! provider.set_user(Some("u1".to_string()));
//!
//! let mut admin = provider.guard(
//!     GuardProps::new("admin").on_lost_access(|_redirect| eprintln!("access revoked")),
//!     "admin panel",
//! );
//! while admin.changed().await.is_some() {
//!     println!("render: {:?}", admin.render());
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod bus;
pub mod config;
pub mod error;
pub mod guard;
pub mod permission;
pub mod provider;
pub mod realtime;
pub mod request;
pub mod session;

pub use api::{AuthorizationApi, HttpAuthorizationApi};
pub use bus::{EventBus, InvalidationBus, ScopedSubscription, Subscription};
pub use config::{ClientConfig, ConfigLoadError, ConfigLoader};
pub use error::{ApiError, ApiResult, ChannelError, ProviderError};
pub use guard::{Guard, GuardProps, Guarded, Render};
pub use permission::{PermissionQuery, QueryDeps};
pub use provider::Provider;
pub use realtime::{ChannelConnector, ChannelStatus, PushChannel, RealtimeChannel, ReconnectPolicy};
pub use request::{RequestLease, RequestSlot};
pub use session::SessionStore;

pub use z0rath_model as model;
