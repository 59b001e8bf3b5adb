//! Provider facade
//!
//! Wires the session store, invalidation bus, REST client and realtime
//! channel together and hands out permission queries and guards bound to
//! them. One provider per application context.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;
use z0rath_model::{Credential, Identity};

use crate::api::{AuthorizationApi, HttpAuthorizationApi};
use crate::bus::InvalidationBus;
use crate::config::ClientConfig;
use crate::error::ProviderError;
use crate::guard::{GuardProps, Guarded};
use crate::permission::{PermissionQuery, QueryDeps};
use crate::realtime::{ChannelConnector, ChannelDeps, ChannelStatus, RealtimeChannel, WsConnector};
use crate::session::SessionStore;

/// One client context: session, invalidation bus, REST client and push channel.
pub struct Provider {
    session: SessionStore,
    bus: InvalidationBus,
    api: Arc<dyn AuthorizationApi>,
    channel: RealtimeChannel,
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("session", &self.session)
            .field("bus", &self.bus)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

impl Provider {
    /// Connect to the service named by `config` over HTTP and websockets.
    ///
    /// # Panics
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: ClientConfig) -> Result<Self, ProviderError> {
        let api = HttpAuthorizationApi::new(config.base_url.clone(), config.request_timeout)?;
        let connector = WsConnector::from_base_url(&config.base_url)?;
        info!(endpoint = %connector.endpoint(), "push channel endpoint");
        Ok(Self::with_parts(config, Arc::new(api), Arc::new(connector)))
    }

    /// Build from caller-supplied transports.
    ///
    /// # Panics
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_parts(
        config: ClientConfig,
        api: Arc<dyn AuthorizationApi>,
        connector: Arc<dyn ChannelConnector>,
    ) -> Self {
        let session = SessionStore::new(Identity::new(config.api_key, config.user));
        let bus = InvalidationBus::new();
        let channel = RealtimeChannel::spawn(ChannelDeps {
            session: session.clone(),
            api: Arc::clone(&api),
            connector,
            bus: bus.clone(),
            reconnect: config.reconnect,
        });

        Self {
            session,
            bus,
            api,
            channel,
        }
    }

    /// The single identity mutation path for the application.
    pub fn set_user(&self, user: Option<String>) -> bool {
        self.session.set_user(user)
    }

    /// Rotate the API key; reconnects and re-queries like a user change.
    pub fn set_credential(&self, credential: impl Into<Credential>) -> bool {
        self.session.set_credential(credential.into())
    }

    /// The session store every component reads.
    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// The bus invalidations are republished on.
    pub fn bus(&self) -> &InvalidationBus {
        &self.bus
    }

    /// Collaborators for mounting queries outside the provider.
    pub fn query_deps(&self) -> QueryDeps {
        QueryDeps {
            session: self.session.clone(),
            api: Arc::clone(&self.api),
            bus: self.bus.clone(),
        }
    }

    /// Mount a permission query for `slug`.
    pub fn permission(&self, slug: impl Into<String>) -> PermissionQuery {
        PermissionQuery::mount(slug, self.query_deps())
    }

    /// Mount a guarded boundary around `children`.
    pub fn guard<T>(&self, props: GuardProps, children: T) -> Guarded<T> {
        Guarded::mount(props, self.query_deps(), children)
    }

    /// Current push channel status.
    pub fn channel_status(&self) -> ChannelStatus {
        self.channel.status()
    }

    /// Watch push channel status changes.
    pub fn subscribe_channel_status(&self) -> watch::Receiver<ChannelStatus> {
        self.channel.subscribe_status()
    }

    /// Presentational "unable to establish connection" flag.
    pub fn has_error(&self) -> bool {
        self.channel.has_error()
    }

    /// Close the push channel and stop the channel worker. Mounted queries
    /// keep working but no longer receive invalidations.
    pub async fn shutdown(self) {
        self.channel.shutdown().await;
    }
}
