use std::fmt;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};
use url::Url;
use z0rath_model::Ticket;
use z0rath_model::routes::v1;

use crate::error::ChannelError;

/// An open push channel, exclusively owned by the channel worker.
#[async_trait]
pub trait PushChannel: Send {
    /// Next text payload. `None` once the peer has closed the channel.
    async fn recv(&mut self) -> Option<Result<String, ChannelError>>;

    /// Close the channel from our side.
    async fn close(&mut self) -> Result<(), ChannelError>;
}

/// Opens push channels by redeeming a ticket.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    /// Redeem `ticket` for an open channel.
    async fn connect(&self, ticket: &Ticket) -> Result<Box<dyn PushChannel>, ChannelError>;
}

/// Derive the websocket endpoint from the REST base URL.
pub fn push_endpoint(base_url: &Url) -> Result<Url, ChannelError> {
    let scheme = match base_url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(ChannelError::Endpoint(format!(
                "unsupported scheme '{other}'"
            )));
        }
    };
    let base = base_url.as_str().trim_end_matches('/');
    let mut url = Url::parse(&format!("{base}{}", v1::websockets::CONNECT))
        .map_err(|err| ChannelError::Endpoint(err.to_string()))?;
    url.set_scheme(scheme)
        .map_err(|()| ChannelError::Endpoint(format!("cannot switch to {scheme}")))?;
    Ok(url)
}

/// Websocket connector backed by tokio-tungstenite
#[derive(Debug, Clone)]
pub struct WsConnector {
    endpoint: Url,
}

impl WsConnector {
    /// Connector for an already derived websocket endpoint.
    pub fn new(endpoint: Url) -> Self {
        Self { endpoint }
    }

    /// Connector for the push endpoint of a REST base URL.
    pub fn from_base_url(base_url: &Url) -> Result<Self, ChannelError> {
        push_endpoint(base_url).map(Self::new)
    }

    /// Websocket endpoint tickets are redeemed at.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl ChannelConnector for WsConnector {
    async fn connect(&self, ticket: &Ticket) -> Result<Box<dyn PushChannel>, ChannelError> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("ticket", ticket.as_str());

        let (stream, _response) = connect_async(url.as_str()).await?;
        debug!(endpoint = %self.endpoint, "websocket connection established");

        Ok(Box::new(WsChannel { stream }))
    }
}

struct WsChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl fmt::Debug for WsChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsChannel").finish_non_exhaustive()
    }
}

#[async_trait]
impl PushChannel for WsChannel {
    async fn recv(&mut self) -> Option<Result<String, ChannelError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(err) => {
                        warn!(error = %err, "dropping non-utf8 binary frame");
                        continue;
                    }
                },
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "websocket closed by server");
                    return None;
                }
                Ok(other) => {
                    trace!(?other, "skipping control frame");
                    continue;
                }
                Err(err) => return Some(Err(err.into())),
            }
        }
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        self.stream.close(None).await.map_err(ChannelError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn https_base_maps_to_wss_endpoint() {
        let base = Url::parse("https://z0rath-api.zonezero.dev/api/v1").unwrap();
        let endpoint = push_endpoint(&base).unwrap();
        assert_eq!(
            endpoint.as_str(),
            "wss://z0rath-api.zonezero.dev/api/v1/websockets/ws"
        );
    }

    #[test]
    fn http_base_maps_to_ws_endpoint() {
        let base = Url::parse("http://127.0.0.1:8080/api/v1/").unwrap();
        let endpoint = push_endpoint(&base).unwrap();
        assert_eq!(endpoint.as_str(), "ws://127.0.0.1:8080/api/v1/websockets/ws");
    }

    #[test]
    fn rejects_unknown_scheme() {
        let base = Url::parse("ftp://example.test/api").unwrap();
        assert!(matches!(push_endpoint(&base), Err(ChannelError::Endpoint(_))));
    }
}
