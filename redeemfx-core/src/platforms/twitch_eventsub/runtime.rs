// twitch_eventsub/runtime.rs

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};

use crate::Error;
use crate::platforms::twitch::client::TwitchHelixClient;
use crate::platforms::{RedemptionEvent, RedemptionTransport};

use super::events::{parse_redemption, EventSubMessage, REDEMPTION_ADD};

pub const DEFAULT_EVENTSUB_URL: &str = "wss://eventsub.wss.twitch.tv/ws";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long to wait for `session_welcome` after connecting.
const WELCOME_TIMEOUT: Duration = Duration::from_secs(10);
/// Twitch sends a keepalive at least every 10 s by default; silence past this
/// is treated as a dead socket.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// EventSub websocket session that only listens for channel point redemptions.
pub struct TwitchEventSubTransport {
    client: TwitchHelixClient,
    url: String,
    subscribe_url: String,
    ws: Option<WsStream>,
    session_id: Option<String>,
}

impl TwitchEventSubTransport {
    pub fn new(client: TwitchHelixClient, url: &str) -> Self {
        let subscribe_url = client.endpoint("/eventsub/subscriptions");
        Self {
            client,
            url: url.to_string(),
            subscribe_url,
            ws: None,
            session_id: None,
        }
    }

    /// The Twitch CLI websocket server takes subscriptions on its own host.
    pub fn with_subscribe_url(mut self, subscribe_url: &str) -> Self {
        self.subscribe_url = subscribe_url.to_string();
        self
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Health checks are logged at trace, everything else at debug.
    fn log_text_message(txt: &str, msg: &EventSubMessage) {
        if msg.is_health_check() {
            trace!("[TwitchEventSub] Received TEXT (health check): {}", txt);
        } else {
            debug!("[TwitchEventSub] Received TEXT: {}", txt);
        }
    }

    async fn open(url: &str) -> Result<(WsStream, String), Error> {
        let (mut ws, _) = connect_async(url)
            .await
            .map_err(|e| Error::Platform(format!("connect error: {e}")))?;

        match timeout(WELCOME_TIMEOUT, Self::wait_for_welcome(&mut ws)).await {
            Ok(Ok(session_id)) => Ok((ws, session_id)),
            Ok(Err(e)) => {
                let _ = ws.close(None).await;
                Err(e)
            }
            Err(_) => {
                let _ = ws.close(None).await;
                Err(Error::Platform("Timeout waiting for welcome message".into()))
            }
        }
    }

    async fn wait_for_welcome(ws: &mut WsStream) -> Result<String, Error> {
        while let Some(msg_res) = ws.next().await {
            let msg = msg_res.map_err(|e| Error::Platform(format!("ws error: {e}")))?;

            if msg.is_close() {
                return Err(Error::Platform("Connection closed while waiting for welcome".into()));
            }
            let Message::Text(txt) = msg else { continue };

            if let EventSubMessage::Welcome { session_id } = EventSubMessage::parse(&txt)? {
                return Ok(session_id);
            }
        }
        Err(Error::Platform("Connection closed without welcome message".into()))
    }

    /// Twitch asked us to hop. Subscriptions carry over, so we only swap the
    /// socket once the new one has said hello.
    async fn handle_reconnect(&mut self, new_url: &str) -> Result<(), Error> {
        warn!("[EventSub] reconnecting → {}", new_url);
        let (new_ws, session_id) = Self::open(new_url).await?;
        if let Some(mut old) = self.ws.replace(new_ws) {
            let _ = old.close(None).await;
        }
        self.session_id = Some(session_id);
        info!("[EventSub] Reconnect successful");
        Ok(())
    }
}

#[async_trait]
impl RedemptionTransport for TwitchEventSubTransport {
    async fn connect(&mut self) -> Result<(), Error> {
        self.close().await;
        let (ws, session_id) = Self::open(&self.url).await?;
        info!("[EventSub] connected → {} (session={})", self.url, session_id);
        self.ws = Some(ws);
        self.session_id = Some(session_id);
        Ok(())
    }

    async fn subscribe(&mut self, channel_id: &str) -> Result<(), Error> {
        let session_id = self
            .session_id
            .clone()
            .ok_or_else(|| Error::Platform("subscribe called before session_welcome".into()))?;

        let body = json!({
            "type": REDEMPTION_ADD,
            "version": "1",
            "condition": { "broadcaster_user_id": channel_id },
            "transport": {
                "method": "websocket",
                "session_id": session_id
            }
        });
        debug!("Subscribing to {} => {:?}", REDEMPTION_ADD, body);

        let req = self.client.http_client().post(&self.subscribe_url).json(&body);
        self.client
            .execute("create_eventsub_subscription", req)
            .await?
            .success("create_eventsub_subscription")?;

        info!("[TwitchEventSub] subscribed to {} for channel {}", REDEMPTION_ADD, channel_id);
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<RedemptionEvent>, Error> {
        loop {
            let Some(ws) = self.ws.as_mut() else {
                return Ok(None);
            };

            let Some(msg_res) = timeout(READ_TIMEOUT, ws.next()).await? else {
                self.ws = None;
                return Ok(None);
            };
            let msg = msg_res.map_err(|e| Error::Platform(format!("ws error: {e}")))?;

            if msg.is_close() {
                info!("[EventSub] websocket closed by server.");
                self.ws = None;
                return Ok(None);
            }
            let Message::Text(txt) = msg else { continue };

            let parsed = match EventSubMessage::parse(&txt) {
                Ok(m) => m,
                Err(e) => {
                    error!("[EventSub] unreadable frame: {}", e);
                    continue;
                }
            };
            Self::log_text_message(&txt, &parsed);

            match parsed {
                EventSubMessage::Notification(env) => {
                    if let Some(evt) = parse_redemption(&env) {
                        return Ok(Some(evt));
                    }
                }
                EventSubMessage::Reconnect { url } => self.handle_reconnect(&url).await?,
                EventSubMessage::Revocation => {
                    return Err(Error::Platform("subscription revoked – check scopes".into()));
                }
                EventSubMessage::Welcome { .. } | EventSubMessage::Keepalive => {}
                EventSubMessage::Other(other) => debug!("unhandled message_type={:?}", other),
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut ws) = self.ws.take() {
            let _ = ws.close(None).await;
        }
        self.session_id = None;
    }
}
