use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tutor_live_types::{Blob, ClientMessage, LiveConfig, LiveEvent, ServerMessage};

use crate::realtime_api::{LiveConnector, LiveSession};

mod config;
mod consts;
mod stats;
mod utils;

pub use config::ClientConfig;
pub use stats::Stats;

enum Outbound {
    Message(ClientMessage),
    Close,
}

type ClientTx = mpsc::Sender<Outbound>;

struct Connection {
    send_handle: tokio::task::JoinHandle<()>,
    recv_handle: tokio::task::JoinHandle<()>,
}

/// One open Live API socket.
pub struct Client {
    c_tx: ClientTx,
    stats: Arc<Mutex<Stats>>,
    connection: Connection,
}

impl Client {
    /// Connects, queues the setup message and starts the send/receive tasks.
    /// Inbound traffic is forwarded to `events` in arrival order.
    pub async fn connect(
        config: &ClientConfig,
        live: LiveConfig,
        events: mpsc::Sender<LiveEvent>,
    ) -> anyhow::Result<Self> {
        let request = utils::build_request(config)?;
        let (ws_stream, _) = tokio_tungstenite::connect_async(request).await?;
        tracing::info!("Connected to Live API, model={}", config.model());

        let (mut write, mut read) = ws_stream.split();
        let (c_tx, mut c_rx) = mpsc::channel::<Outbound>(config.capacity());

        let send_handle = tokio::spawn(async move {
            while let Some(outbound) = c_rx.recv().await {
                match outbound {
                    Outbound::Message(message) => match serde_json::to_string(&message) {
                        Ok(text) => {
                            if let Err(e) = write.send(Message::Text(text)).await {
                                tracing::error!("failed to send message: {}", e);
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::error!("failed to serialize message: {}", e);
                        }
                    },
                    Outbound::Close => {
                        if let Err(e) = write.send(Message::Close(None)).await {
                            tracing::debug!("failed to send close frame: {}", e);
                        }
                        break;
                    }
                }
            }
        });

        let stats = Arc::new(Mutex::new(Stats::new()));
        let recv_stats = stats.clone();
        let recv_handle = tokio::spawn(async move {
            let mut reason = None;
            while let Some(message) = read.next().await {
                let message = match message {
                    Err(e) => {
                        tracing::error!("failed to read message: {}", e);
                        let _ = events.send(LiveEvent::Error(e.to_string())).await;
                        return;
                    }
                    Ok(message) => message,
                };
                // The Live API sends its JSON in binary frames as often as text ones.
                let text = match message {
                    Message::Text(text) => text,
                    Message::Binary(bin) => match String::from_utf8(bin) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::warn!("unexpected non-utf8 binary message: {}", e);
                            continue;
                        }
                    },
                    Message::Close(frame) => {
                        tracing::info!("connection closed: {:?}", frame);
                        reason = frame.map(|f| f.reason.to_string());
                        break;
                    }
                    _ => continue,
                };

                let message = match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::error!("failed to deserialize message: {}, text=> {:?}", e, text);
                        continue;
                    }
                };
                if let Some(usage) = message.usage_metadata() {
                    if let Ok(mut stats_guard) = recv_stats.lock() {
                        stats_guard.update_usage(
                            usage.total_token_count(),
                            usage.prompt_token_count(),
                            usage.response_token_count(),
                        );
                    } else {
                        tracing::error!("failed to update stats");
                    }
                }
                if let Some(go_away) = message.go_away() {
                    tracing::warn!("server will disconnect soon, time_left={:?}", go_away.time_left());
                }
                for event in message.into_events() {
                    tracing::debug!("received event: {:?}", event_kind(&event));
                    if events.send(event).await.is_err() {
                        return;
                    }
                }
            }
            let _ = events.send(LiveEvent::Closed(reason)).await;
        });

        let client = Self {
            c_tx,
            stats,
            connection: Connection {
                send_handle,
                recv_handle,
            },
        };
        client
            .c_tx
            .send(Outbound::Message(ClientMessage::Setup(live.to_setup(config.model()))))
            .await
            .map_err(|_| anyhow::anyhow!("connection dropped before setup"))?;
        Ok(client)
    }

    pub fn stats(&self) -> Stats {
        self.stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

fn event_kind(event: &LiveEvent) -> &'static str {
    match event {
        LiveEvent::Open => "open",
        LiveEvent::OutputTranscription(_) => "output_transcription",
        LiveEvent::InputTranscription(_) => "input_transcription",
        LiveEvent::TurnComplete => "turn_complete",
        LiveEvent::ModelAudio(_) => "model_audio",
        LiveEvent::Interrupted => "interrupted",
        LiveEvent::Error(_) => "error",
        LiveEvent::Closed(_) => "closed",
    }
}

impl LiveSession for Client {
    fn send_audio_frame(&self, frame: Blob) {
        if let Err(e) = self.c_tx.try_send(Outbound::Message(ClientMessage::audio(frame))) {
            tracing::warn!("dropped audio frame: {}", e);
        }
    }

    fn close(&self) {
        if self.c_tx.try_send(Outbound::Close).is_err() {
            self.connection.send_handle.abort();
        }
    }

    fn stats(&self) -> Option<Stats> {
        Some(Client::stats(self))
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.connection.recv_handle.abort();
    }
}

/// Connector for the Gemini Live API.
#[derive(Debug, Clone)]
pub struct GeminiLive {
    config: ClientConfig,
}

impl GeminiLive {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LiveConnector for GeminiLive {
    async fn open(
        &self,
        config: LiveConfig,
        events: mpsc::Sender<LiveEvent>,
    ) -> anyhow::Result<Box<dyn LiveSession>> {
        let client = Client::connect(&self.config, config, events).await?;
        Ok(Box::new(client))
    }
}
