use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use lifeline_frame::{ControlMessage, Frame, FrameType, LifelineCodec};

use crate::config::BouncerConfig;
use crate::error::{BouncerError, Result};
use crate::session::{ClientStream, Session, SessionCmd};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

struct SessionEntry {
    cmds: mpsc::Sender<SessionCmd>,
    last_active: Arc<AtomicU64>,
}

type Registry = Arc<Mutex<HashMap<String, SessionEntry>>>;

/// Accepts lifeline clients and owns the session registry.
///
/// Every accepted connection must open with a control frame: `{}` mints a
/// new session (and its upstream connection), `{resume, ack}` re-attaches
/// to an existing one. Sessions outlive their clients; an idle sweeper
/// reaps the ones nobody came back for.
pub struct Bouncer {
    config: BouncerConfig,
    registry: Registry,
    epoch: Instant,
}

impl Bouncer {
    pub fn new(config: BouncerConfig) -> Self {
        Self {
            config,
            registry: Arc::new(Mutex::new(HashMap::new())),
            epoch: Instant::now(),
        }
    }

    /// Bind the configured listen address and serve until the listener fails.
    pub async fn run(self) -> Result<()> {
        let listener =
            TcpListener::bind(&self.config.listen)
                .await
                .map_err(|source| BouncerError::Bind {
                    addr: self.config.listen.clone(),
                    source,
                })?;
        info!(addr = %self.config.listen, upstream = %self.config.upstream, "bouncer listening");
        self.serve(listener).await
    }

    /// Serve connections from an already-bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let bouncer = Arc::new(self);
        let sweeper = tokio::spawn(sweep_idle(bouncer.clone()));

        let result = loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(%peer, "client connected");
                    let bouncer = bouncer.clone();
                    tokio::spawn(async move { bouncer.handle_client(stream).await });
                }
                Err(err) => break Err(BouncerError::Accept(err)),
            }
        };

        sweeper.abort();
        result
    }

    async fn handle_client(&self, stream: TcpStream) {
        let mut client = Framed::new(stream, LifelineCodec::new());

        // The first frame must be a control request: resume or new session.
        let frame = match tokio::time::timeout(HANDSHAKE_TIMEOUT, client.next()).await {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(err))) => {
                debug!(error = %err, "client framing error before handshake");
                return;
            }
            Ok(None) | Err(_) => {
                reject(client, "missing control frame").await;
                return;
            }
        };
        if frame.frame_type != FrameType::Control {
            reject(client, "missing control frame").await;
            return;
        }
        let request = match ControlMessage::from_payload(&frame.payload) {
            Ok(request) => request,
            Err(err) => {
                debug!(error = %err, "unparseable handshake control");
                reject(client, "missing control frame").await;
                return;
            }
        };

        if let Some(token) = &request.resume {
            let cmds = {
                self.registry
                    .lock()
                    .await
                    .get(token)
                    .map(|entry| entry.cmds.clone())
            };
            match cmds {
                Some(cmds) => {
                    let attach = SessionCmd::Attach {
                        client,
                        resume_offset: request.ack,
                    };
                    if let Err(send_err) = cmds.send(attach).await {
                        // The session tore down while this client was connecting.
                        debug!(token = %token, "resume raced session teardown");
                        if let SessionCmd::Attach { client, .. } = send_err.0 {
                            reject(client, "invalid session").await;
                        }
                    }
                }
                None => {
                    debug!(token = %token, "resume for unknown session");
                    reject(client, "invalid session").await;
                }
            }
        } else {
            self.start_session(client).await;
        }
    }

    /// Mint a session: connect upstream, register, and attach the client.
    async fn start_session(&self, client: ClientStream) {
        let upstream = match TcpStream::connect(&self.config.upstream).await {
            Ok(upstream) => upstream,
            Err(err) => {
                warn!(upstream = %self.config.upstream, error = %err, "upstream connect failed");
                reject(client, "connection refused").await;
                return;
            }
        };

        let token = uuid::Uuid::new_v4().simple().to_string();
        let last_active = Arc::new(AtomicU64::new(self.epoch.elapsed().as_secs()));
        let (cmd_tx, cmd_rx) = mpsc::channel(4);
        let session = Session::new(
            token.clone(),
            self.config.buffer_limit,
            cmd_rx,
            last_active.clone(),
            self.epoch,
        );

        self.registry.lock().await.insert(
            token.clone(),
            SessionEntry {
                cmds: cmd_tx.clone(),
                last_active,
            },
        );

        let registry = self.registry.clone();
        let task_token = token.clone();
        tokio::spawn(async move {
            session.run(upstream).await;
            registry.lock().await.remove(&task_token);
            debug!(token = %task_token, "session ended");
        });

        info!(token = %token, "session created");
        let _ = cmd_tx
            .send(SessionCmd::Attach {
                client,
                resume_offset: None,
            })
            .await;
    }
}

async fn sweep_idle(bouncer: Arc<Bouncer>) {
    let mut ticker = tokio::time::interval(bouncer.config.sweep_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let now = bouncer.epoch.elapsed().as_secs();
        let timeout = bouncer.config.session_timeout.as_secs();
        let idle: Vec<(String, mpsc::Sender<SessionCmd>)> = {
            let registry = bouncer.registry.lock().await;
            registry
                .iter()
                .filter(|(_, entry)| {
                    now.saturating_sub(entry.last_active.load(Ordering::Relaxed)) > timeout
                })
                .map(|(token, entry)| (token.clone(), entry.cmds.clone()))
                .collect()
        };
        for (token, cmds) in idle {
            info!(token = %token, "expiring idle session");
            let _ = cmds.send(SessionCmd::Expire).await;
        }
    }
}

async fn reject(mut client: ClientStream, reason: &str) {
    let message = ControlMessage::error(reason);
    match message.to_payload() {
        Ok(payload) => {
            let _ = client.send(Frame::control(payload)).await;
        }
        Err(err) => warn!(error = %err, "reject control failed to serialize"),
    }
}
