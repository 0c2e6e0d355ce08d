use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use lifeline_frame::{ControlMessage, Frame, FrameType, LifelineCodec};

use crate::replay::ReplayBuffer;

const READ_CHUNK_SIZE: usize = 8 * 1024;
const CLIENT_QUEUE: usize = 32;

pub(crate) type ClientStream = Framed<TcpStream, LifelineCodec>;

/// Commands routed to a session task.
pub(crate) enum SessionCmd {
    /// Hand a freshly accepted (and handshaken) client to the session.
    Attach {
        client: ClientStream,
        resume_offset: Option<u64>,
    },
    /// Idle timeout: tear the session down.
    Expire,
}

struct ClientLink {
    sink: SplitSink<ClientStream, Frame>,
    frames: mpsc::Receiver<Frame>,
    reader: JoinHandle<()>,
}

/// One logical session: an upstream connection, its replay buffer, and at
/// most one attached client at a time.
///
/// The task owns all session state; clients come and go through
/// [`SessionCmd::Attach`] while the upstream connection lives on.
pub(crate) struct Session {
    token: String,
    buffer: ReplayBuffer,
    client: Option<ClientLink>,
    cmds: mpsc::Receiver<SessionCmd>,
    last_active: Arc<AtomicU64>,
    epoch: Instant,
}

impl Session {
    pub(crate) fn new(
        token: String,
        buffer_limit: usize,
        cmds: mpsc::Receiver<SessionCmd>,
        last_active: Arc<AtomicU64>,
        epoch: Instant,
    ) -> Self {
        Self {
            token,
            buffer: ReplayBuffer::new(buffer_limit),
            client: None,
            cmds,
            last_active,
            epoch,
        }
    }

    /// Relay between the upstream connection and whichever client is
    /// currently attached, until the upstream drops or the session expires.
    pub(crate) async fn run(mut self, upstream: TcpStream) {
        enum Step {
            Cmd(Option<SessionCmd>),
            Upstream(std::io::Result<usize>),
            Client(Option<Frame>),
        }

        let (mut up_read, mut up_write) = upstream.into_split();
        let mut chunk = BytesMut::with_capacity(READ_CHUNK_SIZE);

        loop {
            chunk.reserve(READ_CHUNK_SIZE);
            let step = {
                let client_frames = self.client.as_mut().map(|link| &mut link.frames);
                tokio::select! {
                    cmd = self.cmds.recv() => Step::Cmd(cmd),
                    read = up_read.read_buf(&mut chunk) => Step::Upstream(read),
                    frame = recv_opt(client_frames) => Step::Client(frame),
                }
            };

            match step {
                Step::Cmd(Some(SessionCmd::Attach {
                    client,
                    resume_offset,
                })) => self.attach(client, resume_offset).await,
                Step::Cmd(Some(SessionCmd::Expire)) | Step::Cmd(None) => {
                    debug!(token = %self.token, "session expired");
                    break;
                }
                Step::Upstream(Ok(0)) => {
                    debug!(token = %self.token, "upstream closed");
                    self.fail_client("connection lost").await;
                    break;
                }
                Step::Upstream(Ok(_)) => {
                    let data = chunk.split().freeze();
                    self.buffer.push(data.clone());
                    self.forward(data).await;
                }
                Step::Upstream(Err(err)) => {
                    debug!(token = %self.token, error = %err, "upstream read failed");
                    self.fail_client("connection lost").await;
                    break;
                }
                Step::Client(Some(frame)) => {
                    if !self.on_client_frame(frame, &mut up_write).await {
                        break;
                    }
                }
                Step::Client(None) => self.drop_client(),
            }
        }

        self.drop_client();
    }

    /// Swap in a new client: confirm the session token, replay buffered
    /// bytes past the resume offset, then start pumping its frames.
    async fn attach(&mut self, client: ClientStream, resume_offset: Option<u64>) {
        self.drop_client();
        self.touch();

        let (mut sink, mut stream) = client.split();

        let hello = ControlMessage::session(self.token.clone());
        if !send_control(&mut sink, &hello).await {
            return;
        }

        for chunk in self.buffer.replay_from(resume_offset) {
            if sink.send(Frame::data(chunk)).await.is_err() {
                debug!(token = %self.token, "client dropped during replay");
                return;
            }
        }

        let (frames_tx, frames_rx) = mpsc::channel(CLIENT_QUEUE);
        let token = self.token.clone();
        let reader = tokio::spawn(async move {
            while let Some(result) = stream.next().await {
                match result {
                    Ok(frame) => {
                        if frames_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        debug!(token = %token, error = %err, "client stream error");
                        break;
                    }
                }
            }
        });

        self.client = Some(ClientLink {
            sink,
            frames: frames_rx,
            reader,
        });
        debug!(token = %self.token, resumed = resume_offset.is_some(), "client attached");
    }

    /// Handle one frame from the attached client. Returns false when the
    /// session should end (upstream is gone).
    async fn on_client_frame(&mut self, frame: Frame, up_write: &mut OwnedWriteHalf) -> bool {
        match frame.frame_type {
            FrameType::Data => {
                if let Err(err) = up_write.write_all(&frame.payload).await {
                    debug!(token = %self.token, error = %err, "upstream write failed");
                    self.fail_client("connection lost").await;
                    return false;
                }
                true
            }
            FrameType::Control => {
                match ControlMessage::from_payload(&frame.payload) {
                    Ok(message) => {
                        if let Some(ack) = message.ack {
                            self.buffer.trim_to(ack);
                        }
                        self.touch();
                    }
                    Err(err) => {
                        debug!(token = %self.token, error = %err, "malformed control from client dropped");
                    }
                }
                true
            }
            FrameType::Reserved(code) => {
                debug!(token = %self.token, code, "ignoring reserved frame type");
                true
            }
        }
    }

    async fn forward(&mut self, data: Bytes) {
        let failed = match self.client.as_mut() {
            Some(link) => link.sink.send(Frame::data(data)).await.is_err(),
            None => false,
        };
        if failed {
            debug!(token = %self.token, "client write failed, detaching");
            self.drop_client();
        }
    }

    /// Tell the client the session is over, then close it.
    async fn fail_client(&mut self, reason: &str) {
        let Some(mut link) = self.client.take() else {
            return;
        };
        link.reader.abort();
        let message = ControlMessage::error(reason);
        let _ = send_control(&mut link.sink, &message).await;
        let _ = link.sink.close().await;
    }

    fn drop_client(&mut self) {
        if let Some(link) = self.client.take() {
            link.reader.abort();
        }
    }

    fn touch(&self) {
        self.last_active
            .store(self.epoch.elapsed().as_secs(), Ordering::Relaxed);
    }
}

async fn recv_opt(frames: Option<&mut mpsc::Receiver<Frame>>) -> Option<Frame> {
    match frames {
        Some(frames) => frames.recv().await,
        None => std::future::pending().await,
    }
}

async fn send_control(sink: &mut SplitSink<ClientStream, Frame>, message: &ControlMessage) -> bool {
    match message.to_payload() {
        Ok(payload) => sink.send(Frame::control(payload)).await.is_ok(),
        Err(err) => {
            warn!(error = %err, "control message failed to serialize");
            false
        }
    }
}
