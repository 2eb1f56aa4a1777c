//! Coordination task that owns the [`SessionRegistry`].
//!
//! Host commands and engine events are serialized through one task, so
//! messages for a session are handled in the order they were submitted.
//! Media capture runs in its own task and reports back through the command
//! channel; other sessions keep being served while a permission prompt is up.
//! Requests that need kinds already being captured wait for that capture
//! instead of starting another one.

use crate::config::{BridgeConfig, SessionConfig, StreamSelection};
use crate::error::{Error, Result};
use crate::peer::engine::{PeerEventReceiver, RtcEngine};
use crate::peer::media::CapturedMedia;
use crate::registry::{MediaStep, SessionRegistry};
use crate::signaling::{SignalMessage, SignalingBridge};
use crate::video::{VideoSurface, VideoViewConfig, ViewParams};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    CreateSession {
        key: String,
        config: SessionConfig,
        reply: Reply<()>,
    },
    Call {
        key: String,
        reply: Reply<()>,
    },
    Deliver {
        key: String,
        message: SignalMessage,
        reply: Reply<()>,
    },
    Renegotiate {
        key: String,
        config: SessionConfig,
        reply: Reply<()>,
    },
    MediaReady {
        request: StreamSelection,
        captured: Result<CapturedMedia>,
        waiter: Waiter,
    },
    Disconnect {
        key: String,
        reply: Reply<()>,
    },
    SetVideoView {
        config: VideoViewConfig,
        reply: Reply<()>,
    },
    RefreshVideoView {
        container: ViewParams,
        reply: Reply<()>,
    },
    SetVideoVisible {
        visible: bool,
        reply: Reply<()>,
    },
    VideoSizeChanged {
        key: String,
        width: f64,
        height: f64,
        reply: Reply<()>,
    },
    Status {
        reply: Reply<BridgeStatus>,
    },
    Shutdown,
}

/// A call or renegotiation parked until its local media is captured
struct Waiter {
    key: String,
    work: Deferred,
}

enum Deferred {
    Call(Reply<()>),
    Renegotiate {
        config: SessionConfig,
        reply: Reply<()>,
    },
}

impl Waiter {
    fn fail(self, error: Error) {
        let reply = match self.work {
            Deferred::Call(reply) => reply,
            Deferred::Renegotiate { reply, .. } => reply,
        };
        let _ = reply.send(Err(error));
    }
}

/// Snapshot of the registry, mostly for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeStatus {
    pub sessions: usize,
    pub media_holders: usize,
    pub has_local_audio: bool,
    pub has_local_video: bool,
    pub remote_tiles: usize,
    /// Sessions whose call or renegotiation waits for a capture
    pub awaiting_media: usize,
}

/// Cloneable entry point used by host commands
#[derive(Clone)]
pub struct BridgeHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl BridgeHandle {
    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(build(reply)).map_err(|_| Error::Closed)?;
        rx.await.map_err(|_| Error::Closed)?
    }

    pub async fn create_session(&self, key: &str, config: SessionConfig) -> Result<()> {
        let key = key.to_string();
        self.request(|reply| Command::CreateSession { key, config, reply })
            .await
    }

    pub async fn call(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.request(|reply| Command::Call { key, reply }).await
    }

    /// Delivers a raw inbound envelope. Malformed or unknown messages are
    /// logged and dropped without touching the session.
    pub async fn receive_message(&self, key: &str, raw: &str) -> Result<()> {
        let message = match SignalMessage::parse(raw) {
            Ok(message) => message,
            Err(e) if e.is_droppable_message() => {
                warn!("Dropping inbound message for {}: {}", key, e);
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        self.deliver(key, message).await
    }

    pub async fn deliver(&self, key: &str, message: SignalMessage) -> Result<()> {
        let key = key.to_string();
        self.request(|reply| Command::Deliver {
            key,
            message,
            reply,
        })
        .await
    }

    pub async fn renegotiate(&self, key: &str, config: SessionConfig) -> Result<()> {
        let key = key.to_string();
        self.request(|reply| Command::Renegotiate { key, config, reply })
            .await
    }

    pub async fn disconnect(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.request(|reply| Command::Disconnect { key, reply }).await
    }

    pub async fn set_video_view(&self, config: VideoViewConfig) -> Result<()> {
        self.request(|reply| Command::SetVideoView { config, reply })
            .await
    }

    pub async fn refresh_video_view(&self, container: ViewParams) -> Result<()> {
        self.request(|reply| Command::RefreshVideoView { container, reply })
            .await
    }

    pub async fn hide_video_view(&self) -> Result<()> {
        self.request(|reply| Command::SetVideoVisible {
            visible: false,
            reply,
        })
        .await
    }

    pub async fn show_video_view(&self) -> Result<()> {
        self.request(|reply| Command::SetVideoVisible {
            visible: true,
            reply,
        })
        .await
    }

    pub async fn video_size_changed(&self, key: &str, width: f64, height: f64) -> Result<()> {
        let key = key.to_string();
        self.request(|reply| Command::VideoSizeChanged {
            key,
            width,
            height,
            reply,
        })
        .await
    }

    pub async fn status(&self) -> Result<BridgeStatus> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// Disconnects every session and stops the coordination task
    pub fn shutdown(&self) {
        if self.commands.send(Command::Shutdown).is_err() {
            debug!("Bridge already stopped");
        }
    }
}

struct Coordinator {
    registry: SessionRegistry,
    engine: Arc<dyn RtcEngine>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: PeerEventReceiver,
    loopback: mpsc::WeakUnboundedSender<Command>,
    waiting: Vec<Waiter>,
}

/// Builds the bridge without spawning it. The returned future is the
/// coordination task; run it on the host's runtime.
pub fn build_bridge(
    config: BridgeConfig,
    engine: Arc<dyn RtcEngine>,
    bridge: Arc<dyn SignalingBridge>,
    surface: Arc<dyn VideoSurface>,
) -> (BridgeHandle, impl Future<Output = ()> + Send + 'static) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let registry = SessionRegistry::new(config, Arc::clone(&engine), bridge, surface, event_tx);
    let coordinator = Coordinator {
        registry,
        engine,
        commands: command_rx,
        events: event_rx,
        loopback: command_tx.downgrade(),
        waiting: Vec::new(),
    };

    (
        BridgeHandle {
            commands: command_tx,
        },
        coordinator.run(),
    )
}

/// Builds the bridge and spawns its task on the current tokio runtime
pub fn spawn_bridge(
    config: BridgeConfig,
    engine: Arc<dyn RtcEngine>,
    bridge: Arc<dyn SignalingBridge>,
    surface: Arc<dyn VideoSurface>,
) -> BridgeHandle {
    let (handle, task) = build_bridge(config, engine, bridge, surface);
    tokio::spawn(task);
    handle
}

impl Coordinator {
    async fn run(mut self) {
        info!("Bridge started");
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle(command).await,
                },
                Some(envelope) = self.events.recv() => {
                    self.registry.handle_peer_event(envelope).await;
                }
            }
        }

        self.registry.disconnect_all().await;
        info!("Bridge stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::CreateSession { key, config, reply } => {
                let _ = reply.send(self.registry.create_session(&key, config));
            }
            Command::Call { key, reply } => {
                let step = self.registry.prepare_call(&key);
                let waiter = Waiter {
                    key,
                    work: Deferred::Call(reply),
                };
                self.proceed(step, waiter).await;
            }
            Command::Deliver {
                key,
                message,
                reply,
            } => {
                let _ = reply.send(self.registry.receive_message(&key, message).await);
            }
            Command::Renegotiate { key, config, reply } => {
                let step = self.registry.prepare_renegotiate(&key, &config);
                let waiter = Waiter {
                    key,
                    work: Deferred::Renegotiate { config, reply },
                };
                self.proceed(step, waiter).await;
            }
            Command::MediaReady {
                request,
                captured,
                waiter,
            } => {
                match self.registry.finish_capture(request, captured) {
                    Ok(()) => self.waiting.push(waiter),
                    Err(e) => {
                        self.registry.abandon_capture(&waiter.key);
                        waiter.fail(e);
                    }
                }
                self.resume_waiting().await;
            }
            Command::Disconnect { key, reply } => {
                let _ = reply.send(self.registry.disconnect(&key).await);
            }
            Command::SetVideoView { config, reply } => {
                let _ = reply.send(self.registry.set_video_view(config));
            }
            Command::RefreshVideoView { container, reply } => {
                let _ = reply.send(self.registry.refresh_video_view(container));
            }
            Command::SetVideoVisible { visible, reply } => {
                self.registry.set_video_visible(visible);
                let _ = reply.send(Ok(()));
            }
            Command::VideoSizeChanged {
                key,
                width,
                height,
                reply,
            } => {
                let _ = reply.send(self.registry.video_size_changed(&key, width, height));
            }
            Command::Status { reply } => {
                let media = self.registry.media();
                let _ = reply.send(Ok(BridgeStatus {
                    sessions: self.registry.session_count(),
                    media_holders: media.holders(),
                    has_local_audio: media.audio().is_some(),
                    has_local_video: media.video().is_some(),
                    remote_tiles: self.registry.view().tiles().len(),
                    awaiting_media: self.registry.awaiting_media(),
                }));
            }
            Command::Shutdown => {}
        }
    }

    async fn proceed(&mut self, step: Result<MediaStep>, waiter: Waiter) {
        match step {
            Err(e) => waiter.fail(e),
            Ok(MediaStep::Ready) => self.complete(waiter).await,
            Ok(MediaStep::Capture(request)) => self.spawn_capture(request, waiter),
            Ok(MediaStep::Await) => {
                debug!("{} waits for a capture already in flight", waiter.key);
                self.waiting.push(waiter);
            }
        }
    }

    async fn complete(&mut self, waiter: Waiter) {
        let Waiter { key, work } = waiter;
        match work {
            Deferred::Call(reply) => {
                let _ = reply.send(self.registry.complete_call(&key).await);
            }
            Deferred::Renegotiate { config, reply } => {
                let _ = reply.send(self.registry.complete_renegotiate(&key, config).await);
            }
        }
    }

    /// Completes every parked request no capture in flight still covers.
    /// Requests whose media never arrived fail in `complete`.
    async fn resume_waiting(&mut self) {
        for waiter in std::mem::take(&mut self.waiting) {
            let wanted = match &waiter.work {
                Deferred::Call(_) => self
                    .registry
                    .session(&waiter.key)
                    .map(|session| session.config().streams),
                Deferred::Renegotiate { config, .. } => Some(config.streams),
            };
            match wanted {
                Some(wanted) if self.registry.awaits_capture(wanted) => self.waiting.push(waiter),
                _ => self.complete(waiter).await,
            }
        }
    }

    fn spawn_capture(&self, request: StreamSelection, waiter: Waiter) {
        let engine = Arc::clone(&self.engine);
        let loopback = self.loopback.clone();
        tokio::spawn(async move {
            let captured = engine.capture(request).await;
            let ready = Command::MediaReady {
                request,
                captured,
                waiter,
            };
            match loopback.upgrade() {
                Some(commands) => {
                    if commands.send(ready).is_err() {
                        debug!("Bridge stopped before capture finished");
                    }
                }
                None => debug!("Bridge stopped before capture finished"),
            }
        });
    }
}
