//! Transport adapter: one per live session.
//!
//! Owns the channel, the pending-message table, the send counter and the
//! session registry. Every outbound push gets a correlation id
//! `"{identifier}{index}"` and an entry in the pending table. Inbound
//! broadcasts whose id is found (and removed) there are our own echoes: for
//! operations that is the acknowledgement. Everything else is a remote event.
//!
//! ```text
//!  editor ── send_code_update ──► registry[module] ── Outgoing ──► push ──► channel
//!                                        ▲
//!  channel ── handle_frame ──► own echo? ┤ yes: server_ack (maybe push buffer)
//!                                        └ no:  apply_server ──► LiveEvent::ApplyOperation
//! ```
//!
//! The adapter is driven from a single task; it never spawns and never
//! blocks. Events for the editor and the signal handler go out on the
//! receiver returned by [`LiveTransport::take_event_rx`].

use std::collections::HashMap;

use live_core::{Operation, Outgoing, SessionRegistry, SyncError};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::channel::Channel;
use crate::config::LiveConfig;
use crate::protocol::{
    ClientEvent, CorrelationId, InboundFrame, OutboundFrame, ReplyStatus, ServerEvent,
    TransportError,
};

/// Events emitted by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEvent {
    /// Room joined; these modules were seeded from the reply
    Joined { modules: Vec<String> },
    JoinRejected { reason: String },
    Left,
    /// Apply a remote operation to the editor buffer of `module_id`
    ApplyOperation {
        module_id: String,
        operation: Operation,
    },
    /// Replace the editor buffer of `module_id` with `code`
    Resynced { module_id: String, code: String },
    /// `module_id` lost sync; its snapshot has been requested
    Desync { module_id: String },
    /// The room refused one of our pushes; `error` is a
    /// [`TransportError::RemoteRejection`]
    Rejected {
        module_id: Option<String>,
        error: TransportError,
    },
    /// Room event that is not an operation or snapshot
    Signal(ServerEvent),
    /// Channel error with a payload
    ChannelError(String),
    /// The channel went away
    ConnectionLoss,
}

/// A push waiting for its echo.
#[derive(Debug, Clone)]
struct PendingMessage {
    module_id: Option<String>,
}

/// The transport adapter.
pub struct LiveTransport<C: Channel> {
    /// Prefix of every correlation id
    identifier: Uuid,
    /// Index of the next push
    message_index: u64,
    pending: HashMap<CorrelationId, PendingMessage>,
    channel: Option<C>,
    /// Set when the channel went away on its own, cleared by `connect`
    connection_lost: bool,
    topic: Option<String>,
    registry: SessionRegistry,
    config: LiveConfig,
    event_tx: mpsc::UnboundedSender<LiveEvent>,
    event_rx: Option<mpsc::UnboundedReceiver<LiveEvent>>,
}

impl<C: Channel> LiveTransport<C> {
    /// Create a disconnected transport.
    pub fn new(config: LiveConfig) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            identifier: Uuid::new_v4(),
            message_index: 0,
            pending: HashMap::new(),
            channel: None,
            connection_lost: false,
            topic: None,
            registry: SessionRegistry::new(),
            config,
            event_tx,
            event_rx: Some(event_rx),
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::UnboundedReceiver<LiveEvent>> {
        self.event_rx.take()
    }

    /// Attach a channel, replacing any previous one.
    pub fn connect(&mut self, channel: C) {
        if let Some(mut old) = self.channel.replace(channel) {
            old.close();
        }
        self.connection_lost = false;
        log::debug!("transport {} connected", self.identifier);
    }

    /// Join the room's channel topic. The reply seeds the registry.
    pub fn join(&mut self, room_id: &str) -> Result<(), TransportError> {
        let topic = self.config.topic(room_id);
        self.push_frame(&OutboundFrame::Join {
            topic: topic.clone(),
        })?;
        log::info!("joining {topic}");
        self.topic = Some(topic);
        Ok(())
    }

    /// Leave the current topic.
    pub fn leave(&mut self) -> Result<(), TransportError> {
        self.push_frame(&OutboundFrame::Leave)?;
        if let Some(topic) = self.topic.take() {
            log::info!("leaving {topic}");
        }
        Ok(())
    }

    /// Leave, drop the channel and forget all session state.
    ///
    /// The pending table is cleared and the send index restarts at 0.
    /// Frames still queued in the channel are not retried.
    pub fn disconnect(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            if self.topic.take().is_some() {
                if let Ok(frame) = OutboundFrame::Leave.encode() {
                    let _ = channel.push(frame);
                }
            }
            channel.close();
        }
        self.topic = None;
        self.connection_lost = false;
        self.pending.clear();
        self.message_index = 0;
        self.registry.clear();
        log::info!("transport {} disconnected", self.identifier);
    }

    /// Push an event with a fresh correlation id.
    pub fn send(&mut self, event: ClientEvent) -> Result<CorrelationId, TransportError> {
        let unavailable = self.unavailable();
        let channel = self.channel.as_mut().ok_or(unavailable)?;

        let correlation_id = format!("{}{}", self.identifier, self.message_index);
        let pending = PendingMessage {
            module_id: event.module_id().map(str::to_string),
        };
        let name = event.name();
        let frame = OutboundFrame::Push {
            correlation_id: correlation_id.clone(),
            event,
        }
        .encode()?;

        channel.push(frame)?;
        self.message_index += 1;
        self.pending.insert(correlation_id.clone(), pending);
        log::trace!("pushed {name} as {correlation_id}");
        Ok(correlation_id)
    }

    /// Report a local edit of `module_id` as its full before/after text.
    ///
    /// Returns the correlation id when the edit went out immediately, `None`
    /// when it was buffered behind an unacknowledged operation or changed
    /// nothing. If the push itself fails, the module is left desynced.
    pub fn send_code_update(
        &mut self,
        module_id: &str,
        before: &str,
        after: &str,
    ) -> Result<Option<CorrelationId>, TransportError> {
        if self.channel.is_none() {
            return Err(self.unavailable());
        }

        match self.registry.get(module_id).local_edit(before, after) {
            Ok(Some(outgoing)) => self
                .send_operation(module_id, outgoing)
                .map(Some)
                .map_err(|e| self.abandon(module_id, e)),
            Ok(None) => Ok(None),
            Err(e) if e.is_desync() => {
                self.recover(module_id)?;
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn send_module_saved(&mut self, module_id: &str) -> Result<CorrelationId, TransportError> {
        self.send(ClientEvent::ModuleSaved {
            module_id: module_id.to_string(),
        })
    }

    pub fn send_directory_updated(
        &mut self,
        directory_id: &str,
    ) -> Result<CorrelationId, TransportError> {
        self.send(ClientEvent::DirectoryUpdated {
            directory_id: directory_id.to_string(),
        })
    }

    pub fn send_user_current_module(
        &mut self,
        module_id: &str,
    ) -> Result<CorrelationId, TransportError> {
        self.send(ClientEvent::UserCurrentModule {
            module_id: module_id.to_string(),
        })
    }

    /// Ask the room for the authoritative contents of `module_id`.
    pub fn request_module_state(
        &mut self,
        module_id: &str,
    ) -> Result<CorrelationId, TransportError> {
        self.send(ClientEvent::ModuleStateRequest {
            module_id: module_id.to_string(),
        })
    }

    /// Start tracking a module whose contents the editor already has.
    pub fn open_module(&mut self, module_id: &str, code: &str, revision: u64) {
        self.registry.open(module_id, code, revision);
    }

    /// Stop tracking a module. In-flight operations are abandoned; their
    /// echoes are ignored.
    pub fn close_module(&mut self, module_id: &str) {
        self.registry.close(module_id);
        self.pending
            .retain(|_, p| p.module_id.as_deref() != Some(module_id));
    }

    /// Process one inbound frame.
    pub fn handle_frame(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        match InboundFrame::decode(bytes)? {
            InboundFrame::JoinReply { status, modules } => match status {
                ReplyStatus::Ok => {
                    let mut ids = Vec::with_capacity(modules.len());
                    for module in modules {
                        self.registry
                            .open(&module.module_id, module.code, module.revision);
                        ids.push(module.module_id);
                    }
                    log::info!("joined with {} modules", ids.len());
                    self.emit(LiveEvent::Joined { modules: ids });
                }
                ReplyStatus::Error(reason) => {
                    log::warn!("join rejected: {reason}");
                    self.topic = None;
                    self.emit(LiveEvent::JoinRejected { reason });
                }
            },
            InboundFrame::Reply {
                correlation_id,
                status,
            } => self.handle_reply(correlation_id, status),
            InboundFrame::Broadcast {
                correlation_id,
                event,
            } => {
                let own = correlation_id
                    .as_ref()
                    .is_some_and(|id| self.pending.remove(id).is_some());
                self.handle_broadcast(event, own)?;
            }
            InboundFrame::LeaveReply => self.emit(LiveEvent::Left),
            InboundFrame::Error { payload: None } => {
                log::warn!("connection lost");
                if let Some(mut channel) = self.channel.take() {
                    channel.close();
                }
                self.connection_lost = true;
                self.emit(LiveEvent::ConnectionLoss);
            }
            InboundFrame::Error {
                payload: Some(reason),
            } => {
                log::warn!("channel error: {reason}");
                self.emit(LiveEvent::ChannelError(reason));
            }
        }
        Ok(())
    }

    /// Drain every frame currently waiting on `inbound`.
    ///
    /// Malformed frames are logged and skipped. Returns the number of frames
    /// handled.
    pub fn poll_inbound(&mut self, inbound: &mut mpsc::Receiver<Vec<u8>>) -> usize {
        let mut handled = 0;
        while let Ok(frame) = inbound.try_recv() {
            if let Err(e) = self.handle_frame(&frame) {
                log::warn!("dropping inbound frame: {e}");
            }
            handled += 1;
        }
        handled
    }

    fn handle_reply(&mut self, correlation_id: CorrelationId, status: ReplyStatus) {
        match status {
            // The entry stays until the echo arrives.
            ReplyStatus::Ok => log::trace!("push {correlation_id} accepted"),
            ReplyStatus::Error(reason) => {
                let module_id = self
                    .pending
                    .remove(&correlation_id)
                    .and_then(|p| p.module_id);
                log::warn!("push {correlation_id} rejected: {reason}");
                self.emit(LiveEvent::Rejected {
                    module_id,
                    error: TransportError::RemoteRejection {
                        correlation_id,
                        reason,
                    },
                });
            }
        }
    }

    fn handle_broadcast(&mut self, event: ServerEvent, own: bool) -> Result<(), TransportError> {
        match event {
            ServerEvent::Operation {
                module_id,
                operation,
                revision,
            } => {
                if own {
                    self.acknowledge(&module_id)
                } else {
                    self.apply_remote(module_id, operation, revision)
                }
            }
            ServerEvent::ModuleState {
                module_id,
                code,
                revision,
            } => {
                if self.registry.lookup(&module_id).is_some() {
                    self.registry.get(&module_id).reset(code.clone(), revision);
                } else {
                    self.registry.open(&module_id, code.clone(), revision);
                }
                log::info!("module {module_id} reset to revision {revision}");
                self.emit(LiveEvent::Resynced { module_id, code });
                Ok(())
            }
            event if own => {
                log::trace!("own echo: {event:?}");
                Ok(())
            }
            event => {
                self.emit(LiveEvent::Signal(event));
                Ok(())
            }
        }
    }

    /// Our operation came back: confirm it and send whatever was buffered.
    fn acknowledge(&mut self, module_id: &str) -> Result<(), TransportError> {
        if self.registry.lookup(module_id).is_none() {
            log::debug!("ack for closed module {module_id}");
            return Ok(());
        }
        match self.registry.get(module_id).server_ack() {
            Ok(Some(outgoing)) => self
                .send_operation(module_id, outgoing)
                .map(|_| ())
                .map_err(|e| self.abandon(module_id, e)),
            Ok(None) => Ok(()),
            Err(SyncError::Desynced) => {
                log::debug!("ack for desynced module {module_id} ignored");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn apply_remote(
        &mut self,
        module_id: String,
        operation: Operation,
        revision: u64,
    ) -> Result<(), TransportError> {
        let client = self.registry.get(&module_id);
        if client.revision() != revision {
            log::warn!(
                "module {module_id}: remote revision {revision}, local {}",
                client.revision()
            );
        }

        match client.apply_server(operation) {
            Ok(operation) => {
                self.emit(LiveEvent::ApplyOperation {
                    module_id,
                    operation,
                });
                Ok(())
            }
            Err(SyncError::Desynced) => {
                log::debug!("module {module_id} awaiting snapshot, operation discarded");
                Ok(())
            }
            Err(e) if e.is_desync() => self.recover(&module_id),
            Err(e) => Err(e.into()),
        }
    }

    /// Signal the desync and request a snapshot.
    fn recover(&mut self, module_id: &str) -> Result<(), TransportError> {
        log::warn!("module {module_id} desynced, requesting state");
        self.emit(LiveEvent::Desync {
            module_id: module_id.to_string(),
        });
        self.request_module_state(module_id).map(|_| ())
    }

    /// An operation was committed to the machine but never reached the wire.
    /// No ack can come for it, so the module waits for a snapshot instead.
    fn abandon(&mut self, module_id: &str, err: TransportError) -> TransportError {
        log::warn!("module {module_id}: operation not sent: {err}");
        self.registry.get(module_id).mark_desynced();
        if let Err(e) = self.recover(module_id) {
            log::debug!("state request for {module_id} not sent: {e}");
        }
        err
    }

    fn send_operation(
        &mut self,
        module_id: &str,
        outgoing: Outgoing,
    ) -> Result<CorrelationId, TransportError> {
        let Outgoing {
            revision,
            operation,
        } = outgoing;
        self.send(ClientEvent::Operation {
            module_id: module_id.to_string(),
            operation,
            revision,
        })
    }

    fn push_frame(&mut self, frame: &OutboundFrame) -> Result<(), TransportError> {
        let unavailable = self.unavailable();
        let channel = self.channel.as_mut().ok_or(unavailable)?;
        channel.push(frame.encode()?)
    }

    /// Error for a send with no channel attached.
    fn unavailable(&self) -> TransportError {
        if self.connection_lost {
            TransportError::ConnectionLoss
        } else {
            TransportError::ChannelUnavailable
        }
    }

    fn emit(&self, event: LiveEvent) {
        if self.event_tx.send(event).is_err() {
            log::trace!("event dropped: no receiver");
        }
    }

    pub fn identifier(&self) -> Uuid {
        self.identifier
    }

    /// Index the next push will carry.
    pub fn message_index(&self) -> u64 {
        self.message_index
    }

    /// Pushes not yet echoed or rejected.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Local view of a module, including unacknowledged edits.
    pub fn document(&self, module_id: &str) -> Option<&str> {
        self.registry.lookup(module_id).map(|c| c.document())
    }
}
