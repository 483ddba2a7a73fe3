// Copyright (C) 2026 The parlor authors. This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flume::Sender;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::connection::{ConnectionHandle, Transport};
use crate::errors::SessionError;
use crate::lock;
use crate::messages::{ConnectionId, CorrelationToken, OutboundMessage, Payload, PlayerId, RoomId};
use crate::request::{ReplyDisposition, RequestOutcome, RequestSession, RequestState};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The transport reported the link gone. The record survives for a reconnect.
    Disconnected,
    /// The player was kicked and should be removed from their room.
    Kicked,
    /// No traffic between two heartbeat sweeps. Room logic decides whether to kick.
    Unresponsive,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PlayerEvent {
    pub player: PlayerId,
    pub event: LifecycleEvent,
}

/// Everything the server knows about one admitted player: their connection, their outstanding
/// request, and the flags room logic and the heartbeat sweep look at.
pub struct PlayerSession {
    player: PlayerId,
    config: SessionConfig,
    connection: ConnectionHandle,
    requests: RequestSession,
    room: Mutex<Option<RoomId>>,
    alive: AtomicBool,
    busy: AtomicBool,
    kicked: AtomicBool,
    events: Sender<PlayerEvent>,
}

impl PlayerSession {
    pub fn new(player: PlayerId, config: SessionConfig, events: Sender<PlayerEvent>) -> Self {
        Self {
            player,
            config,
            connection: ConnectionHandle::new(player),
            requests: RequestSession::new(player),
            room: Mutex::new(None),
            alive: AtomicBool::new(false),
            busy: AtomicBool::new(false),
            kicked: AtomicBool::new(false),
            events,
        }
    }

    pub fn player(&self) -> PlayerId {
        self.player
    }

    pub fn room(&self) -> Option<RoomId> {
        *lock(&self.room)
    }

    pub fn set_room(&self, room: Option<RoomId>) {
        *lock(&self.room) = room;
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_attached()
    }

    /// Attach a (re)connected transport. A pending request stays pending and is re-sent under its
    /// original token, so the client can still answer it.
    pub fn attach(&self, transport: Arc<dyn Transport>) -> ConnectionId {
        let connection_id = self.connection.attach(transport);
        self.mark_alive();
        if let Some(announcement) = self.requests.announcement()
            && let Err(e) = self.connection.send(&announcement)
        {
            warn!(player = %self.player, error = %e, "Could not re-announce request");
        }
        info!(player = %self.player, ?connection_id, "Connection attached");
        connection_id
    }

    /// The transport identified by `connection_id` is gone. Reports about a transport that has
    /// since been replaced are ignored. Returns whether anything changed.
    pub fn connection_lost(&self, connection_id: ConnectionId) -> bool {
        if !self.connection.detach_if(connection_id) {
            debug!(player = %self.player, ?connection_id, "Ignoring disconnect of superseded connection");
            return false;
        }
        self.requests.abort_request();
        info!(player = %self.player, ?connection_id, "Player disconnected");
        self.emit(LifecycleEvent::Disconnected);
        true
    }

    /// Abort whatever we are waiting on, drop the connection and flag the record for removal.
    /// Only the first kick does anything.
    pub fn kick(&self) -> bool {
        if self.kicked.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.requests.abort_request();
        self.connection.force_close();
        self.connection.detach();
        self.alive.store(false, Ordering::SeqCst);
        info!(player = %self.player, "Player kicked");
        self.emit(LifecycleEvent::Kicked);
        true
    }

    pub fn is_marked_for_removal(&self) -> bool {
        self.kicked.load(Ordering::SeqCst)
    }

    /// Record inbound traffic.
    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::SeqCst);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Read and reset the liveness flag, as the heartbeat sweep does.
    pub fn take_alive(&self) -> bool {
        self.alive.swap(false, Ordering::SeqCst)
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Reentrancy guard for room logic. Nothing here checks it.
    pub fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::SeqCst);
    }

    /// Set busy only if it was clear. Returns whether this call set it.
    pub fn try_set_busy(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Fire-and-forget. Dropped, not queued, when the player has no connection.
    pub fn notify(&self, command: impl Into<String>, payload: Payload) {
        let message = OutboundMessage::Notification {
            command: command.into(),
            payload,
        };
        match self.connection.send(&message) {
            Ok(()) => {}
            Err(SessionError::NoConnection(_)) => {
                debug!(player = %self.player, command = message.command(), "Dropping notification for offline player");
            }
            Err(e) => {
                warn!(player = %self.player, command = message.command(), error = %e, "Could not deliver notification");
            }
        }
    }

    pub fn prepare_for_request(&self, command: impl Into<String>, payload: Payload) {
        self.requests.prepare_for_request(command, payload);
    }

    /// Issue a request; `None` uses the configured default timeout.
    pub fn do_request(
        &self,
        command: impl Into<String>,
        payload: Payload,
        timeout: Option<Duration>,
    ) -> Result<CorrelationToken, SessionError> {
        let timeout = timeout.unwrap_or(self.config.default_request_timeout);
        self.requests
            .issue_request(command, payload, timeout, &self.connection)
    }

    pub fn issue_prepared(&self, timeout: Option<Duration>) -> Result<CorrelationToken, SessionError> {
        let timeout = timeout.unwrap_or(self.config.default_request_timeout);
        self.requests.issue_prepared(timeout, &self.connection)
    }

    pub fn wait_for_reply(&self, timeout: Option<Duration>) -> Result<RequestOutcome, SessionError> {
        self.requests.wait_for_reply(timeout)
    }

    /// Issue a request and block for its outcome.
    pub fn request(
        &self,
        command: impl Into<String>,
        payload: Payload,
        timeout: Option<Duration>,
    ) -> Result<RequestOutcome, SessionError> {
        self.do_request(command, payload, timeout)?;
        self.wait_for_reply(None)
    }

    pub fn abort_request(&self) -> bool {
        self.requests.abort_request()
    }

    pub fn deliver_reply(&self, token: CorrelationToken, payload: Payload) -> ReplyDisposition {
        self.requests.deliver_reply(token, payload)
    }

    pub fn request_state(&self) -> RequestState {
        self.requests.state()
    }

    pub(crate) fn emit(&self, event: LifecycleEvent) {
        let event = PlayerEvent {
            player: self.player,
            event,
        };
        if self.events.send(event).is_err() {
            debug!(player = %self.player, ?event, "No listener for lifecycle event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingTransport;
    use serde_json::json;
    use std::thread;
    use std::time::Instant;

    fn session() -> (Arc<PlayerSession>, flume::Receiver<PlayerEvent>) {
        let (send, receive) = flume::unbounded();
        let session = PlayerSession::new(PlayerId(11), SessionConfig::default(), send);
        (Arc::new(session), receive)
    }

    #[test]
    fn test_kick_aborts_wait_and_clears_state() {
        let (session, events) = session();
        let transport = RecordingTransport::new();
        session.attach(transport.clone());
        assert!(session.is_alive());
        session
            .do_request("chooseCard", json!(null), Some(Duration::from_secs(5)))
            .unwrap();

        let kicker = {
            let session = session.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(100));
                session.kick()
            })
        };

        let started = Instant::now();
        assert_eq!(session.wait_for_reply(None).unwrap(), RequestOutcome::Aborted);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(kicker.join().unwrap());

        assert!(!session.is_alive());
        assert!(!session.is_connected());
        assert!(transport.is_closed());
        assert!(session.is_marked_for_removal());

        // A second kick changes nothing and emits nothing.
        assert!(!session.kick());
        let kicked: Vec<_> = events.try_iter().collect();
        assert_eq!(
            kicked,
            vec![PlayerEvent {
                player: PlayerId(11),
                event: LifecycleEvent::Kicked
            }]
        );
    }

    #[test]
    fn test_disconnect_mid_wait_aborts_and_keeps_record() {
        let (session, events) = session();
        let connection_id = session.attach(RecordingTransport::new());
        session
            .do_request("confirm", json!(null), Some(Duration::from_secs(5)))
            .unwrap();

        let reporter = {
            let session = session.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                session.connection_lost(connection_id)
            })
        };
        assert_eq!(session.wait_for_reply(None).unwrap(), RequestOutcome::Aborted);
        assert!(reporter.join().unwrap());

        assert!(!session.is_connected());
        assert!(!session.is_marked_for_removal());
        assert_eq!(
            events.try_recv().unwrap().event,
            LifecycleEvent::Disconnected
        );

        // Same report again (or from anyone else) is a no-op.
        assert!(!session.connection_lost(connection_id));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_reconnect_reannounces_pending_request() {
        let (session, events) = session();
        let first = RecordingTransport::new();
        let first_id = session.attach(first.clone());
        let token = session
            .do_request("chooseCard", json!({"hand": [4]}), Some(Duration::from_secs(5)))
            .unwrap();

        let second = RecordingTransport::new();
        session.attach(second.clone());
        assert_eq!(session.request_state(), RequestState::Pending(token));
        assert_eq!(second.last().and_then(|m| m.token()), Some(token));

        // The old transport's late disconnect must not tear down the new one.
        assert!(!session.connection_lost(first_id));
        assert!(session.is_connected());
        assert!(events.try_recv().is_err());

        assert_eq!(session.deliver_reply(token, json!(4)), ReplyDisposition::Accepted);
        assert_eq!(
            session.wait_for_reply(None).unwrap(),
            RequestOutcome::Answered(json!(4))
        );
    }

    #[test]
    fn test_notify_dropped_when_offline() {
        let (session, _events) = session();
        session.notify("turn", json!({"player": 2}));

        let transport = RecordingTransport::new();
        session.attach(transport.clone());
        session.notify("turn", json!({"player": 2}));
        assert_eq!(
            transport.sent(),
            vec![OutboundMessage::Notification {
                command: "turn".to_string(),
                payload: json!({"player": 2}),
            }]
        );
    }

    #[test]
    fn test_request_uses_default_timeout_when_unreachable() {
        let (session, _events) = session();
        // No transport at all: resolves immediately rather than waiting out the default.
        let started = Instant::now();
        assert_eq!(
            session.request("confirm", json!(null), None).unwrap(),
            RequestOutcome::TimedOut
        );
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_liveness_is_read_and_reset() {
        let (session, _events) = session();
        assert!(!session.take_alive());
        session.mark_alive();
        assert!(session.take_alive());
        assert!(!session.take_alive());
    }

    #[test]
    fn test_room_and_busy_flags() {
        let (session, _events) = session();
        assert_eq!(session.room(), None);
        session.set_room(Some(RoomId(3)));
        assert_eq!(session.room(), Some(RoomId(3)));

        assert!(!session.is_busy());
        assert!(session.try_set_busy());
        assert!(!session.try_set_busy());
        assert!(session.is_busy());
        // Busy is advisory only.
        session
            .do_request("q", json!(null), Some(Duration::from_millis(10)))
            .unwrap();
    }

    #[test]
    fn test_only_one_thread_claims_busy() {
        let (session, _events) = session();
        let barrier = Arc::new(std::sync::Barrier::new(8));
        let claimers: Vec<_> = (0..8)
            .map(|_| {
                let session = session.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    session.try_set_busy()
                })
            })
            .collect();
        let claimed = claimers
            .into_iter()
            .map(|claimer| claimer.join().unwrap_or(false))
            .filter(|claimed| *claimed)
            .count();
        assert_eq!(claimed, 1);
    }

    #[test]
    fn test_events_without_listener_are_harmless() {
        let (send, receive) = flume::unbounded();
        drop(receive);
        let session = PlayerSession::new(PlayerId(1), SessionConfig::default(), send);
        assert!(session.kick());
    }
}
