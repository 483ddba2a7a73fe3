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

//! The room every player lands in on login. Arriving players are asked to confirm, on a room-logic
//! thread that blocks on their answer; lifecycle events from every session are handled here too.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use flume::Receiver;
use parlor_session::{
    InboundMessage, LifecycleEvent, PlayerEvent, PlayerId, PlayerRegistry, PlayerSession,
    RequestOutcome, RoomId,
};
use serde_json::json;
use tracing::{debug, error, info, warn};

pub const LOBBY_ROOM: RoomId = RoomId(0);

pub const WELCOME: &str = "welcome";
pub const WELCOME_BACK: &str = "welcome_back";
pub const CONFIRM_JOIN: &str = "confirm_join";
pub const JOINED: &str = "joined";
pub const UNSUPPORTED: &str = "unsupported";

#[derive(Clone, Debug)]
pub struct LobbyConfig {
    /// Deadline for the join confirmation; `None` uses the session default.
    pub confirm_timeout: Option<Duration>,
    pub kick_unresponsive: bool,
}

pub struct Lobby {
    registry: Arc<PlayerRegistry>,
    config: LobbyConfig,
    confirmed: papaya::HashSet<PlayerId>,
}

impl Lobby {
    pub fn new(registry: Arc<PlayerRegistry>, config: LobbyConfig) -> Arc<Self> {
        Arc::new(Self {
            registry,
            config,
            confirmed: papaya::HashSet::new(),
        })
    }

    /// A player's connection was just attached. New arrivals are asked to confirm; players
    /// coming back are greeted, and anyone mid-confirmation already had the question re-sent.
    pub fn arrived(self: &Arc<Self>, session: Arc<PlayerSession>) {
        let player = session.player();
        if self.confirmed.pin().contains(&player) {
            session.notify(WELCOME_BACK, json!({"player": player.0}));
            return;
        }
        if !session.try_set_busy() {
            debug!(%player, "Player reconnected mid-confirmation");
            return;
        }

        let lobby = self.clone();
        let confirming = session.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("parlor-lobby-{}", player.0))
            .spawn(move || lobby.confirm(&confirming));
        if let Err(e) = spawned {
            error!(%player, error = ?e, "Unable to start confirmation thread");
            session.set_busy(false);
        }
    }

    /// Blocks until the player answers, the confirmation times out, or the wait is aborted.
    fn confirm(&self, session: &PlayerSession) {
        let player = session.player();
        session.set_room(Some(LOBBY_ROOM));
        session.prepare_for_request(CONFIRM_JOIN, json!({"player": player.0}));
        session.notify(WELCOME, json!({"player": player.0}));

        let outcome = session
            .issue_prepared(self.config.confirm_timeout)
            .and_then(|_| session.wait_for_reply(None));
        session.set_busy(false);

        match outcome {
            Ok(RequestOutcome::Answered(_)) => {
                self.confirmed.pin().insert(player);
                info!(%player, "Player joined the lobby");
                session.notify(JOINED, json!({"room": LOBBY_ROOM.0}));
            }
            Ok(RequestOutcome::TimedOut) => {
                info!(%player, "Player did not confirm in time");
                session.kick();
            }
            Ok(RequestOutcome::Aborted) => {
                debug!(%player, "Confirmation aborted");
            }
            Err(e) => {
                warn!(%player, error = %e, "Could not ask player to confirm");
            }
        }
    }

    /// Something arrived that was not a reply and that the connection did not consume itself.
    pub fn message(&self, player: PlayerId, message: InboundMessage) {
        debug!(%player, command = %message.command, "Unsupported lobby command");
        if let Some(session) = self.registry.get(player) {
            session.notify(UNSUPPORTED, json!({"command": message.command}));
        }
    }

    pub fn handle_event(&self, event: PlayerEvent) {
        let PlayerEvent { player, event } = event;
        match event {
            LifecycleEvent::Kicked => {
                self.confirmed.pin().remove(&player);
                self.registry.remove_kicked(player);
            }
            LifecycleEvent::Disconnected => {
                info!(%player, "Player disconnected; keeping their seat for a reconnect");
            }
            LifecycleEvent::Unresponsive => {
                if self.config.kick_unresponsive
                    && let Some(session) = self.registry.get(player)
                {
                    warn!(%player, "Kicking unresponsive player");
                    session.kick();
                }
            }
        }
    }

    /// Consume lifecycle events on a background thread until `kill_switch` is set.
    pub fn spawn_event_loop(
        self: &Arc<Self>,
        events: Receiver<PlayerEvent>,
        kill_switch: Arc<AtomicBool>,
    ) -> std::io::Result<JoinHandle<()>> {
        let lobby = self.clone();
        std::thread::Builder::new()
            .name("parlor-lobby-events".to_string())
            .spawn(move || {
                loop {
                    if kill_switch.load(Ordering::Relaxed) {
                        info!("Lobby event loop exiting.");
                        return;
                    }
                    match events.recv_timeout(Duration::from_millis(500)) {
                        Ok(event) => lobby.handle_event(event),
                        Err(flume::RecvTimeoutError::Timeout) => continue,
                        Err(flume::RecvTimeoutError::Disconnected) => return,
                    }
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_session::{OutboundMessage, SessionConfig, Transport, TransportError};

    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct NullTransport;

    /// Counts the requests it is asked to send.
    #[derive(Default)]
    struct CountingTransport {
        requests: AtomicUsize,
    }

    impl Transport for CountingTransport {
        fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
            if message.token().is_some() {
                self.requests.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }

        fn close(&self) {}
    }

    impl Transport for NullTransport {
        fn send(&self, _message: &OutboundMessage) -> Result<(), TransportError> {
            Ok(())
        }

        fn close(&self) {}
    }

    fn lobby(kick_unresponsive: bool) -> (Arc<Lobby>, Arc<PlayerRegistry>, Receiver<PlayerEvent>) {
        let (registry, events) = PlayerRegistry::new(SessionConfig::default());
        let lobby = Lobby::new(
            registry.clone(),
            LobbyConfig {
                confirm_timeout: Some(Duration::from_millis(100)),
                kick_unresponsive,
            },
        );
        (lobby, registry, events)
    }

    #[test]
    fn test_unresponsive_player_kicked_only_when_configured() {
        let (lenient, registry, events) = lobby(false);
        let session = registry.admit(PlayerId(1));
        session.attach(Arc::new(NullTransport));
        lenient.handle_event(PlayerEvent {
            player: PlayerId(1),
            event: LifecycleEvent::Unresponsive,
        });
        assert!(session.is_connected());

        let (strict, registry, _) = lobby(true);
        let session = registry.admit(PlayerId(1));
        session.attach(Arc::new(NullTransport));
        strict.handle_event(PlayerEvent {
            player: PlayerId(1),
            event: LifecycleEvent::Unresponsive,
        });
        assert!(session.is_marked_for_removal());
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_kicked_player_is_removed() {
        let (lobby, registry, events) = lobby(false);
        registry.admit(PlayerId(2)).kick();
        lobby.handle_event(events.try_recv().unwrap());
        assert!(registry.get(PlayerId(2)).is_none());
    }

    #[test]
    fn test_unconfirmed_player_times_out_and_is_kicked() {
        let (lobby, registry, events) = lobby(false);
        let session = registry.admit(PlayerId(3));
        session.attach(Arc::new(NullTransport));
        lobby.arrived(session.clone());

        let event = events.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(event.event, LifecycleEvent::Kicked);
        assert!(!session.is_busy());
        assert_eq!(session.room(), Some(LOBBY_ROOM));
    }

    #[test]
    fn test_simultaneous_arrivals_confirm_once() {
        let (lobby, registry, events) = lobby(false);
        let session = registry.admit(PlayerId(4));
        let transport = Arc::new(CountingTransport::default());
        session.attach(transport.clone());

        let arrivals: Vec<_> = (0..4)
            .map(|_| {
                let lobby = lobby.clone();
                let session = session.clone();
                std::thread::spawn(move || lobby.arrived(session))
            })
            .collect();
        for arrival in arrivals {
            arrival.join().unwrap();
        }

        let event = events.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(event.event, LifecycleEvent::Kicked);
        assert_eq!(transport.requests.load(Ordering::SeqCst), 1);
    }
}
