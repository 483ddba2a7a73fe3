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

//! The process-wide table of admitted players, which routes inbound traffic to the right session
//! and drives the heartbeat.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use flume::{Receiver, Sender};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::errors::SessionError;
use crate::lock;
use crate::messages::{InboundMessage, Payload, PlayerId};
use crate::player::{LifecycleEvent, PlayerEvent, PlayerSession};
use crate::request::ReplyDisposition;

/// Sent to every connected player on each sweep so that idle clients have something to answer.
pub const PING_COMMAND: &str = "ping";
/// What clients answer a ping with. Carries no meaning beyond being traffic.
pub const PONG_COMMAND: &str = "pong";

/// Where an inbound message ended up.
#[derive(Debug, PartialEq)]
pub enum Routed {
    /// It carried a correlation token and was offered to the player's request session.
    Reply(ReplyDisposition),
    /// Not a reply; room logic should look at it.
    Unhandled(InboundMessage),
}

pub struct PlayerRegistry {
    config: SessionConfig,
    sessions: papaya::HashMap<PlayerId, Arc<PlayerSession>>,
    /// Serializes admission and removal; lookups go straight to the map.
    admission: Mutex<()>,
    events: Sender<PlayerEvent>,
}

impl PlayerRegistry {
    /// Returns the registry and the receiving end of every admitted player's lifecycle events.
    pub fn new(config: SessionConfig) -> (Arc<Self>, Receiver<PlayerEvent>) {
        let (events, receive) = flume::unbounded();
        let registry = Self {
            config,
            sessions: papaya::HashMap::new(),
            admission: Mutex::new(()),
            events,
        };
        (Arc::new(registry), receive)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Return the player's record, creating one if there is none or the old one was kicked.
    pub fn admit(&self, player: PlayerId) -> Arc<PlayerSession> {
        let _admission = lock(&self.admission);
        let sessions = self.sessions.pin();
        if let Some(existing) = sessions.get(&player)
            && !existing.is_marked_for_removal()
        {
            return existing.clone();
        }
        let session = Arc::new(PlayerSession::new(
            player,
            self.config.clone(),
            self.events.clone(),
        ));
        sessions.insert(player, session.clone());
        info!(%player, "Admitted player");
        session
    }

    pub fn get(&self, player: PlayerId) -> Option<Arc<PlayerSession>> {
        self.sessions.pin().get(&player).cloned()
    }

    /// Drop the player from the active set. Anything still waiting on them is aborted.
    pub fn remove(&self, player: PlayerId) -> Option<Arc<PlayerSession>> {
        let _admission = lock(&self.admission);
        let removed = self.sessions.pin().remove(&player).cloned();
        if let Some(session) = &removed {
            session.abort_request();
            info!(%player, "Removed player");
        }
        removed
    }

    /// Remove the player only if their current record has been kicked, so that a record admitted
    /// after the kick survives a late cleanup.
    pub fn remove_kicked(&self, player: PlayerId) -> bool {
        let _admission = lock(&self.admission);
        let sessions = self.sessions.pin();
        let kicked = sessions
            .get(&player)
            .is_some_and(|session| session.is_marked_for_removal());
        if kicked {
            sessions.remove(&player);
            info!(%player, "Removed kicked player");
        }
        kicked
    }

    pub fn players(&self) -> Vec<PlayerId> {
        self.sessions.pin().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hand an inbound message to `player`'s session. Any message counts as a sign of life;
    /// token-tagged ones are offered as replies, the rest are returned for room logic.
    pub fn route(&self, player: PlayerId, message: InboundMessage) -> Result<Routed, SessionError> {
        let Some(session) = self.get(player) else {
            warn!(%player, command = %message.command, "Message for unknown player");
            return Err(SessionError::UnknownPlayer(player));
        };
        session.mark_alive();
        match message.token {
            Some(token) => Ok(Routed::Reply(session.deliver_reply(token, message.payload))),
            None => Ok(Routed::Unhandled(message)),
        }
    }

    /// Read and reset every connected player's liveness flag, reporting the ones that have been
    /// silent since the last sweep, then ping everyone.
    pub fn heartbeat_sweep(&self) -> Vec<PlayerId> {
        let sessions: Vec<_> = self.sessions.pin().values().cloned().collect();
        let mut unresponsive = vec![];
        for session in sessions {
            if !session.is_connected() || session.is_marked_for_removal() {
                continue;
            }
            if !session.take_alive() {
                debug!(player = %session.player(), "No traffic since last sweep");
                unresponsive.push(session.player());
                session.emit(LifecycleEvent::Unresponsive);
            }
            session.notify(PING_COMMAND, Payload::Null);
        }
        unresponsive
    }

    /// Run `heartbeat_sweep` every `heartbeat_interval` on a background thread until
    /// `kill_switch` is set.
    pub fn spawn_heartbeat(
        self: &Arc<Self>,
        kill_switch: Arc<AtomicBool>,
    ) -> std::io::Result<JoinHandle<()>> {
        let registry = self.clone();
        let interval = self.config.heartbeat_interval;
        std::thread::Builder::new()
            .name("parlor-heartbeat".to_string())
            .spawn(move || {
                loop {
                    std::thread::sleep(interval);
                    if kill_switch.load(Ordering::Relaxed) {
                        info!("Heartbeat thread exiting.");
                        break;
                    }
                    let unresponsive = registry.heartbeat_sweep();
                    if !unresponsive.is_empty() {
                        debug!(?unresponsive, "Unresponsive players");
                    }
                }
            })
    }
}
