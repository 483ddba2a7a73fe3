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

use std::sync::{Arc, Mutex};

use crate::errors::{SessionError, TransportError};
use crate::lock;
use crate::messages::{ConnectionId, OutboundMessage, PlayerId};

/// The live link to one client, as provided by whatever host owns the socket.
///
/// Implementations own framing, encoding and delivery guarantees. Both calls must be cheap and
/// non-blocking: they are made from room-logic threads and from the network side alike.
pub trait Transport: Send + Sync {
    /// Queue a message for delivery to the client.
    fn send(&self, message: &OutboundMessage) -> Result<(), TransportError>;

    /// Ask the host to terminate the underlying link.
    fn close(&self);
}

/// A replaceable reference to the transport for one player. Absent while the player is
/// reconnecting.
pub struct ConnectionHandle {
    player: PlayerId,
    current: Mutex<Option<(ConnectionId, Arc<dyn Transport>)>>,
}

impl ConnectionHandle {
    pub fn new(player: PlayerId) -> Self {
        Self {
            player,
            current: Mutex::new(None),
        }
    }

    /// Attach `transport`, replacing (and releasing, without telling it) whatever was there.
    pub fn attach(&self, transport: Arc<dyn Transport>) -> ConnectionId {
        let connection_id = ConnectionId::new();
        let previous = lock(&self.current).replace((connection_id, transport));
        if let Some((previous_id, _)) = previous {
            tracing::debug!(player = %self.player, ?previous_id, ?connection_id, "Replaced connection");
        }
        connection_id
    }

    /// Clear the reference. Returns whether a transport was attached.
    pub fn detach(&self) -> bool {
        lock(&self.current).take().is_some()
    }

    /// Clear the reference only if `connection_id` is still the attached transport.
    pub fn detach_if(&self, connection_id: ConnectionId) -> bool {
        let mut current = lock(&self.current);
        match current.as_ref() {
            Some((attached, _)) if *attached == connection_id => {
                *current = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_attached(&self) -> bool {
        lock(&self.current).is_some()
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        lock(&self.current).as_ref().map(|(id, _)| *id)
    }

    /// Hand `message` to the attached transport. The caller decides whether to queue or drop on
    /// `NoConnection`.
    pub fn send(&self, message: &OutboundMessage) -> Result<(), SessionError> {
        // Clone out so the transport is never called with our lock held.
        let Some(transport) = self.transport() else {
            return Err(SessionError::NoConnection(self.player));
        };
        transport.send(message)?;
        Ok(())
    }

    /// Request that the transport layer terminate the link. The reference itself is kept.
    pub fn force_close(&self) {
        if let Some(transport) = self.transport() {
            transport.close();
        }
    }

    fn transport(&self) -> Option<Arc<dyn Transport>> {
        lock(&self.current)
            .as_ref()
            .map(|(_, transport)| transport.clone())
    }
}
