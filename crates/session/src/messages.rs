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

//! Identifiers and the already-decoded message shapes exchanged with a transport.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque payload carried by requests, replies and notifications.
pub type Payload = serde_json::Value;

/// Stable identity of a player, owned by the session record for its whole life.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub u64);

impl Display for PlayerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Non-owning index of a room in whatever registry owns rooms.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomId(pub u64);

/// Identifies one attachment of a transport to a session; a reconnect mints a new one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Ties a reply to the one request it answers.
///
/// Tokens are v7 UUIDs, so tokens minted later in the process sort after earlier ones. A token
/// is live only while its request is outstanding; once resolved it is stale forever.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationToken(Uuid);

impl CorrelationToken {
    pub fn mint() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Display for CorrelationToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message from a client, as handed to us by the router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub command: String,
    /// Present only when the client is replying to a request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<CorrelationToken>,
    #[serde(default)]
    pub payload: Payload,
}

impl InboundMessage {
    pub fn new(command: impl Into<String>, payload: Payload) -> Self {
        Self {
            command: command.into(),
            token: None,
            payload,
        }
    }

    pub fn reply(command: impl Into<String>, token: CorrelationToken, payload: Payload) -> Self {
        Self {
            command: command.into(),
            token: Some(token),
            payload,
        }
    }
}

/// A message to a client. Requests expect a correlated reply; notifications do not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    Request {
        command: String,
        token: CorrelationToken,
        payload: Payload,
    },
    Notification {
        command: String,
        payload: Payload,
    },
}

impl OutboundMessage {
    pub fn command(&self) -> &str {
        match self {
            OutboundMessage::Request { command, .. } => command,
            OutboundMessage::Notification { command, .. } => command,
        }
    }

    pub fn token(&self) -> Option<CorrelationToken> {
        match self {
            OutboundMessage::Request { token, .. } => Some(*token),
            OutboundMessage::Notification { .. } => None,
        }
    }
}
