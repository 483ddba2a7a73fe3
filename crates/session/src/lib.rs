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

//! Per-player sessions for turn-based room logic.
//!
//! Room logic runs on ordinary threads and asks connected players questions by issuing a request
//! and blocking until it is answered, times out, or is aborted. The network side hands replies,
//! heartbeats and disconnects in from other threads. Everything here is per-player: no operation
//! on one player's session ever waits on another's.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod config;
pub mod connection;
pub mod errors;
pub mod messages;
pub mod player;
pub mod registry;
pub mod request;

#[cfg(test)]
mod testing;

pub use config::SessionConfig;
pub use connection::{ConnectionHandle, Transport};
pub use errors::{SessionError, TransportError};
pub use messages::{
    ConnectionId, CorrelationToken, InboundMessage, OutboundMessage, Payload, PlayerId, RoomId,
};
pub use player::{LifecycleEvent, PlayerEvent, PlayerSession};
pub use registry::{PlayerRegistry, Routed};
pub use request::{ReplyDisposition, RequestOutcome, RequestSession, RequestState};

/// Guarded mutations in this crate complete in a single step, so a poisoned lock still holds
/// consistent state.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
