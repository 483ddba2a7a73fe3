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

use thiserror::Error;

use crate::messages::{CorrelationToken, PlayerId};

/// Failures surfaced to callers of the session layer.
///
/// Timeouts and aborts are not errors; they are `RequestOutcome` variants.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("A request ({0}) is already outstanding for this player")]
    AlreadyPending(CorrelationToken),
    #[error("No connection for player {0}")]
    NoConnection(PlayerId),
    #[error("Could not deliver session message: {0}")]
    Delivery(#[from] TransportError),
    #[error("No request is outstanding to wait on")]
    NoOutstandingRequest,
    #[error("No request has been prepared")]
    NothingPrepared,
    #[error("Unknown player {0}")]
    UnknownPlayer(PlayerId),
}

/// Failures reported by a transport implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Transport is closed")]
    Closed,
    #[error("Could not encode message: {0}")]
    Encode(String),
}
