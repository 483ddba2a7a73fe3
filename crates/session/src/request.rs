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

//! The blocking request/reply protocol for a single player.
//!
//! A request moves `Idle -> Pending -> {Answered | TimedOut | Aborted} -> Idle`. The room-logic
//! thread issues a request and then blocks in `wait_for_reply`; the network side resolves it via
//! `deliver_reply`, and anything (disconnect, kick, room logic) may resolve it via
//! `abort_request`. Each request gets its own single-shot channel, so the waiter is woken at most
//! once no matter how many resolvers race.
//!
//! There are no timer threads. Every request carries a deadline which is checked under the
//! session lock: once it has passed, replies are stale even if the waiter has not yet woken up to
//! notice.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::connection::ConnectionHandle;
use crate::errors::SessionError;
use crate::lock;
use crate::messages::{CorrelationToken, OutboundMessage, Payload, PlayerId};

/// How a request ended, as seen by the thread that waited on it.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    Answered(Payload),
    /// The deadline passed with no acceptable reply.
    TimedOut,
    /// Someone told us to stop caring: disconnect, kick, or room logic.
    Aborted,
}

impl RequestOutcome {
    pub fn answer(self) -> Option<Payload> {
        match self {
            RequestOutcome::Answered(payload) => Some(payload),
            _ => None,
        }
    }
}

/// What happened to a reply handed to `deliver_reply`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReplyDisposition {
    Accepted,
    /// Duplicate, late, or for a request that is no longer outstanding.
    Stale,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    Pending(CorrelationToken),
}

struct LiveRequest {
    token: CorrelationToken,
    command: String,
    payload: Payload,
    deadline: Instant,
    resolve: oneshot::Sender<RequestOutcome>,
}

impl LiveRequest {
    fn resolve(self, outcome: RequestOutcome) {
        // The receiver only goes away if nobody is ever going to wait, which is fine.
        let _ = self.resolve.send(outcome);
    }
}

/// The receiving half of the live (or most recently resolved) request, until a waiter claims it.
struct Waiter {
    token: CorrelationToken,
    receive: oneshot::Receiver<RequestOutcome>,
}

/// Longest a deadline may sit in the future. Longer timeouts are clamped to it.
const MAX_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 24 * 365);

fn deadline_after(now: Instant, timeout: Duration) -> Instant {
    now + timeout.min(MAX_TIMEOUT)
}

#[derive(Default)]
struct Slots {
    live: Option<LiveRequest>,
    waiter: Option<Waiter>,
    staged: Option<(String, Payload)>,
}

impl Slots {
    /// Resolve a live request whose deadline has passed without anyone waiting on it.
    fn reap_expired(&mut self, now: Instant) {
        if let Some(live) = self.live.take_if(|live| live.deadline <= now) {
            debug!(token = %live.token, "Reaping expired request nobody waited on");
            live.resolve(RequestOutcome::TimedOut);
        }
    }
}

/// Owns at most one outstanding request for a player.
pub struct RequestSession {
    player: PlayerId,
    slots: Mutex<Slots>,
}

impl RequestSession {
    pub fn new(player: PlayerId) -> Self {
        Self {
            player,
            slots: Mutex::new(Slots::default()),
        }
    }

    pub fn state(&self) -> RequestState {
        match &lock(&self.slots).live {
            Some(live) => RequestState::Pending(live.token),
            None => RequestState::Idle,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state(), RequestState::Pending(_))
    }

    /// Stage a request without sending it or starting its deadline, so that room logic can
    /// announce what is coming before it starts counting down.
    pub fn prepare_for_request(&self, command: impl Into<String>, payload: Payload) {
        lock(&self.slots).staged = Some((command.into(), payload));
    }

    /// Issue a new request and send it to the client.
    ///
    /// Overlapping requests are rejected with `AlreadyPending`; the caller must wait for, or abort,
    /// the outstanding one first. If the client cannot be reached the request is still issued, but
    /// with its deadline already passed, so the wait resolves at once as `TimedOut` rather than
    /// blocking on an unreachable player.
    pub fn issue_request(
        &self,
        command: impl Into<String>,
        payload: Payload,
        timeout: Duration,
        connection: &ConnectionHandle,
    ) -> Result<CorrelationToken, SessionError> {
        let command = command.into();
        let (token, message) = {
            let mut slots = lock(&self.slots);
            let now = Instant::now();
            slots.reap_expired(now);
            if let Some(live) = &slots.live {
                return Err(SessionError::AlreadyPending(live.token));
            }

            let token = CorrelationToken::mint();
            let (resolve, receive) = oneshot::channel();
            let message = OutboundMessage::Request {
                command: command.clone(),
                token,
                payload: payload.clone(),
            };
            slots.live = Some(LiveRequest {
                token,
                command,
                payload,
                deadline: deadline_after(now, timeout),
                resolve,
            });
            slots.waiter = Some(Waiter { token, receive });
            slots.staged = None;
            (token, message)
        };

        match connection.send(&message) {
            Ok(()) => {
                debug!(player = %self.player, %token, command = message.command(), ?timeout, "Issued request");
            }
            Err(e) => {
                warn!(player = %self.player, %token, error = %e, "Could not send request; it will time out immediately");
                let mut slots = lock(&self.slots);
                if let Some(live) = slots.live.as_mut()
                    && live.token == token
                {
                    live.deadline = Instant::now();
                }
            }
        }
        Ok(token)
    }

    /// Issue whatever `prepare_for_request` staged.
    pub fn issue_prepared(
        &self,
        timeout: Duration,
        connection: &ConnectionHandle,
    ) -> Result<CorrelationToken, SessionError> {
        let Some((command, payload)) = lock(&self.slots).staged.clone() else {
            return Err(SessionError::NothingPrepared);
        };
        self.issue_request(command, payload, timeout, connection)
    }

    /// Block until the outstanding request is answered, times out, or is aborted.
    ///
    /// `timeout`, if given, can only shorten the request's own deadline, and it does so for the
    /// request itself: a reply arriving after it has passed is stale. Only one thread may wait on
    /// a given request; anyone else gets `NoOutstandingRequest`.
    pub fn wait_for_reply(&self, timeout: Option<Duration>) -> Result<RequestOutcome, SessionError> {
        let (token, receive, deadline) = {
            let mut slots = lock(&self.slots);
            let Some(Waiter { token, receive }) = slots.waiter.take() else {
                return Err(SessionError::NoOutstandingRequest);
            };
            let deadline = match slots.live.as_mut() {
                Some(live) if live.token == token => {
                    if let Some(timeout) = timeout {
                        let tightened = deadline_after(Instant::now(), timeout);
                        live.deadline = live.deadline.min(tightened);
                    }
                    Some(live.deadline)
                }
                _ => None,
            };
            (token, receive, deadline)
        };

        // Resolved before we got here. The resolver has already taken the request out of `live`,
        // so the outcome is in the channel or about to be.
        let Some(deadline) = deadline else {
            return Ok(receive.recv().unwrap_or(RequestOutcome::Aborted));
        };

        trace!(player = %self.player, %token, "Waiting for reply");
        let outcome = match receive.recv_deadline(deadline) {
            Ok(outcome) => outcome,
            Err(oneshot::RecvTimeoutError::Timeout) => self.expire(token, receive),
            Err(oneshot::RecvTimeoutError::Disconnected) => RequestOutcome::Aborted,
        };
        debug!(player = %self.player, %token, ?outcome, "Request resolved");
        Ok(outcome)
    }

    /// Our deadline passed: clear the request if it is still ours, making the timeout final.
    fn expire(&self, token: CorrelationToken, receive: oneshot::Receiver<RequestOutcome>) -> RequestOutcome {
        let mut slots = lock(&self.slots);
        if slots.live.take_if(|live| live.token == token).is_some() {
            return RequestOutcome::TimedOut;
        }
        drop(slots);
        // A reply or an abort took it between the deadline passing and us taking the lock; its
        // outcome is on the way.
        receive.recv().unwrap_or(RequestOutcome::Aborted)
    }

    /// Offer a reply from the client. Only a reply carrying the live token, arriving before the
    /// deadline, is accepted; everything else is discarded.
    pub fn deliver_reply(&self, token: CorrelationToken, payload: Payload) -> ReplyDisposition {
        let now = Instant::now();
        let accepted = lock(&self.slots)
            .live
            .take_if(|live| live.token == token && now < live.deadline);
        match accepted {
            Some(live) => {
                live.resolve(RequestOutcome::Answered(payload));
                ReplyDisposition::Accepted
            }
            None => {
                debug!(player = %self.player, %token, "Discarding stale reply");
                ReplyDisposition::Stale
            }
        }
    }

    /// Resolve the outstanding request, if any, as `Aborted`. Returns whether there was one.
    pub fn abort_request(&self) -> bool {
        let Some(live) = lock(&self.slots).live.take() else {
            return false;
        };
        debug!(player = %self.player, token = %live.token, "Aborting request");
        live.resolve(RequestOutcome::Aborted);
        true
    }

    /// What to re-send after a reconnect: the outstanding request with its original token, or
    /// else the staged one as a heads-up.
    pub fn announcement(&self) -> Option<OutboundMessage> {
        let slots = lock(&self.slots);
        if let Some(live) = &slots.live {
            return Some(OutboundMessage::Request {
                command: live.command.clone(),
                token: live.token,
                payload: live.payload.clone(),
            });
        }
        slots
            .staged
            .as_ref()
            .map(|(command, payload)| OutboundMessage::Notification {
                command: command.clone(),
                payload: payload.clone(),
            })
    }
}
