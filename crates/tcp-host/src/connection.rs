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

//! One TCP connection: newline-delimited JSON in both directions. The first line must be a login;
//! after that every line is routed to the player's session.

use std::net::SocketAddr;
use std::sync::Arc;

use eyre::bail;
use futures_util::{SinkExt, Stream, StreamExt};
use parlor_session::registry::PONG_COMMAND;
use parlor_session::{
    InboundMessage, OutboundMessage, PlayerId, PlayerRegistry, PlayerSession, ReplyDisposition,
    Routed, Transport, TransportError,
};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::select;
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::{debug, info, warn};

use crate::lobby::Lobby;

pub const LOGIN_COMMAND: &str = "login";
pub const ERROR_COMMAND: &str = "error";

const MAX_LINE_LENGTH: usize = 64 * 1024;

/// What the writer task is asked to do.
#[derive(Debug)]
pub enum Frame {
    Line(String),
    Close,
}

/// The session-side view of a TCP connection. Sends are queued for the connection's writer task,
/// so they never block the calling thread.
pub struct TcpTransport {
    frames: UnboundedSender<Frame>,
}

impl Transport for TcpTransport {
    fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        let line =
            serde_json::to_string(message).map_err(|e| TransportError::Encode(e.to_string()))?;
        self.frames
            .send(Frame::Line(line))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        let _ = self.frames.send(Frame::Close);
    }
}

#[derive(Deserialize)]
struct Login {
    player: u64,
}

async fn login<S>(lines: &mut S) -> Result<PlayerId, eyre::Report>
where
    S: Stream<Item = Result<String, LinesCodecError>> + Unpin,
{
    let Some(line) = lines.next().await else {
        bail!("connection closed before login");
    };
    let message: InboundMessage = serde_json::from_str(&line?)?;
    if message.command != LOGIN_COMMAND {
        bail!("expected {LOGIN_COMMAND}, got {}", message.command);
    }
    let Login { player } = serde_json::from_value(message.payload)?;
    Ok(PlayerId(player))
}

/// Serve `stream` until either side closes it.
pub async fn serve(
    stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<PlayerRegistry>,
    lobby: Arc<Lobby>,
) {
    let framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    let (mut sink, mut lines) = framed.split();
    let (frames, mut outgoing) = unbounded_channel();
    let transport = Arc::new(TcpTransport { frames });

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = outgoing.recv().await {
            match frame {
                Frame::Line(line) => {
                    if let Err(e) = sink.send(line).await {
                        debug!(?peer, error = %e, "Write failed");
                        break;
                    }
                }
                Frame::Close => break,
            }
        }
        let _ = sink.close().await;
    });

    let player = match login(&mut lines).await {
        Ok(player) => player,
        Err(e) => {
            warn!(?peer, error = %e, "Login failed");
            let _ = transport.send(&OutboundMessage::Notification {
                command: ERROR_COMMAND.to_string(),
                payload: json!({"reason": e.to_string()}),
            });
            transport.close();
            let _ = writer.await;
            return;
        }
    };

    let session = registry.admit(player);
    let connection_id = session.attach(transport);
    info!(%player, ?peer, "Player logged in");
    lobby.arrived(session.clone());

    loop {
        select! {
            line = lines.next() => match line {
                Some(Ok(line)) => handle_line(&registry, &lobby, &session, &line),
                Some(Err(e)) => {
                    warn!(%player, error = %e, "Read failed");
                    break;
                }
                None => {
                    debug!(%player, "Client closed connection");
                    break;
                }
            },
            _ = &mut writer => {
                debug!(%player, "Connection closed by server");
                break;
            }
        }
    }

    session.connection_lost(connection_id);
    writer.abort();
}

fn handle_line(registry: &PlayerRegistry, lobby: &Lobby, session: &PlayerSession, line: &str) {
    let player = session.player();
    let message: InboundMessage = match serde_json::from_str(line) {
        Ok(message) => message,
        Err(e) => {
            session.mark_alive();
            debug!(%player, error = %e, "Malformed message");
            session.notify(ERROR_COMMAND, json!({"reason": e.to_string()}));
            return;
        }
    };
    match registry.route(player, message) {
        Ok(Routed::Reply(ReplyDisposition::Accepted)) => {}
        Ok(Routed::Reply(ReplyDisposition::Stale)) => {
            debug!(%player, "Dropped stale reply");
        }
        Ok(Routed::Unhandled(message)) if message.command == PONG_COMMAND => {}
        Ok(Routed::Unhandled(message)) => lobby.message(player, message),
        Err(e) => warn!(%player, error = %e, "Unable to route message"),
    }
}
