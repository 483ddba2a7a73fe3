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

use std::net::SocketAddr;
use std::sync::Arc;

use eyre::eyre;
use parlor_session::PlayerRegistry;
use tokio::net::TcpListener;
use tracing::info;

use crate::connection::serve;
use crate::lobby::Lobby;

pub async fn bind(address: &str) -> Result<TcpListener, eyre::Report> {
    let sockaddr = address
        .parse::<SocketAddr>()
        .map_err(|e| eyre!("Invalid listen address {address}: {e}"))?;
    let listener = TcpListener::bind(sockaddr).await?;
    info!("Listening @ {}", listener.local_addr()?);
    Ok(listener)
}

/// Accept connections forever, one task per connection. Returns only if accepting fails.
pub async fn accept_loop(
    listener: TcpListener,
    registry: Arc<PlayerRegistry>,
    lobby: Arc<Lobby>,
) -> Result<(), eyre::Report> {
    loop {
        let (stream, peer) = listener.accept().await?;
        info!(?peer, "Accepted connection");
        tokio::spawn(serve(stream, peer, registry.clone(), lobby.clone()));
    }
}
