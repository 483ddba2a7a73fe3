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

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parlor_session::PlayerRegistry;
use parlor_tcp_host::args::Args;
use parlor_tcp_host::listen::{accept_loop, bind};
use parlor_tcp_host::lobby::Lobby;
use parlor_tcp_host::logging::init_tracing;
use tokio::select;
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), eyre::Report> {
    color_eyre::install()?;
    let args = Args::load()?;
    init_tracing(args.debug)?;

    let kill_switch = Arc::new(AtomicBool::new(false));
    let (registry, events) = PlayerRegistry::new(args.session_config());
    let lobby = Lobby::new(registry.clone(), args.lobby_config());
    let heartbeat = registry.spawn_heartbeat(kill_switch.clone())?;
    let lobby_events = lobby.spawn_event_loop(events, kill_switch.clone())?;

    let mut hup_signal = signal(SignalKind::hangup())?;
    let mut stop_signal = signal(SignalKind::interrupt())?;

    let listener = bind(&args.listen_address).await?;
    info!("Host started, listening @ {}...", args.listen_address);
    select! {
        result = accept_loop(listener, registry.clone(), lobby) => {
            result?;
        }
        _ = hup_signal.recv() => {
            info!("HUP received, stopping...");
        },
        _ = stop_signal.recv() => {
            info!("STOP received, stopping...");
        }
    }

    kill_switch.store(true, Ordering::SeqCst);
    for player in registry.players() {
        registry.remove(player);
    }
    let _ = heartbeat.join();
    let _ = lobby_events.join();
    info!("Done.");

    Ok(())
}
