//  Copyright 2024. The PBX Switch Project
//
//  Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
//  following conditions are met:
//
//  1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
//  disclaimer.
//
//  2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
//  following disclaimer in the documentation and/or other materials provided with the distribution.
//
//  3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
//  products derived from this software without specific prior written permission.
//
//  THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
//  INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
//  DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
//  SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
//  SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
//  WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
//  USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! The TCP listen/accept loop and the per-connection service adapter.

use std::sync::Arc;

use async_trait::async_trait;
use pbx_core::{
    coordinator::{self, Outcome},
    error::PbxError,
    registry::Registry,
    sink::ByteSink,
    tu::Tu,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::Mutex,
};
use tracing::{debug, info, instrument, warn};

use crate::{error::ExitError, protocol, shutdown::ShutdownSignal};

const LOG_TARGET: &str = "pbx_node::server";

/// A [`ByteSink`] backed by the write half of a TCP connection.
///
/// The write half is behind its own lock because `shutdown` can race a notifier write from
/// the connection's own reader task; `write_line` and `shutdown` never interleave their
/// bytes on the wire as a result.
struct TcpSink {
    writer: Mutex<tokio::net::tcp::OwnedWriteHalf>,
}

#[async_trait]
impl ByteSink for TcpSink {
    async fn write_line(&self, line: &str) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await
    }

    async fn shutdown(&self) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.shutdown().await
    }
}

/// Accept connections until `shutdown` fires, then wait for every registered extension to
/// unregister before returning.
pub async fn run(listener: TcpListener, registry: Arc<Registry>, mut shutdown: ShutdownSignal) -> Result<(), ExitError> {
    info!(target: LOG_TARGET, "accepting inbound connections");
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (socket, peer_addr) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        warn!(target: LOG_TARGET, %err, "failed to accept connection");
                        continue;
                    },
                };
                debug!(target: LOG_TARGET, %peer_addr, "accepted connection");
                let registry = registry.clone();
                let conn_shutdown = shutdown.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_connection(socket, registry, conn_shutdown).await {
                        warn!(target: LOG_TARGET, %peer_addr, %err, "connection ended with an error");
                    }
                });
            },
            _ = shutdown.wait() => {
                info!(target: LOG_TARGET, "shutdown signal received, no longer accepting connections");
                break;
            },
        }
    }
    registry.shutdown().await;
    Ok(())
}

#[instrument(target = "pbx_node::server", skip(socket, registry, shutdown))]
async fn handle_connection(
    socket: TcpStream,
    registry: Arc<Registry>,
    mut shutdown: ShutdownSignal,
) -> Result<(), PbxError> {
    let (read_half, write_half) = socket.into_split();
    let sink: Arc<dyn ByteSink> = Arc::new(TcpSink {
        writer: Mutex::new(write_half),
    });
    let tu = registry.register(sink).await?;
    let ext = tu.ext();
    debug!(target: LOG_TARGET, ext, "registered");

    let mut lines = BufReader::new(read_half).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = shutdown.wait() => break,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                warn!(target: LOG_TARGET, ext, %err, "read error");
                break;
            },
        };
        if let Err(err) = dispatch(&registry, &tu, &line).await {
            warn!(target: LOG_TARGET, ext, %err, "dispatch failed, tearing down connection");
            break;
        }
    }

    registry.unregister(&tu).await.ok();
    debug!(target: LOG_TARGET, ext, "unregistered");
    Ok(())
}

async fn dispatch(registry: &Registry, tu: &Arc<Tu>, line: &str) -> Result<Outcome, PbxError> {
    match protocol::parse(line) {
        protocol::Command::Pickup => coordinator::pickup(registry, tu).await,
        protocol::Command::Hangup => coordinator::hangup(registry, tu).await,
        protocol::Command::Dial(target) => coordinator::dial(registry, tu, target).await,
        protocol::Command::Chat(text) => coordinator::chat(registry, tu, &text).await,
        protocol::Command::Unrecognized => {
            debug!(target: LOG_TARGET, ext = tu.ext(), "unrecognized line; ignoring");
            coordinator::notify_current(tu).await?;
            Ok(Outcome::Ok)
        },
    }
}
