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

//! Wires `pbx-core` up to a real TCP transport: CLI/config, the listen loop, and graceful
//! shutdown on SIGHUP.

pub mod cli;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod shutdown;

use std::sync::Arc;

use pbx_core::registry::Registry;
use tokio::net::TcpListener;
use tracing::info;

use crate::{config::Settings, error::ExitError, shutdown::Shutdown};

const LOG_TARGET: &str = "pbx_node::app";

/// Bind the listener and run the server until `shutdown` fires.
pub async fn run(settings: Settings, shutdown: Shutdown) -> Result<(), ExitError> {
    let addr = format!("0.0.0.0:{}", settings.port);
    let listener = TcpListener::bind(&addr).await.map_err(ExitError::BindFailed)?;
    info!(target: LOG_TARGET, %addr, max_extensions = settings.max_extensions, "listening");

    let registry = Arc::new(Registry::new(settings.max_extensions));
    server::run(listener, registry, shutdown.to_signal()).await
}
