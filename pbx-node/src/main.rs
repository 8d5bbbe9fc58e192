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

use std::process;

use clap::Parser;
use pbx_node::{cli::Cli, config::Settings, error::ExitError, shutdown::Shutdown};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const LOG_TARGET: &str = "pbx_node::main";

fn main() {
    if let Err(err) = main_inner() {
        eprintln!("{err}");
        let exit_code = err.exit_code();
        error!(target: LOG_TARGET, "exiting with code {}: {}", exit_code, err);
        process::exit(exit_code);
    }
}

fn main_inner() -> Result<(), ExitError> {
    let cli = Cli::parse();
    let settings = Settings::resolve(&cli)?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&settings.log_filter))
        .init();

    info!(target: LOG_TARGET, "starting PBX exchange simulator");

    let shutdown = Shutdown::new();
    let runtime = tokio::runtime::Runtime::new().map_err(ExitError::BindFailed)?;

    #[cfg(unix)]
    {
        let trigger = shutdown.clone();
        runtime.spawn(wait_for_sighup(trigger));
    }

    runtime.block_on(pbx_node::run(settings, shutdown))
}

#[cfg(unix)]
async fn wait_for_sighup(shutdown: pbx_node::shutdown::Shutdown) {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::hangup()) {
        Ok(mut stream) => {
            stream.recv().await;
            info!(target: LOG_TARGET, "received SIGHUP, shutting down");
            shutdown.trigger();
        },
        Err(err) => error!(target: LOG_TARGET, %err, "failed to install SIGHUP handler"),
    }
}
