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

//! Layered configuration: an optional TOML file, overridden field-by-field by CLI flags.

use config::{Config, File};
use serde::Deserialize;

use crate::{cli::Cli, error::ExitError};

const DEFAULT_MAX_EXTENSIONS: usize = 64;
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Deserialize, Default)]
struct FileSettings {
    port: Option<u16>,
    max_extensions: Option<usize>,
    log_filter: Option<String>,
}

/// The fully-resolved settings the service binary runs with.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub max_extensions: usize,
    pub log_filter: String,
}

impl Settings {
    /// Resolve settings from an optional config file layered under CLI overrides.
    ///
    /// `--port` is the only field with no built-in default: it must come from either the
    /// config file or the CLI, or this returns [`ExitError::ConfigError`].
    pub fn resolve(cli: &Cli) -> Result<Settings, ExitError> {
        let file_settings = match &cli.config {
            Some(path) => {
                let raw = Config::builder()
                    .add_source(File::from(path.as_path()))
                    .build()
                    .map_err(|err| ExitError::ConfigError(err.to_string()))?;
                raw.try_deserialize::<FileSettings>()
                    .map_err(|err| ExitError::ConfigError(err.to_string()))?
            },
            None => FileSettings::default(),
        };

        let port = cli
            .port
            .or(file_settings.port)
            .ok_or_else(|| ExitError::ConfigError("no --port given and none set in the config file".to_string()))?;

        Ok(Settings {
            port,
            max_extensions: cli
                .max_extensions
                .or(file_settings.max_extensions)
                .unwrap_or(DEFAULT_MAX_EXTENSIONS),
            log_filter: cli
                .log_filter
                .clone()
                .or(file_settings.log_filter)
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        })
    }
}
