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

use thiserror::Error;

/// Process-level failure, carrying the exit code `main` should return.
///
/// Mirrors the shape of `tari_common::exit_codes::ExitError`: a typed reason plus a stable
/// numeric code, so `main` only has to match on `exit_code()` once.
#[derive(Debug, Error)]
pub enum ExitError {
    #[error("configuration error: {0}")]
    ConfigError(String),
    #[error("could not bind listener: {0}")]
    BindFailed(#[source] std::io::Error),
}

impl ExitError {
    /// The process exit code this error should produce, following the common Unix
    /// convention that 64+ codes mean usage/configuration problems (`EX_USAGE`,
    /// `EX_CONFIG`) and a bare 1 means an operational failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExitError::ConfigError(_) => 64,
            ExitError::BindFailed(_) => 1,
        }
    }
}
