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

//! Formats and writes the one-line state notifications.
//!
//! The notifier is stateless: every function here takes the lock guard the caller is
//! already holding, so a write can never interleave with another transition of the same
//! TU. This module never acquires a lock itself.

use tracing::trace;

use crate::{error::PbxError, tu::Tu, tu::TuInner, tu::TuState, ExtNum};

const LOG_TARGET: &str = "pbx_core::notifier";

/// Render the current-state line for a TU.
///
/// `ON_HOOK` carries the TU's own extension; `CONNECTED` carries the peer's extension;
/// every other state carries no argument.
fn format_status(ext: ExtNum, inner: &TuInner) -> String {
    match inner.state {
        TuState::OnHook => format!("ON_HOOK {ext}\r\n"),
        TuState::Connected => {
            let peer = inner.peer.expect("CONNECTED implies a peer by invariant I2");
            format!("CONNECTED {peer}\r\n")
        },
        other => format!("{}\r\n", other.as_str()),
    }
}

/// Emit a current-state notification for `tu` on its own sink, under the lock the caller
/// already holds.
pub(crate) async fn notify_status(tu: &Tu, inner: &TuInner) -> Result<(), PbxError> {
    let line = format_status(tu.ext(), inner);
    trace!(target: LOG_TARGET, ext = tu.ext(), line = %line.trim_end(), "notify");
    tu.sink().write_line(&line).await.map_err(PbxError::Io)
}

/// Emit a `CHAT <text>` line to `peer`'s sink, under the peer's lock.
///
/// `text` may be empty; the payload is the verbatim remainder of the `chat` command line,
/// and an empty payload still produces a `CHAT ` line with a trailing space.
pub(crate) async fn notify_chat(peer: &Tu, text: &str) -> Result<(), PbxError> {
    let line = format!("CHAT {text}\r\n");
    trace!(target: LOG_TARGET, ext = peer.ext(), "notify chat");
    peer.sink().write_line(&line).await.map_err(PbxError::Io)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn on_hook_carries_own_extension() {
        let inner = TuInner {
            state: TuState::OnHook,
            peer: None,
        };
        assert_eq!(format_status(4, &inner), "ON_HOOK 4\r\n");
    }

    #[test]
    fn connected_carries_peer_extension() {
        let inner = TuInner {
            state: TuState::Connected,
            peer: Some(5),
        };
        assert_eq!(format_status(4, &inner), "CONNECTED 5\r\n");
    }

    #[test]
    fn argumentless_states_carry_nothing() {
        for (state, expected) in [
            (TuState::Ringing, "RINGING\r\n"),
            (TuState::DialTone, "DIAL_TONE\r\n"),
            (TuState::RingBack, "RING_BACK\r\n"),
            (TuState::BusySignal, "BUSY_SIGNAL\r\n"),
            (TuState::Error, "ERROR\r\n"),
        ] {
            let inner = TuInner { state, peer: None };
            assert_eq!(format_status(7, &inner), expected);
        }
    }
}
