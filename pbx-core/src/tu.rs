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

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use crate::{sink::ByteSink, ExtNum};

/// The state of a single telephone unit.
///
/// `peer` on the enclosing [`Tu`] is `Some` iff the state is one of `Ringing`, `RingBack`
/// or `Connected` (invariant I2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TuState {
    OnHook,
    Ringing,
    DialTone,
    RingBack,
    BusySignal,
    Connected,
    Error,
}

impl TuState {
    /// The wire token written for this state, as used by the notifier.
    pub fn as_str(self) -> &'static str {
        match self {
            TuState::OnHook => "ON_HOOK",
            TuState::Ringing => "RINGING",
            TuState::DialTone => "DIAL_TONE",
            TuState::RingBack => "RING_BACK",
            TuState::BusySignal => "BUSY_SIGNAL",
            TuState::Connected => "CONNECTED",
            TuState::Error => "ERROR",
        }
    }

    /// Whether this state requires a peer extension to be set (invariant I2).
    pub fn requires_peer(self) -> bool {
        matches!(self, TuState::Ringing | TuState::RingBack | TuState::Connected)
    }
}

/// The mutable part of a TU, guarded by [`Tu::inner`].
#[derive(Debug)]
pub struct TuInner {
    pub state: TuState,
    pub peer: Option<ExtNum>,
}

/// A single telephone unit: one registered extension with its own state and sink.
///
/// `ext` and `sink` are fixed for the lifetime of the TU. `inner` is the only field that
/// changes after construction, and every read or write of it happens under `inner`'s lock —
/// that lock is the one referred to throughout the coordinator as `tu.mu`.
pub struct Tu {
    ext: ExtNum,
    sink: Arc<dyn ByteSink>,
    inner: Mutex<TuInner>,
}

impl Tu {
    pub(crate) fn new(ext: ExtNum, sink: Arc<dyn ByteSink>) -> Self {
        Self {
            ext,
            sink,
            inner: Mutex::new(TuInner {
                state: TuState::OnHook,
                peer: None,
            }),
        }
    }

    /// The extension number assigned to this TU at registration.
    pub fn ext(&self) -> ExtNum {
        self.ext
    }

    /// The sink this TU writes notifications to.
    pub(crate) fn sink(&self) -> &Arc<dyn ByteSink> {
        &self.sink
    }

    /// Acquire this TU's lock. Held across both the state mutation and the resulting
    /// notification write.
    pub(crate) async fn lock(&self) -> MutexGuard<'_, TuInner> {
        self.inner.lock().await
    }

    /// A point-in-time copy of this TU's state and peer, for callers outside the crate that
    /// only need to observe the outcome of a transition rather than drive one.
    pub async fn state_snapshot(&self) -> (TuState, Option<ExtNum>) {
        let guard = self.lock().await;
        (guard.state, guard.peer)
    }
}

impl std::fmt::Debug for Tu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tu").field("ext", &self.ext).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_peer_matches_invariant_i2() {
        for state in [
            TuState::OnHook,
            TuState::DialTone,
            TuState::BusySignal,
            TuState::Error,
        ] {
            assert!(!state.requires_peer(), "{state:?} must not require a peer");
        }
        for state in [TuState::Ringing, TuState::RingBack, TuState::Connected] {
            assert!(state.requires_peer(), "{state:?} must require a peer");
        }
    }
}
