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

//! The directory of registered extensions: allocation, lookup and orderly shutdown.

use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use crate::{
    coordinator::peer_released_states,
    error::PbxError,
    notifier::notify_status,
    sink::ByteSink,
    tu::{Tu, TuState},
    ExtNum,
};

const LOG_TARGET: &str = "pbx_core::registry";

struct RegistryInner {
    slots: Vec<Option<Arc<Tu>>>,
    count: usize,
    closed: bool,
}

/// The PBX extension directory.
///
/// `slots[e]` holds the TU currently bound to extension `e`, or `None`. Allocation always
/// picks the lowest free index in `[0, max_extensions)`. `registry.mu` (the lock guarding
/// this struct) is always released before a TU lock is taken for a coordinator transition;
/// the only exceptions are `register` and `unregister`, where the TU in question is not
/// yet, or no longer, reachable by any other task.
pub struct Registry {
    max_extensions: usize,
    inner: Mutex<RegistryInner>,
    drained: Notify,
}

impl Registry {
    pub fn new(max_extensions: usize) -> Self {
        Self {
            max_extensions,
            inner: Mutex::new(RegistryInner {
                slots: (0..max_extensions).map(|_| None).collect(),
                count: 0,
                closed: false,
            }),
            drained: Notify::new(),
        }
    }

    /// The maximum number of simultaneously registered extensions.
    pub fn max_extensions(&self) -> usize {
        self.max_extensions
    }

    /// The number of currently registered extensions.
    pub async fn count(&self) -> usize {
        self.inner.lock().await.count
    }

    /// Register a new TU against `sink`, assigning it the lowest free extension number.
    ///
    /// Emits the TU's initial `ON_HOOK <ext>` notification under the new TU's own lock,
    /// after the registry lock guarding allocation has already been released.
    pub async fn register(&self, sink: Arc<dyn ByteSink>) -> Result<Arc<Tu>, PbxError> {
        let tu = {
            let mut inner = self.inner.lock().await;
            if inner.closed {
                return Err(PbxError::ShuttingDown);
            }
            let ext = inner
                .slots
                .iter()
                .position(Option::is_none)
                .ok_or(PbxError::Full)?;
            let tu = Arc::new(Tu::new(ext, sink));
            inner.slots[ext] = Some(tu.clone());
            inner.count += 1;
            debug!(target: LOG_TARGET, ext, count = inner.count, "registered");
            tu
        };
        let guard = tu.lock().await;
        notify_status(&tu, &guard).await?;
        drop(guard);
        Ok(tu)
    }

    /// Look up the TU currently bound to `ext`, if any.
    pub async fn lookup(&self, ext: ExtNum) -> Option<Arc<Tu>> {
        let inner = self.inner.lock().await;
        inner.slots.get(ext).and_then(Clone::clone)
    }

    /// Unregister `tu`, first driving invariant I5 on any live peer, then releasing the
    /// slot. Idempotent calls on an already-unregistered TU return `UnknownExtension`.
    pub async fn unregister(&self, tu: &Arc<Tu>) -> Result<(), PbxError> {
        let peer_ext = {
            let guard = tu.lock().await;
            guard.peer
        };
        if let Some(peer_ext) = peer_ext {
            match self.lookup(peer_ext).await {
                Some(peer) if !Arc::ptr_eq(&peer, tu) => {
                    let (mut gi, mut gp) = crate::coordinator::lock_ordered(tu, &peer).await;
                    if gi.peer == Some(peer.ext()) {
                        if let Some((new_i, new_p)) = peer_released_states(gi.state) {
                            gi.state = new_i;
                            gi.peer = None;
                            if gp.peer == Some(tu.ext()) {
                                gp.state = new_p;
                                gp.peer = None;
                                if let Err(err) = notify_status(&peer, &gp).await {
                                    warn!(target: LOG_TARGET, ext = peer.ext(), %err, "failed to notify peer during unregister");
                                }
                            }
                        }
                    }
                },
                _ => {
                    let mut guard = tu.lock().await;
                    if let Some((new_i, _)) = peer_released_states(guard.state) {
                        guard.state = new_i;
                    }
                    guard.peer = None;
                },
            }
        }

        let mut inner = self.inner.lock().await;
        let ext = tu.ext();
        match inner.slots.get_mut(ext) {
            Some(slot @ Some(_)) => {
                *slot = None;
                inner.count -= 1;
                debug!(target: LOG_TARGET, ext, count = inner.count, "unregistered");
                if inner.closed && inner.count == 0 {
                    self.drained.notify_waiters();
                }
                Ok(())
            },
            _ => Err(PbxError::UnknownExtension(ext)),
        }
    }

    /// Close the registry to new registrations, shut down every registered TU's sink, and
    /// wait until every TU has been unregistered.
    ///
    /// Shutting down a sink causes the owning connection's reader to observe EOF (or an
    /// error), which drives that connection's service adapter to call `unregister` — this
    /// is how `shutdown` eventually observes `count == 0` without reaching into any
    /// connection task directly.
    pub async fn shutdown(&self) {
        let sinks: Vec<Arc<dyn ByteSink>> = {
            let mut inner = self.inner.lock().await;
            inner.closed = true;
            if inner.count == 0 {
                return;
            }
            inner
                .slots
                .iter()
                .flatten()
                .map(|tu| tu.sink().clone())
                .collect()
        };
        info!(target: LOG_TARGET, connections = sinks.len(), "shutting down registry");
        for sink in sinks {
            if let Err(err) = sink.shutdown().await {
                warn!(target: LOG_TARGET, %err, "error shutting down sink");
            }
        }
        loop {
            if self.count().await == 0 {
                break;
            }
            self.drained.notified().await;
        }
        info!(target: LOG_TARGET, "registry drained");
    }
}

/// Resolve `inner` per invariant I5: a TU whose peer has disappeared must land in a
/// terminal single-TU state before any operation that discovers the disappearance returns.
///
/// `ON_HOOK` for `RINGING`/`RING_BACK`, `DIAL_TONE` for `CONNECTED`.
pub(crate) fn resolve_missing_peer(inner: &mut crate::tu::TuInner) {
    inner.state = match inner.state {
        TuState::Ringing | TuState::RingBack => TuState::OnHook,
        TuState::Connected => TuState::DialTone,
        other => other,
    };
    inner.peer = None;
}
