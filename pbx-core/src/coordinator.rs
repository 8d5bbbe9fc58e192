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

//! The four call operations: `pickup`, `hangup`, `dial`, `chat`.
//!
//! Single-TU transitions take only the initiator's lock. Two-TU transitions read the
//! initiator's state, drop that lock, then reacquire both locks in ascending-extension
//! order via [`lock_ordered`] and re-validate before mutating — the initiator's state, and
//! the peer's claim of the initiator, may both have changed while the lock was released.

use std::sync::Arc;

use tokio::sync::MutexGuard;
use tracing::{debug, instrument};

use crate::{
    error::PbxError,
    notifier::{notify_chat, notify_status},
    registry::{resolve_missing_peer, Registry},
    tu::{Tu, TuInner, TuState},
    ExtNum,
};

const LOG_TARGET: &str = "pbx_core::coordinator";

/// The semantic result of a coordinator operation that does not amount to an I/O failure
/// or resource exhaustion. Only [`PbxError::Io`] and [`PbxError::Full`] propagate as errors
/// out of the coordinator; everything else surfaces here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The operation ran to completion, or was a well-defined no-op; a notification was
    /// already sent to the initiator (and, where applicable, the peer).
    Ok,
    /// `chat` was attempted while not `CONNECTED`.
    NotConnected,
}

/// Lock `a` and `b` in ascending-extension order, returning guards in `(a, b)` order
/// regardless of which extension is numerically lower.
pub(crate) async fn lock_ordered<'a>(a: &'a Tu, b: &'a Tu) -> (MutexGuard<'a, TuInner>, MutexGuard<'a, TuInner>) {
    if a.ext() <= b.ext() {
        let ga = a.lock().await;
        let gb = b.lock().await;
        (ga, gb)
    } else {
        let gb = b.lock().await;
        let ga = a.lock().await;
        (ga, gb)
    }
}

/// The `(new initiator state, new peer state)` produced when a TU in `state` releases its
/// peer — by hanging up, or by vanishing out from under it. `None` if `state` does not
/// couple with a peer (invariant I2).
pub(crate) fn peer_released_states(state: TuState) -> Option<(TuState, TuState)> {
    match state {
        TuState::Connected => Some((TuState::OnHook, TuState::DialTone)),
        TuState::RingBack => Some((TuState::OnHook, TuState::OnHook)),
        TuState::Ringing => Some((TuState::OnHook, TuState::DialTone)),
        _ => None,
    }
}

/// `pickup`: `ON_HOOK` -> `DIAL_TONE`, or, when ringing with a live `RING_BACK` peer,
/// couple both TUs into `CONNECTED`. Any other state is a no-op that re-notifies.
#[instrument(target = "pbx_core::coordinator", skip(registry, tu), fields(ext = tu.ext()))]
pub async fn pickup(registry: &Registry, tu: &Arc<Tu>) -> Result<Outcome, PbxError> {
    let state = tu.lock().await.state;
    match state {
        TuState::OnHook => {
            let mut guard = tu.lock().await;
            if guard.state == TuState::OnHook {
                guard.state = TuState::DialTone;
            }
            notify_status(tu, &guard).await?;
        },
        TuState::Ringing => {
            let peer_ext = tu.lock().await.peer;
            match lookup_peer(registry, peer_ext).await {
                PeerLookup::Found(peer) => {
                    let (mut gi, mut gp) = lock_ordered(tu, &peer).await;
                    if gi.state == TuState::Ringing &&
                        gi.peer == Some(peer.ext()) &&
                        gp.state == TuState::RingBack &&
                        gp.peer == Some(tu.ext())
                    {
                        gi.state = TuState::Connected;
                        gp.state = TuState::Connected;
                        debug!(target: LOG_TARGET, a = tu.ext(), b = peer.ext(), "connected");
                        notify_status(&peer, &gp).await?;
                    } else if gi.peer == Some(peer.ext()) {
                        resolve_missing_peer(&mut gi);
                    }
                    notify_status(tu, &gi).await?;
                },
                PeerLookup::Gone => {
                    let mut guard = tu.lock().await;
                    if guard.peer == peer_ext {
                        resolve_missing_peer(&mut guard);
                    }
                    notify_status(tu, &guard).await?;
                },
                PeerLookup::NoPeer => {
                    let guard = tu.lock().await;
                    notify_status(tu, &guard).await?;
                },
            }
        },
        _ => {
            let guard = tu.lock().await;
            notify_status(tu, &guard).await?;
        },
    }
    Ok(Outcome::Ok)
}

/// `hangup`: releases any peer coupling per [`peer_released_states`], then goes `ON_HOOK`.
/// From `ON_HOOK` itself, a no-op that re-notifies.
#[instrument(target = "pbx_core::coordinator", skip(registry, tu), fields(ext = tu.ext()))]
pub async fn hangup(registry: &Registry, tu: &Arc<Tu>) -> Result<Outcome, PbxError> {
    let state = tu.lock().await.state;
    match state {
        TuState::DialTone | TuState::BusySignal | TuState::Error => {
            let mut guard = tu.lock().await;
            if matches!(guard.state, TuState::DialTone | TuState::BusySignal | TuState::Error) {
                guard.state = TuState::OnHook;
            }
            notify_status(tu, &guard).await?;
        },
        TuState::Ringing | TuState::RingBack | TuState::Connected => {
            let peer_ext = tu.lock().await.peer;
            match lookup_peer(registry, peer_ext).await {
                PeerLookup::Found(peer) => {
                    let (mut gi, mut gp) = lock_ordered(tu, &peer).await;
                    if gi.peer == Some(peer.ext()) {
                        if let Some((new_i, new_p)) = peer_released_states(gi.state) {
                            gi.state = new_i;
                            gi.peer = None;
                            if gp.peer == Some(tu.ext()) {
                                gp.state = new_p;
                                gp.peer = None;
                                notify_status(&peer, &gp).await?;
                            }
                        }
                    }
                    debug!(target: LOG_TARGET, ext = tu.ext(), "hung up");
                    notify_status(tu, &gi).await?;
                },
                PeerLookup::Gone | PeerLookup::NoPeer => {
                    let mut guard = tu.lock().await;
                    resolve_missing_peer(&mut guard);
                    notify_status(tu, &guard).await?;
                },
            }
        },
        TuState::OnHook => {
            let guard = tu.lock().await;
            notify_status(tu, &guard).await?;
        },
    }
    Ok(Outcome::Ok)
}

/// `dial(target)`: only defined from `DIAL_TONE`. Dialing oneself goes `BUSY_SIGNAL`;
/// dialing an unregistered extension goes `ERROR`; dialing an `ON_HOOK` peer couples both
/// into `RING_BACK`/`RINGING`; dialing any other live peer goes `BUSY_SIGNAL`. Any other
/// initiator state is a no-op that re-notifies.
#[instrument(target = "pbx_core::coordinator", skip(registry, tu), fields(ext = tu.ext(), target = target))]
pub async fn dial(registry: &Registry, tu: &Arc<Tu>, target: ExtNum) -> Result<Outcome, PbxError> {
    if tu.lock().await.state != TuState::DialTone {
        let guard = tu.lock().await;
        notify_status(tu, &guard).await?;
        return Ok(Outcome::Ok);
    }

    if target == tu.ext() {
        let mut guard = tu.lock().await;
        if guard.state == TuState::DialTone {
            guard.state = TuState::BusySignal;
        }
        notify_status(tu, &guard).await?;
        return Ok(Outcome::Ok);
    }

    let Some(peer) = registry.lookup(target).await else {
        let mut guard = tu.lock().await;
        if guard.state == TuState::DialTone {
            guard.state = TuState::Error;
        }
        notify_status(tu, &guard).await?;
        return Ok(Outcome::Ok);
    };

    let (mut gi, mut gp) = lock_ordered(tu, &peer).await;
    if gi.state != TuState::DialTone {
        drop(gp);
        notify_status(tu, &gi).await?;
        return Ok(Outcome::Ok);
    }
    if gp.state == TuState::OnHook {
        gi.state = TuState::RingBack;
        gi.peer = Some(peer.ext());
        gp.state = TuState::Ringing;
        gp.peer = Some(tu.ext());
        notify_status(&peer, &gp).await?;
    } else {
        gi.state = TuState::BusySignal;
    }
    notify_status(tu, &gi).await?;
    Ok(Outcome::Ok)
}

/// `chat(text)`: requires `CONNECTED`. Writes `CHAT <text>` to the peer under the peer's
/// lock, then re-affirms `CONNECTED <peer>` to the initiator. Any other state is a
/// semantic refusal: [`Outcome::NotConnected`], current status re-notified.
#[instrument(target = "pbx_core::coordinator", skip(registry, tu, text), fields(ext = tu.ext()))]
pub async fn chat(registry: &Registry, tu: &Arc<Tu>, text: &str) -> Result<Outcome, PbxError> {
    let (state, peer_ext) = {
        let guard = tu.lock().await;
        (guard.state, guard.peer)
    };
    if state != TuState::Connected {
        let guard = tu.lock().await;
        notify_status(tu, &guard).await?;
        return Ok(Outcome::NotConnected);
    }
    let peer_ext = peer_ext.expect("CONNECTED implies a peer by invariant I2");

    match registry.lookup(peer_ext).await {
        Some(peer) => {
            let (mut gi, mut gp) = lock_ordered(tu, &peer).await;
            if gi.state == TuState::Connected &&
                gi.peer == Some(peer.ext()) &&
                gp.state == TuState::Connected &&
                gp.peer == Some(tu.ext())
            {
                notify_chat(&peer, text).await?;
                notify_status(tu, &gi).await?;
                Ok(Outcome::Ok)
            } else {
                if gi.peer == Some(peer.ext()) {
                    resolve_missing_peer(&mut gi);
                }
                notify_status(tu, &gi).await?;
                Ok(Outcome::NotConnected)
            }
        },
        None => {
            let mut guard = tu.lock().await;
            if guard.peer == Some(peer_ext) {
                resolve_missing_peer(&mut guard);
            }
            notify_status(tu, &guard).await?;
            Ok(Outcome::NotConnected)
        },
    }
}

/// Re-emit the current-state notification without any transition.
///
/// Used for unrecognized protocol lines: these are silently ignored, but a current-state
/// notification is still sent, same as every other operation.
#[instrument(target = "pbx_core::coordinator", skip(tu), fields(ext = tu.ext()))]
pub async fn notify_current(tu: &Arc<Tu>) -> Result<(), PbxError> {
    let guard = tu.lock().await;
    notify_status(tu, &guard).await
}

/// The outcome of looking up a TU's recorded peer extension in the registry, distinguishing
/// "never had a peer" from "had one, but it is gone" so callers can tell whether invariant
/// I5 resolution applies.
enum PeerLookup {
    Found(Arc<Tu>),
    Gone,
    NoPeer,
}

async fn lookup_peer(registry: &Registry, peer_ext: Option<ExtNum>) -> PeerLookup {
    match peer_ext {
        None => PeerLookup::NoPeer,
        Some(ext) => match registry.lookup(ext).await {
            Some(peer) => PeerLookup::Found(peer),
            None => PeerLookup::Gone,
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use super::*;
    use crate::sink::ByteSink;

    #[derive(Default)]
    struct RecordingSink {
        lines: StdMutex<Vec<String>>,
    }

    impl RecordingSink {
        fn lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ByteSink for RecordingSink {
        async fn write_line(&self, line: &str) -> std::io::Result<()> {
            self.lines.lock().unwrap().push(line.to_string());
            Ok(())
        }

        async fn shutdown(&self) -> std::io::Result<()> {
            Ok(())
        }
    }

    async fn register(registry: &Registry) -> (Arc<Tu>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let tu = registry.register(sink.clone()).await.unwrap();
        (tu, sink)
    }

    #[tokio::test]
    async fn simple_call_connects_both_parties() {
        let registry = Registry::new(4);
        let (a, sink_a) = register(&registry).await;
        let (b, sink_b) = register(&registry).await;

        pickup(&registry, &a).await.unwrap();
        dial(&registry, &a, b.ext()).await.unwrap();
        pickup(&registry, &b).await.unwrap();

        assert_eq!(a.lock().await.state, TuState::Connected);
        assert_eq!(b.lock().await.state, TuState::Connected);
        assert_eq!(sink_b.lines().last().unwrap(), &format!("CONNECTED {}\r\n", a.ext()));
        assert_eq!(sink_a.lines().last().unwrap(), &format!("CONNECTED {}\r\n", b.ext()));
    }

    #[tokio::test]
    async fn caller_aborts_before_pickup() {
        let registry = Registry::new(4);
        let (a, _) = register(&registry).await;
        let (b, sink_b) = register(&registry).await;

        pickup(&registry, &a).await.unwrap();
        dial(&registry, &a, b.ext()).await.unwrap();
        hangup(&registry, &a).await.unwrap();

        assert_eq!(a.lock().await.state, TuState::OnHook);
        assert_eq!(b.lock().await.state, TuState::OnHook);
        assert_eq!(sink_b.lines().last().unwrap(), "ON_HOOK 1\r\n");
    }

    #[tokio::test]
    async fn callee_declines_by_hanging_up() {
        let registry = Registry::new(4);
        let (a, sink_a) = register(&registry).await;
        let (b, _) = register(&registry).await;

        pickup(&registry, &a).await.unwrap();
        dial(&registry, &a, b.ext()).await.unwrap();
        hangup(&registry, &b).await.unwrap();

        assert_eq!(b.lock().await.state, TuState::OnHook);
        assert_eq!(a.lock().await.state, TuState::DialTone);
        assert_eq!(sink_a.lines().last().unwrap(), "DIAL_TONE\r\n");
    }

    #[tokio::test]
    async fn dialing_a_busy_extension_reports_busy() {
        let registry = Registry::new(4);
        let (a, _) = register(&registry).await;
        let (b, _) = register(&registry).await;
        let (c, sink_c) = register(&registry).await;

        pickup(&registry, &a).await.unwrap();
        dial(&registry, &a, b.ext()).await.unwrap();
        pickup(&registry, &b).await.unwrap();
        assert_eq!(a.lock().await.state, TuState::Connected);

        pickup(&registry, &c).await.unwrap();
        dial(&registry, &c, a.ext()).await.unwrap();
        assert_eq!(c.lock().await.state, TuState::BusySignal);
        assert_eq!(sink_c.lines().last().unwrap(), "BUSY_SIGNAL\r\n");
    }

    #[tokio::test]
    async fn dialing_unknown_extension_errors() {
        let registry = Registry::new(4);
        let (a, sink_a) = register(&registry).await;

        pickup(&registry, &a).await.unwrap();
        dial(&registry, &a, 99).await.unwrap();

        assert_eq!(a.lock().await.state, TuState::Error);
        assert_eq!(sink_a.lines().last().unwrap(), "ERROR\r\n");
    }

    #[tokio::test]
    async fn chat_requires_connected() {
        let registry = Registry::new(4);
        let (a, _) = register(&registry).await;
        let (b, sink_b) = register(&registry).await;

        pickup(&registry, &a).await.unwrap();
        dial(&registry, &a, b.ext()).await.unwrap();
        pickup(&registry, &b).await.unwrap();

        let outcome = chat(&registry, &a, "hello").await.unwrap();
        assert_eq!(outcome, Outcome::Ok);
        assert_eq!(sink_b.lines().last().unwrap(), "CHAT hello\r\n");

        hangup(&registry, &a).await.unwrap();
        let outcome = chat(&registry, &a, "still there?").await.unwrap();
        assert_eq!(outcome, Outcome::NotConnected);
    }

    #[tokio::test]
    async fn self_dial_goes_busy() {
        let registry = Registry::new(4);
        let (a, sink_a) = register(&registry).await;

        pickup(&registry, &a).await.unwrap();
        dial(&registry, &a, a.ext()).await.unwrap();

        assert_eq!(a.lock().await.state, TuState::BusySignal);
        assert_eq!(sink_a.lines().last().unwrap(), "BUSY_SIGNAL\r\n");
    }

    #[tokio::test]
    async fn unregistering_a_connected_peer_sends_the_survivor_a_dial_tone() {
        let registry = Registry::new(4);
        let (a, _) = register(&registry).await;
        let (b, sink_b) = register(&registry).await;

        pickup(&registry, &a).await.unwrap();
        dial(&registry, &a, b.ext()).await.unwrap();
        pickup(&registry, &b).await.unwrap();
        assert_eq!(a.lock().await.state, TuState::Connected);

        registry.unregister(&a).await.unwrap();

        assert_eq!(b.lock().await.state, TuState::DialTone);
        assert_eq!(sink_b.lines().last().unwrap(), "DIAL_TONE\r\n");
    }

    #[tokio::test]
    async fn race_dial_each_other_resolves_to_one_coupling() {
        let registry = Arc::new(Registry::new(4));
        let (a, _) = register(&registry).await;
        let (b, _) = register(&registry).await;

        pickup(&registry, &a).await.unwrap();
        pickup(&registry, &b).await.unwrap();

        let (ra, rb) = tokio::join!(dial(&registry, &a, b.ext()), dial(&registry, &b, a.ext()));
        ra.unwrap();
        rb.unwrap();

        let sa = a.lock().await.state;
        let sb = b.lock().await.state;
        let valid = matches!(
            (sa, sb),
            (TuState::RingBack, TuState::Ringing) | (TuState::Ringing, TuState::RingBack)
        );
        assert!(valid, "unexpected race outcome: ({sa:?}, {sb:?})");
        assert_eq!(a.lock().await.peer, Some(b.ext()));
        assert_eq!(b.lock().await.peer, Some(a.ext()));
    }
}
