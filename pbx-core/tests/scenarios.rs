//! End-to-end scenarios driving `pbx_core::coordinator` against an in-memory sink: simple
//! call, caller-abort, callee-refusal, busy, dial-unknown, chat, and the concurrent-dial race.

use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use pbx_core::{coordinator, registry::Registry, sink::ByteSink};

#[derive(Default)]
struct RecordingSink {
    lines: StdMutex<Vec<String>>,
}

impl RecordingSink {
    fn drain(&self) -> Vec<String> {
        std::mem::take(&mut self.lines.lock().unwrap())
    }
}

#[async_trait]
impl ByteSink for RecordingSink {
    async fn write_line(&self, line: &str) -> std::io::Result<()> {
        self.lines.lock().unwrap().push(line.trim_end().to_string());
        Ok(())
    }

    async fn shutdown(&self) -> std::io::Result<()> {
        Ok(())
    }
}

async fn connect(registry: &Registry) -> (Arc<pbx_core::tu::Tu>, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let tu = registry.register(sink.clone()).await.unwrap();
    sink.drain();
    (tu, sink)
}

#[tokio::test]
async fn scenario_1_simple_call_both_hang_up_clean() {
    let registry = Registry::new(8);
    let (a, a_sink) = connect(&registry).await;
    let (b, b_sink) = connect(&registry).await;

    coordinator::pickup(&registry, &a).await.unwrap();
    assert_eq!(a_sink.drain(), ["DIAL_TONE"]);

    coordinator::dial(&registry, &a, b.ext()).await.unwrap();
    assert_eq!(a_sink.drain(), ["RING_BACK"]);
    assert_eq!(b_sink.drain(), ["RINGING"]);

    coordinator::pickup(&registry, &b).await.unwrap();
    assert_eq!(b_sink.drain(), [format!("CONNECTED {}", a.ext())]);
    assert_eq!(a_sink.drain(), [format!("CONNECTED {}", b.ext())]);

    coordinator::hangup(&registry, &a).await.unwrap();
    assert_eq!(a_sink.drain(), [format!("ON_HOOK {}", a.ext())]);
    assert_eq!(b_sink.drain(), ["DIAL_TONE"]);
}

#[tokio::test]
async fn scenario_2_caller_aborts_before_answer() {
    let registry = Registry::new(8);
    let (a, a_sink) = connect(&registry).await;
    let (b, b_sink) = connect(&registry).await;

    coordinator::pickup(&registry, &a).await.unwrap();
    a_sink.drain();
    coordinator::dial(&registry, &a, b.ext()).await.unwrap();
    assert_eq!(a_sink.drain(), ["RING_BACK"]);
    assert_eq!(b_sink.drain(), ["RINGING"]);

    coordinator::hangup(&registry, &a).await.unwrap();
    assert_eq!(a_sink.drain(), [format!("ON_HOOK {}", a.ext())]);
    assert_eq!(b_sink.drain(), [format!("ON_HOOK {}", b.ext())]);
}

#[tokio::test]
async fn scenario_3_callee_refuses_by_hanging_up() {
    let registry = Registry::new(8);
    let (a, a_sink) = connect(&registry).await;
    let (b, b_sink) = connect(&registry).await;

    coordinator::pickup(&registry, &a).await.unwrap();
    a_sink.drain();
    coordinator::dial(&registry, &a, b.ext()).await.unwrap();
    a_sink.drain();
    b_sink.drain();

    coordinator::hangup(&registry, &b).await.unwrap();
    assert_eq!(b_sink.drain(), [format!("ON_HOOK {}", b.ext())]);
    assert_eq!(a_sink.drain(), ["DIAL_TONE"]);
}

#[tokio::test]
async fn scenario_4_busy() {
    let registry = Registry::new(8);
    let (a, a_sink) = connect(&registry).await;
    let (b, b_sink) = connect(&registry).await;
    let (c, c_sink) = connect(&registry).await;

    coordinator::pickup(&registry, &a).await.unwrap();
    coordinator::dial(&registry, &a, b.ext()).await.unwrap();
    coordinator::pickup(&registry, &b).await.unwrap();
    a_sink.drain();
    b_sink.drain();

    coordinator::pickup(&registry, &c).await.unwrap();
    c_sink.drain();
    coordinator::dial(&registry, &c, a.ext()).await.unwrap();
    assert_eq!(c_sink.drain(), ["BUSY_SIGNAL"]);
    assert!(a_sink.drain().is_empty());
    assert!(b_sink.drain().is_empty());
}

#[tokio::test]
async fn scenario_5_dial_unknown() {
    let registry = Registry::new(8);
    let (a, a_sink) = connect(&registry).await;

    coordinator::pickup(&registry, &a).await.unwrap();
    a_sink.drain();
    coordinator::dial(&registry, &a, 99).await.unwrap();
    assert_eq!(a_sink.drain(), ["ERROR"]);

    coordinator::hangup(&registry, &a).await.unwrap();
    assert_eq!(a_sink.drain(), [format!("ON_HOOK {}", a.ext())]);
}

#[tokio::test]
async fn scenario_6_chat() {
    let registry = Registry::new(8);
    let (a, a_sink) = connect(&registry).await;
    let (b, b_sink) = connect(&registry).await;

    coordinator::pickup(&registry, &a).await.unwrap();
    coordinator::dial(&registry, &a, b.ext()).await.unwrap();
    coordinator::pickup(&registry, &b).await.unwrap();
    a_sink.drain();
    b_sink.drain();

    coordinator::chat(&registry, &a, "hello").await.unwrap();
    assert_eq!(b_sink.drain(), ["CHAT hello"]);
    assert_eq!(a_sink.drain(), [format!("CONNECTED {}", b.ext())]);

    coordinator::chat(&registry, &b, "hi").await.unwrap();
    assert_eq!(a_sink.drain(), ["CHAT hi"]);
    assert_eq!(b_sink.drain(), [format!("CONNECTED {}", a.ext())]);
}

#[tokio::test]
async fn scenario_7_race_regression() {
    let registry = Registry::new(8);
    let (a, a_sink) = connect(&registry).await;
    let (b, b_sink) = connect(&registry).await;

    coordinator::pickup(&registry, &a).await.unwrap();
    coordinator::pickup(&registry, &b).await.unwrap();
    a_sink.drain();
    b_sink.drain();

    let (r1, r2) = tokio::join!(
        coordinator::dial(&registry, &a, b.ext()),
        coordinator::dial(&registry, &b, a.ext()),
    );
    r1.unwrap();
    r2.unwrap();

    let (a_state, a_peer) = a.state_snapshot().await;
    let (b_state, b_peer) = b.state_snapshot().await;

    use pbx_core::tu::TuState;
    let legal = matches!(
        (a_state, b_state),
        (TuState::RingBack, TuState::Ringing) | (TuState::Ringing, TuState::RingBack)
    );
    assert!(legal, "unexpected final pair: {a_state:?}/{b_state:?}");
    assert_eq!(a_peer, Some(b.ext()));
    assert_eq!(b_peer, Some(a.ext()));

    assert_eq!(a_sink.drain().len(), 1, "A must see exactly one notification");
    assert_eq!(b_sink.drain().len(), 1, "B must see exactly one notification");
}

#[tokio::test]
async fn dial_hangup_idempotent_on_unregistered_target() {
    let registry = Registry::new(8);
    let (a, a_sink) = connect(&registry).await;

    coordinator::pickup(&registry, &a).await.unwrap();
    a_sink.drain();

    coordinator::dial(&registry, &a, 99).await.unwrap();
    coordinator::dial(&registry, &a, 99).await.unwrap();
    assert_eq!(a_sink.drain(), ["ERROR", "ERROR"]);

    let (state, _peer) = a.state_snapshot().await;
    assert_eq!(state, pbx_core::tu::TuState::Error);
}

#[tokio::test]
async fn register_unregister_round_trip_preserves_count() {
    let registry = Registry::new(8);
    let before = registry.count().await;
    let (tu, _sink) = connect(&registry).await;
    registry.unregister(&tu).await.unwrap();
    assert_eq!(registry.count().await, before);
}

#[tokio::test]
async fn unregistering_a_ringing_callee_sends_the_caller_a_fresh_dial_tone() {
    let registry = Registry::new(8);
    let (a, a_sink) = connect(&registry).await;
    let (b, _b_sink) = connect(&registry).await;

    coordinator::pickup(&registry, &a).await.unwrap();
    coordinator::dial(&registry, &a, b.ext()).await.unwrap();
    a_sink.drain();

    registry.unregister(&b).await.unwrap();
    assert_eq!(a_sink.drain(), ["DIAL_TONE"]);

    let (state, _peer) = a.state_snapshot().await;
    assert_eq!(state, pbx_core::tu::TuState::DialTone);
}
