// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! Multiplexer behavior over the in-memory transport.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use kubemux_network::{
    config::MultiplexerConfig,
    error::MuxError,
    identity::{IdentityProvider, StaticIdentity},
    mode::ConnectionMode,
    multiplexer::{SubscriptionKey, WatchMultiplexer},
    transport::memory::{MemoryConnector, MemoryPeer, MemoryServer},
};
use rstest::{fixture, rstest};
use serde_json::{Value, json};

const PODS: &str = "/api/v1/namespaces/default/pods";
const NODES: &str = "/api/v1/nodes";
const EVENTS: &str = "/api/v1/events";

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<Value>>>);

impl Recorder {
    fn callback(&self) -> impl Fn(&Value) + Send + Sync + 'static {
        let events = Arc::clone(&self.0);
        move |payload: &Value| events.lock().unwrap().push(payload.clone())
    }

    fn events(&self) -> Vec<Value> {
        self.0.lock().unwrap().clone()
    }
}

/// Identity that panics while `failing` is set.
#[derive(Debug)]
struct FlakyIdentity {
    failing: Arc<AtomicBool>,
}

impl IdentityProvider for FlakyIdentity {
    fn user_id(&self) -> String {
        assert!(!self.failing.load(Ordering::SeqCst), "identity unavailable");
        "alice".to_string()
    }
}

struct Harness {
    mux: WatchMultiplexer,
    connector: MemoryConnector,
    server: MemoryServer,
}

#[fixture]
fn config() -> MultiplexerConfig {
    MultiplexerConfig {
        reconnect_jitter_ms: 0,
        ..Default::default()
    }
}

fn harness(config: MultiplexerConfig) -> Harness {
    let (connector, server) = MemoryConnector::new();
    let mux =
        WatchMultiplexer::new(config, connector.clone(), StaticIdentity::new("alice")).unwrap();
    Harness {
        mux,
        connector,
        server,
    }
}

fn data_frame(cluster: &str, path: &str, payload: &Value) -> Value {
    json!({
        "clusterId": cluster,
        "path": path,
        "query": "",
        "data": payload.to_string(),
    })
}

/// Returns `(type, path)` for each frame.
fn summarize(frames: &[Value]) -> Vec<(String, String)> {
    frames
        .iter()
        .map(|frame| {
            (
                frame["type"].as_str().unwrap_or_default().to_string(),
                frame["path"].as_str().unwrap_or_default().to_string(),
            )
        })
        .collect()
}

fn count_type(frames: &[Value], frame_type: &str) -> usize {
    frames.iter().filter(|f| f["type"] == frame_type).count()
}

/// Lets spawned tasks run; with paused time this also advances the clock by 1ms.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

async fn next_peer(server: &mut MemoryServer) -> MemoryPeer {
    tokio::time::timeout(Duration::from_secs(60), server.next_peer())
        .await
        .expect("no connection accepted")
        .expect("connector dropped")
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_first_subscribe_sends_request(config: MultiplexerConfig) {
    let Harness {
        mux, mut server, ..
    } = harness(config);

    let _sub = mux
        .subscribe("minikube", PODS, "watch=1", |_| {})
        .await
        .unwrap();
    let mut peer = next_peer(&mut server).await;

    let frames = peer.try_recv_frames();
    assert_eq!(
        frames,
        vec![json!({
            "clusterId": "minikube",
            "path": PODS,
            "query": "watch=1",
            "userId": "alice",
            "type": "REQUEST",
        })]
    );
    assert_eq!(mux.connection_mode(), ConnectionMode::Open);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_second_listener_shares_request(config: MultiplexerConfig) {
    let Harness {
        mux, mut server, ..
    } = harness(config);

    let _a = mux.subscribe("c1", PODS, "", |_| {}).await.unwrap();
    let _b = mux.subscribe("c1", PODS, "", |_| {}).await.unwrap();
    let mut peer = next_peer(&mut server).await;

    assert_eq!(count_type(&peer.try_recv_frames(), "REQUEST"), 1);
    assert_eq!(mux.listener_count(&SubscriptionKey::new("c1", PODS, "")), 2);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_disposer_is_idempotent(config: MultiplexerConfig) {
    let Harness {
        mux, mut server, ..
    } = harness(config);
    let key = SubscriptionKey::new("c1", PODS, "");
    let recorder = Recorder::default();

    let mut first = mux.subscribe("c1", PODS, "", |_| {}).await.unwrap();
    let _second = mux.subscribe("c1", PODS, "", recorder.callback()).await.unwrap();
    let peer = next_peer(&mut server).await;

    first.unsubscribe();
    first.unsubscribe();
    first.unsubscribe();

    assert!(!first.is_active());
    assert_eq!(mux.listener_count(&key), 1);
    assert!(!mux.is_teardown_pending(&key));

    peer.send_json(&data_frame("c1", PODS, &json!({"n": 1})));
    settle().await;
    assert_eq!(recorder.events(), vec![json!({"n": 1})]);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_repeated_dispose_does_not_cancel_teardown(config: MultiplexerConfig) {
    let Harness {
        mux, mut server, ..
    } = harness(config);
    let key = SubscriptionKey::new("c1", PODS, "");

    let mut sub = mux.subscribe("c1", PODS, "", |_| {}).await.unwrap();
    let mut peer = next_peer(&mut server).await;

    sub.unsubscribe();
    sub.unsubscribe();
    drop(sub);
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(!mux.is_active(&key));
    assert_eq!(count_type(&peer.try_recv_frames(), "CLOSE"), 1);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_resubscribe_within_delay_is_absorbed(config: MultiplexerConfig) {
    let Harness {
        mux, mut server, ..
    } = harness(config);
    let key = SubscriptionKey::new("c1", PODS, "");

    let mut sub = mux.subscribe("c1", PODS, "", |_| {}).await.unwrap();
    let mut peer = next_peer(&mut server).await;

    sub.unsubscribe();
    assert!(mux.is_teardown_pending(&key));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let _again = mux.subscribe("c1", PODS, "", |_| {}).await.unwrap();
    assert!(!mux.is_teardown_pending(&key));
    tokio::time::sleep(Duration::from_millis(200)).await;

    let frames = peer.try_recv_frames();
    assert_eq!(count_type(&frames, "REQUEST"), 1);
    assert_eq!(count_type(&frames, "CLOSE"), 0);
    assert!(mux.is_active(&key));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_teardown_after_delay_sends_one_close(config: MultiplexerConfig) {
    let Harness {
        mux, mut server, ..
    } = harness(config);
    let key = SubscriptionKey::new("c1", PODS, "");

    let mut sub = mux.subscribe("c1", PODS, "", |_| {}).await.unwrap();
    let mut peer = next_peer(&mut server).await;
    peer.try_recv_frames();

    sub.unsubscribe();
    tokio::time::sleep(Duration::from_millis(99)).await;
    assert!(mux.is_active(&key));

    tokio::time::sleep(Duration::from_millis(51)).await;

    let frames = peer.try_recv_frames();
    assert_eq!(summarize(&frames), vec![("CLOSE".to_string(), PODS.to_string())]);
    assert_eq!(frames[0]["userId"], "alice");
    assert!(!mux.is_active(&key));
    assert!(mux.active_keys().is_empty());
    assert!(mux.pending_teardowns().is_empty());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_detached_subscription_stays_registered(config: MultiplexerConfig) {
    let Harness {
        mux, mut server, ..
    } = harness(config);
    let recorder = Recorder::default();
    let key = SubscriptionKey::new("c1", PODS, "");

    mux.subscribe("c1", PODS, "", recorder.callback())
        .await
        .unwrap()
        .detach();
    let mut peer = next_peer(&mut server).await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    peer.send_json(&data_frame("c1", PODS, &json!({"n": 1})));
    settle().await;

    assert_eq!(recorder.events(), vec![json!({"n": 1})]);
    assert_eq!(mux.listener_count(&key), 1);
    assert!(mux.is_active(&key));
    assert!(!mux.is_teardown_pending(&key));
    assert_eq!(
        summarize(&peer.try_recv_frames()),
        vec![("REQUEST".to_string(), PODS.to_string())]
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_fan_out_to_every_listener_of_key(config: MultiplexerConfig) {
    let Harness {
        mux, mut server, ..
    } = harness(config);
    let first = Recorder::default();
    let second = Recorder::default();
    let other = Recorder::default();

    let _a = mux.subscribe("c1", PODS, "", first.callback()).await.unwrap();
    let _b = mux.subscribe("c1", PODS, "", second.callback()).await.unwrap();
    let _c = mux.subscribe("c1", NODES, "", other.callback()).await.unwrap();
    let peer = next_peer(&mut server).await;

    for n in 0..3 {
        peer.send_json(&data_frame("c1", PODS, &json!({"n": n})));
    }
    settle().await;

    let expected = vec![json!({"n": 0}), json!({"n": 1}), json!({"n": 2})];
    assert_eq!(first.events(), expected);
    assert_eq!(second.events(), expected);
    assert!(other.events().is_empty());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_concurrent_subscribers_converge_on_one_connection(config: MultiplexerConfig) {
    let Harness {
        mux,
        connector,
        mut server,
    } = harness(config);
    connector.set_connect_delay(Some(Duration::from_millis(10)));

    let (a, b, c) = tokio::join!(
        mux.subscribe("c1", PODS, "", |_| {}),
        mux.subscribe("c1", NODES, "", |_| {}),
        mux.subscribe("c2", PODS, "", |_| {}),
    );
    let (_a, _b, _c) = (a.unwrap(), b.unwrap(), c.unwrap());
    let mut peer = next_peer(&mut server).await;

    assert_eq!(connector.attempts(), 1);
    assert!(server.try_next_peer().is_none());
    assert_eq!(count_type(&peer.try_recv_frames(), "REQUEST"), 3);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_reconnect_resubscribes_exactly_active_keys(config: MultiplexerConfig) {
    let Harness {
        mux,
        connector,
        mut server,
    } = harness(config);

    let _k1 = mux.subscribe("c1", PODS, "", |_| {}).await.unwrap();
    let _k2 = mux.subscribe("c1", NODES, "", |_| {}).await.unwrap();
    let mut k3 = mux.subscribe("c1", EVENTS, "", |_| {}).await.unwrap();
    let first_peer = next_peer(&mut server).await;

    k3.unsubscribe();
    tokio::time::sleep(Duration::from_millis(150)).await;

    first_peer.close(Some("server restart"));
    settle().await;
    assert_eq!(mux.connection_mode(), ConnectionMode::Dropped);

    // Reconnects lazily on the next subscribe
    let _k1_again = mux.subscribe("c1", PODS, "", |_| {}).await.unwrap();
    let mut second_peer = next_peer(&mut server).await;

    // Replayed in key order, and the new listener adds no duplicate REQUEST
    assert_eq!(
        summarize(&second_peer.try_recv_frames()),
        vec![
            ("REQUEST".to_string(), PODS.to_string()),
            ("REQUEST".to_string(), NODES.to_string()),
        ]
    );
    assert_eq!(connector.attempts(), 2);
    assert_eq!(mux.connection_mode(), ConnectionMode::Open);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_malformed_frames_are_isolated(config: MultiplexerConfig) {
    let Harness {
        mux, mut server, ..
    } = harness(config);
    let recorder = Recorder::default();

    let _sub = mux.subscribe("c1", PODS, "", recorder.callback()).await.unwrap();
    let peer = next_peer(&mut server).await;

    peer.send_text("not json at all");
    peer.send_json(&json!({"path": PODS, "data": "{}"}));
    peer.send_json(&json!({"clusterId": "c1", "path": PODS, "data": "{broken"}));
    peer.send_json(&json!({"clusterId": "c1", "path": PODS}));
    peer.send_json(&json!({"clusterId": "c1", "path": PODS, "type": "BOGUS"}));
    peer.send_json(&data_frame("c1", PODS, &json!({"ok": true})));
    settle().await;

    assert_eq!(recorder.events(), vec![json!({"ok": true})]);
    assert_eq!(mux.connection_mode(), ConnectionMode::Open);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_complete_marks_key_without_dispatch(config: MultiplexerConfig) {
    let Harness {
        mux, mut server, ..
    } = harness(config);
    let recorder = Recorder::default();
    let key = SubscriptionKey::new("c1", PODS, "");

    let _sub = mux.subscribe("c1", PODS, "", recorder.callback()).await.unwrap();
    let peer = next_peer(&mut server).await;

    peer.send_json(&data_frame("c1", PODS, &json!({"type": "ADDED"})));
    peer.send_json(&json!({"clusterId": "c1", "path": PODS, "query": "", "type": "COMPLETE"}));
    settle().await;

    assert_eq!(recorder.events(), vec![json!({"type": "ADDED"})]);
    assert!(mux.is_completed(&key));
    assert_eq!(mux.completed_keys(), vec![key]);

    peer.close(None);
    settle().await;
    assert!(!mux.is_completed(&key));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_complete_for_unknown_key_is_ignored(config: MultiplexerConfig) {
    let Harness {
        mux, mut server, ..
    } = harness(config);

    let _sub = mux.subscribe("c1", PODS, "", |_| {}).await.unwrap();
    let peer = next_peer(&mut server).await;

    peer.send_json(&json!({"clusterId": "c1", "path": NODES, "type": "COMPLETE"}));
    settle().await;

    assert!(mux.completed_keys().is_empty());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_connect_timeout_fails_every_waiter(config: MultiplexerConfig) {
    let Harness {
        mux,
        connector,
        mut server,
    } = harness(config);
    connector.set_hang(true);

    let (a, b) = tokio::join!(
        mux.subscribe("c1", PODS, "", |_| {}),
        mux.subscribe("c1", NODES, "", |_| {}),
    );

    let timeout = MuxError::Timeout(Duration::from_secs(30));
    assert_eq!(a.unwrap_err(), timeout);
    assert_eq!(b.unwrap_err(), timeout);
    assert_eq!(connector.attempts(), 1);
    assert_eq!(mux.listener_count(&SubscriptionKey::new("c1", PODS, "")), 0);

    connector.set_hang(false);
    let _sub = mux.subscribe("c1", PODS, "", |_| {}).await.unwrap();

    assert_eq!(connector.attempts(), 2);
    assert!(server.try_next_peer().is_some());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_disconnect_abandons_in_flight_attempt(config: MultiplexerConfig) {
    let Harness {
        mux,
        connector,
        mut server,
    } = harness(MultiplexerConfig {
        unsubscribe_delay_ms: 20,
        ..config
    });
    connector.set_connect_delay(Some(Duration::from_millis(100)));

    let first = tokio::spawn({
        let mux = mux.clone();
        async move { mux.subscribe("c1", PODS, "", |_| {}).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    mux.disconnect();

    let result = first.await.unwrap();
    assert_eq!(
        result.unwrap_err(),
        MuxError::Connect("disconnected".to_string())
    );

    let second = tokio::spawn({
        let mux = mux.clone();
        async move { mux.subscribe("c1", NODES, "", |_| {}).await }
    });

    // Past the point where the abandoned attempt would have opened
    tokio::time::sleep(Duration::from_millis(95)).await;
    assert_eq!(connector.attempts(), 2);
    assert!(server.try_next_peer().is_none());

    let _sub = second.await.unwrap().unwrap();
    let mut peer = next_peer(&mut server).await;

    assert!(server.try_next_peer().is_none());
    assert_eq!(
        summarize(&peer.try_recv_frames()),
        vec![("REQUEST".to_string(), NODES.to_string())]
    );
    assert!(!mux.is_active(&SubscriptionKey::new("c1", PODS, "")));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_refused_connect_rolls_back_listener(config: MultiplexerConfig) {
    let Harness {
        mux, connector, ..
    } = harness(config);
    let key = SubscriptionKey::new("c1", PODS, "");
    connector.refuse_next(1);

    let result = mux.subscribe("c1", PODS, "", |_| {}).await;

    assert!(matches!(result, Err(MuxError::Connect(_))));
    assert_eq!(mux.listener_count(&key), 0);
    assert!(mux.is_teardown_pending(&key));

    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(!mux.is_active(&key));
    assert_eq!(mux.connection_mode(), ConnectionMode::Absent);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_panicking_listener_does_not_starve_others(config: MultiplexerConfig) {
    let Harness {
        mux, mut server, ..
    } = harness(config);
    let recorder = Recorder::default();

    let _bad = mux
        .subscribe("c1", PODS, "", |_| panic!("listener failure"))
        .await
        .unwrap();
    let _good = mux.subscribe("c1", PODS, "", recorder.callback()).await.unwrap();
    let peer = next_peer(&mut server).await;

    peer.send_json(&data_frame("c1", PODS, &json!({"n": 1})));
    peer.send_json(&data_frame("c1", PODS, &json!({"n": 2})));
    settle().await;

    assert_eq!(recorder.events(), vec![json!({"n": 1}), json!({"n": 2})]);
    assert_eq!(mux.connection_mode(), ConnectionMode::Open);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_close_skipped_while_disconnected(config: MultiplexerConfig) {
    let Harness {
        mux, mut server, ..
    } = harness(config);

    let mut sub = mux.subscribe("c1", PODS, "", |_| {}).await.unwrap();
    let first_peer = next_peer(&mut server).await;
    first_peer.close(None);
    settle().await;

    sub.unsubscribe();
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(mux.active_keys().is_empty());
    assert_eq!(mux.connection_mode(), ConnectionMode::Absent);

    // The torn down key is not replayed on the next connection
    let _other = mux.subscribe("c1", NODES, "", |_| {}).await.unwrap();
    let mut second_peer = next_peer(&mut server).await;
    assert_eq!(
        summarize(&second_peer.try_recv_frames()),
        vec![("REQUEST".to_string(), NODES.to_string())]
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_pending_teardown_replayed_then_closed(config: MultiplexerConfig) {
    let Harness {
        mux, mut server, ..
    } = harness(config);

    let _k1 = mux.subscribe("c1", PODS, "", |_| {}).await.unwrap();
    let mut k2 = mux.subscribe("c1", NODES, "", |_| {}).await.unwrap();
    let first_peer = next_peer(&mut server).await;

    k2.unsubscribe();
    first_peer.close(None);
    settle().await;

    let _k1_again = mux.subscribe("c1", PODS, "", |_| {}).await.unwrap();
    let mut second_peer = next_peer(&mut server).await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    let frames = summarize(&second_peer.try_recv_frames());
    assert_eq!(frames.len(), 3);
    assert!(frames.contains(&("REQUEST".to_string(), PODS.to_string())));
    assert!(frames.contains(&("REQUEST".to_string(), NODES.to_string())));
    assert_eq!(frames[2], ("CLOSE".to_string(), NODES.to_string()));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_pending_teardown_not_replayed_when_disabled() {
    let Harness {
        mux, mut server, ..
    } = harness(MultiplexerConfig {
        resubscribe_pending: false,
        ..Default::default()
    });

    let _k1 = mux.subscribe("c1", PODS, "", |_| {}).await.unwrap();
    let mut k2 = mux.subscribe("c1", NODES, "", |_| {}).await.unwrap();
    let first_peer = next_peer(&mut server).await;

    k2.unsubscribe();
    first_peer.close(None);
    settle().await;

    let _k1_again = mux.subscribe("c1", PODS, "", |_| {}).await.unwrap();
    let mut second_peer = next_peer(&mut server).await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(
        summarize(&second_peer.try_recv_frames()),
        vec![
            ("REQUEST".to_string(), PODS.to_string()),
            ("CLOSE".to_string(), NODES.to_string()),
        ]
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_stale_connection_events_are_ignored(config: MultiplexerConfig) {
    let Harness {
        mux, mut server, ..
    } = harness(config);
    let recorder = Recorder::default();

    let _sub = mux.subscribe("c1", PODS, "", recorder.callback()).await.unwrap();
    let first_peer = next_peer(&mut server).await;
    let first_id = mux.connection_id().unwrap();

    mux.disconnect();
    assert_eq!(mux.connection_mode(), ConnectionMode::Dropped);

    let _other = mux.subscribe("c1", NODES, "", |_| {}).await.unwrap();
    let _second_peer = next_peer(&mut server).await;
    let second_id = mux.connection_id().unwrap();
    assert_ne!(first_id, second_id);

    first_peer.send_json(&data_frame("c1", PODS, &json!({"stale": true})));
    first_peer.close(None);
    settle().await;

    assert_eq!(mux.connection_mode(), ConnectionMode::Open);
    assert_eq!(mux.connection_id(), Some(second_id));
    assert!(recorder.events().is_empty());
    assert!(first_peer.is_released());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_auto_reconnect_resubscribes_after_drop() {
    let Harness {
        mux,
        connector,
        mut server,
    } = harness(MultiplexerConfig {
        auto_reconnect: true,
        reconnect_jitter_ms: 0,
        ..Default::default()
    });

    let _sub = mux.subscribe("c1", PODS, "", |_| {}).await.unwrap();
    let first_peer = next_peer(&mut server).await;

    connector.refuse_next(2);
    first_peer.fail("connection reset");

    let mut second_peer = next_peer(&mut server).await;

    assert_eq!(connector.attempts(), 4);
    assert_eq!(
        summarize(&second_peer.try_recv_frames()),
        vec![("REQUEST".to_string(), PODS.to_string())]
    );
    assert_eq!(mux.connection_mode(), ConnectionMode::Open);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_auto_reconnect_stops_without_subscriptions() {
    let Harness {
        mux,
        connector,
        mut server,
    } = harness(MultiplexerConfig {
        auto_reconnect: true,
        reconnect_jitter_ms: 0,
        ..Default::default()
    });

    let mut sub = mux.subscribe("c1", PODS, "", |_| {}).await.unwrap();
    let first_peer = next_peer(&mut server).await;

    connector.refuse_next(usize::MAX);
    first_peer.close(None);
    settle().await;
    sub.unsubscribe();
    tokio::time::sleep(Duration::from_secs(30)).await;
    let attempts = connector.attempts();
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(connector.attempts(), attempts);
    assert_eq!(mux.connection_mode(), ConnectionMode::Absent);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_failing_identity_does_not_poison_state(config: MultiplexerConfig) {
    let failing = Arc::new(AtomicBool::new(false));
    let (connector, mut server) = MemoryConnector::new();
    let identity = FlakyIdentity {
        failing: Arc::clone(&failing),
    };
    let mux = WatchMultiplexer::new(config, connector, identity).unwrap();
    let pods = SubscriptionKey::new("c1", PODS, "");

    let _nodes = mux.subscribe("c1", NODES, "", |_| {}).await.unwrap();
    let _peer = next_peer(&mut server).await;

    failing.store(true, Ordering::SeqCst);
    let result = tokio::spawn({
        let mux = mux.clone();
        async move { mux.subscribe("c1", PODS, "", |_| {}).await.map(|_| ()) }
    })
    .await;
    failing.store(false, Ordering::SeqCst);

    assert!(result.unwrap_err().is_panic());
    assert_eq!(mux.listener_count(&pods), 0);
    assert!(mux.is_teardown_pending(&pods));

    let _events = mux.subscribe("c1", EVENTS, "", |_| {}).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(!mux.is_active(&pods));
    assert_eq!(mux.active_keys().len(), 2);
    assert_eq!(mux.connection_mode(), ConnectionMode::Open);
}
