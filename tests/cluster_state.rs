use std::{
    net::{SocketAddr, UdpSocket},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use appvisor::{
    AppState, ClusterAppState, ClusterConfig, ClusterProcessKey, ClusterTimings, ProcessRole, Props,
    build_app_state, settings::keys,
};

fn timings() -> ClusterTimings {
    ClusterTimings {
        gossip_interval: Duration::from_millis(20),
        failure_detection_interval: Duration::from_millis(20),
        dead_timeout: Duration::from_millis(300),
        settle_window: Duration::from_millis(100),
    }
}

fn free_port() -> u16 {
    UdpSocket::bind("127.0.0.1:0")
        .and_then(|s| s.local_addr())
        .map(|a| a.port())
        .unwrap()
}

fn config(cluster: &str, seeds: &[SocketAddr]) -> ClusterConfig {
    let mut props = Props::new();
    props
        .set(keys::CLUSTER_ENABLED, "true")
        .set(keys::CLUSTER_NAME, cluster)
        .set(keys::CLUSTER_PORT, free_port().to_string())
        .set(keys::CLUSTER_PORT_AUTOINCREMENT, "true")
        .set(keys::CLUSTER_INTERFACES, "127.0.0.1");
    if !seeds.is_empty() {
        let members: Vec<String> = seeds.iter().map(ToString::to_string).collect();
        props.set(keys::CLUSTER_MEMBERS, members.join(","));
    }
    ClusterConfig::from_props(&props).unwrap()
}

async fn node(cluster: &str, seeds: &[SocketAddr]) -> ClusterAppState {
    ClusterAppState::start_with(config(cluster, seeds), timings())
        .await
        .unwrap()
}

/// Two nodes that have heard from each other.
async fn pair() -> (ClusterAppState, ClusterAppState) {
    let a = node("it", &[]).await;
    let b = node("it", &[a.local_addr()]).await;
    eventually("nodes to discover each other", || a.peer_count() == 1 && b.peer_count() == 1).await;
    (a, b)
}

async fn eventually<F: Fn() -> bool>(what: &str, cond: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn counting(state: &dyn AppState, role: ProcessRole) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&count);
    state.add_listener(Box::new(move |r| {
        if r == role {
            sink.fetch_add(1, Ordering::SeqCst);
        }
    }));
    count
}

#[tokio::test]
async fn test_cluster_state_requires_cluster_mode() {
    let err = ClusterAppState::start(ClusterConfig::default()).await.err().unwrap();
    assert_eq!(err.as_label(), "config_cluster_disabled");
    assert_eq!(err.to_string(), "cluster is not enabled on this instance");
}

#[tokio::test]
async fn test_build_app_state_picks_local_when_disabled() {
    let state = build_app_state(&ClusterConfig::default()).await.unwrap();
    assert!(!state.is_operational(ProcessRole::Search));
    assert!(state.try_acquire_web_leader_lock().await);
    state.close().await;
}

#[tokio::test]
async fn test_port_autoincrement_skips_taken_port() {
    let taken = UdpSocket::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();

    let mut props = Props::new();
    props
        .set(keys::CLUSTER_ENABLED, "true")
        .set(keys::CLUSTER_NAME, "it")
        .set(keys::CLUSTER_PORT, port.to_string())
        .set(keys::CLUSTER_INTERFACES, "127.0.0.1");
    let strict = ClusterConfig::from_props(&props).unwrap();
    let err = ClusterAppState::start_with(strict, timings()).await.err().unwrap();
    assert_eq!(err.as_label(), "state_bind");

    props.set(keys::CLUSTER_PORT_AUTOINCREMENT, "true");
    let lenient = ClusterConfig::from_props(&props).unwrap();
    let state = ClusterAppState::start_with(lenient, timings()).await.unwrap();
    assert_ne!(state.local_addr().port(), port);
    state.close().await;
}

#[tokio::test]
async fn test_remote_transition_notifies_once() {
    let (a, b) = pair().await;
    let seen = counting(&b, ProcessRole::Search);

    a.set_operational(ProcessRole::Search);
    eventually("remote search flag", || b.is_operational(ProcessRole::Search)).await;
    assert!(b.get(ClusterProcessKey::new(a.node_id(), ProcessRole::Search)));
    assert!(!b.is_operational(ProcessRole::Web));

    // further heartbeats repeat the same value
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    a.close().await;
    b.close().await;
}

#[tokio::test]
async fn test_reset_propagates_and_allows_a_new_transition() {
    let (a, b) = pair().await;
    let seen = counting(&b, ProcessRole::Web);

    a.set_operational(ProcessRole::Web);
    eventually("remote web flag", || b.is_operational(ProcessRole::Web)).await;

    a.reset().await;
    assert!(!a.is_operational(ProcessRole::Web));
    eventually("remote web flag cleared", || !b.is_operational(ProcessRole::Web)).await;

    a.set_operational(ProcessRole::Web);
    eventually("second transition", || seen.load(Ordering::SeqCst) == 2).await;

    a.close().await;
    b.close().await;
}

#[tokio::test]
async fn test_other_cluster_is_ignored() {
    let a = node("blue", &[]).await;
    let b = node("green", &[a.local_addr()]).await;

    b.set_operational(ProcessRole::Search);
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(a.peer_count(), 0);
    assert!(!a.is_operational(ProcessRole::Search));

    a.close().await;
    b.close().await;
}

#[tokio::test]
async fn test_leader_lock_is_exclusive() {
    let (a, b) = pair().await;

    assert!(a.try_acquire_web_leader_lock().await);
    assert!(a.is_web_leader());
    // a holder asking again gets nothing more
    assert!(!a.try_acquire_web_leader_lock().await);

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(!b.try_acquire_web_leader_lock().await);
    assert!(!b.is_web_leader());

    a.close().await;
    b.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_contenders_elect_one_leader() {
    let (a, b) = pair().await;
    let (a, b) = (Arc::new(a), Arc::new(b));

    let ta = tokio::spawn({
        let a = Arc::clone(&a);
        async move { a.try_acquire_web_leader_lock().await }
    });
    let tb = tokio::spawn({
        let b = Arc::clone(&b);
        async move { b.try_acquire_web_leader_lock().await }
    });
    let won_a = ta.await.unwrap();
    let won_b = tb.await.unwrap();

    assert!(won_a ^ won_b, "a: {won_a}, b: {won_b}");
    assert_eq!(a.is_web_leader(), won_a);
    assert_eq!(b.is_web_leader(), won_b);

    a.close().await;
    b.close().await;
}

#[tokio::test]
async fn test_lock_released_when_holder_leaves() {
    let (a, b) = pair().await;
    assert!(a.try_acquire_web_leader_lock().await);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(!b.try_acquire_web_leader_lock().await);

    a.close().await;
    eventually("holder departure", || b.peer_count() == 0).await;
    assert!(b.try_acquire_web_leader_lock().await);

    b.close().await;
}

#[tokio::test]
async fn test_lock_released_when_holder_fails() {
    let (a, b) = pair().await;
    a.set_operational(ProcessRole::Search);
    assert!(a.try_acquire_web_leader_lock().await);
    eventually("remote search flag", || b.is_operational(ProcessRole::Search)).await;

    // dropped without a leave message: only failure detection can notice
    drop(a);
    eventually("holder declared dead", || b.peer_count() == 0).await;
    assert!(!b.is_operational(ProcessRole::Search));
    assert!(b.try_acquire_web_leader_lock().await);

    b.close().await;
}

#[tokio::test]
async fn test_reset_releases_the_lock() {
    let (a, b) = pair().await;
    assert!(a.try_acquire_web_leader_lock().await);

    a.reset().await;
    assert!(!a.is_web_leader());
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(b.try_acquire_web_leader_lock().await);

    a.close().await;
    b.close().await;
}
