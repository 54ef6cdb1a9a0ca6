use std::{
    collections::BTreeSet,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use tokio::{net::UdpSocket, sync::Notify, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    lock::LeaderLock,
    types::{ClusterProcessKey, GossipMessage, NodeId},
    view::{Heartbeat, ReplicatedView},
};
use crate::{
    error::{ConfigError, StateError},
    process::ProcessRole,
    settings::ClusterConfig,
    state::{AppState, Listener},
};

/// Extra ports tried when `cluster.port_autoincrement` is set.
const PORT_ATTEMPTS: u16 = 100;
const MAX_DATAGRAM: usize = 64 * 1024;

/// Gossip and failure-detection timings.
#[derive(Debug, Clone, Copy)]
pub struct ClusterTimings {
    /// Heartbeat period (a random jitter of up to 20% is added).
    pub gossip_interval: Duration,
    /// How often silent peers are looked for.
    pub failure_detection_interval: Duration,
    /// Silence after which a peer is dead and its keys and claim are dropped.
    pub dead_timeout: Duration,
    /// Wait between claiming the leader lock and deciding who won.
    pub settle_window: Duration,
}

impl Default for ClusterTimings {
    fn default() -> Self {
        let gossip_interval = Duration::from_millis(500);
        Self {
            gossip_interval,
            failure_detection_interval: Duration::from_secs(1),
            dead_timeout: Duration::from_secs(5),
            settle_window: gossip_interval * 3,
        }
    }
}

#[derive(Debug, Default)]
struct LocalNode {
    incarnation: u64,
    operational: BTreeSet<ProcessRole>,
    lock: LeaderLock,
}

struct Node {
    id: NodeId,
    cluster: String,
    socket: UdpSocket,
    local_addr: SocketAddr,
    seeds: Vec<SocketAddr>,
    view: ReplicatedView,
    local: Mutex<LocalNode>,
    listeners: RwLock<Vec<Listener>>,
    changed: Notify,
    timings: ClusterTimings,
    token: CancellationToken,
}

/// [`AppState`] replicated across every supervisor sharing the same cluster name.
///
/// Owns a UDP socket and three background tasks (gossip, receive, failure
/// detection); they stop on [`AppState::close`] or when the value is dropped.
pub struct ClusterAppState {
    node: Arc<Node>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ClusterAppState {
    /// Joins the cluster described by `config` with default timings.
    ///
    /// Fails with [`ConfigError::ClusterDisabled`] when cluster mode is off.
    pub async fn start(config: ClusterConfig) -> Result<Self, StateError> {
        Self::start_with(config, ClusterTimings::default()).await
    }

    /// Joins the cluster described by `config`.
    pub async fn start_with(config: ClusterConfig, timings: ClusterTimings) -> Result<Self, StateError> {
        if !config.is_enabled() {
            return Err(ConfigError::ClusterDisabled.into());
        }
        let socket = bind(&config).await?;
        let local_addr = socket.local_addr().map_err(|source| StateError::Bind {
            addr: SocketAddr::new(bind_ip(&config), config.port()),
            source,
        })?;
        let seeds = resolve(config.members(), local_addr).await;

        let node = Arc::new(Node {
            id: NodeId::new(),
            cluster: config.name().to_owned(),
            socket,
            local_addr,
            seeds,
            view: ReplicatedView::new(),
            local: Mutex::new(LocalNode::default()),
            listeners: RwLock::new(Vec::new()),
            changed: Notify::new(),
            timings,
            token: CancellationToken::new(),
        });
        info!(
            node = %node.id,
            cluster = %node.cluster,
            addr = %local_addr,
            seeds = node.seeds.len(),
            "joined cluster"
        );

        let tasks = vec![
            tokio::spawn(Arc::clone(&node).gossip_loop()),
            tokio::spawn(Arc::clone(&node).receive_loop()),
            tokio::spawn(Arc::clone(&node).failure_detection_loop()),
        ];
        Ok(Self {
            node,
            tasks: Mutex::new(tasks),
        })
    }

    /// This node's identifier.
    pub fn node_id(&self) -> NodeId {
        self.node.id
    }

    /// Address the gossip socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.node.local_addr
    }

    /// Value of one key of the replicated view (local keys included).
    pub fn get(&self, key: ClusterProcessKey) -> bool {
        if key.node == self.node.id {
            self.node.local.lock().operational.contains(&key.role)
        } else {
            self.node.view.get(key)
        }
    }

    /// Every key currently `true`, local ones first.
    pub fn operational_keys(&self) -> Vec<ClusterProcessKey> {
        let mut keys: Vec<ClusterProcessKey> = self
            .node
            .local
            .lock()
            .operational
            .iter()
            .map(|role| ClusterProcessKey::new(self.node.id, *role))
            .collect();
        keys.extend(self.node.view.keys());
        keys
    }

    /// Number of live peers (this node excluded).
    pub fn peer_count(&self) -> usize {
        self.node.view.len()
    }

    /// True while this node holds the web leader lock.
    pub fn is_web_leader(&self) -> bool {
        self.node.local.lock().lock.is_held()
    }
}

#[async_trait]
impl AppState for ClusterAppState {
    fn is_operational(&self, role: ProcessRole) -> bool {
        self.node.local.lock().operational.contains(&role) || self.node.view.any_operational(role)
    }

    fn set_operational(&self, role: ProcessRole) {
        let raised = self.node.local.lock().operational.insert(role);
        if raised {
            self.node.changed.notify_one();
            self.node.notify(&[role]);
        }
    }

    fn add_listener(&self, listener: Listener) {
        self.node.listeners.write().push(listener);
    }

    async fn try_acquire_web_leader_lock(&self) -> bool {
        let node = &self.node;
        if !node.view.claims().is_empty() {
            debug!(node = %node.id, "web leader lock claimed by a peer");
            return false;
        }
        let claimed_at = unix_millis();
        if !node.local.lock().lock.begin(claimed_at) {
            return false;
        }
        node.broadcast_heartbeat().await;

        tokio::select! {
            _ = node.token.cancelled() => {
                node.local.lock().lock.release();
                return false;
            }
            _ = tokio::time::sleep(node.timings.settle_window) => {}
        }

        let won = node.local.lock().lock.settle(node.id, node.view.claims());
        node.broadcast_heartbeat().await;
        if won {
            info!(node = %node.id, cluster = %node.cluster, "web leader lock acquired");
        } else {
            info!(node = %node.id, cluster = %node.cluster, "web leader lock lost to a peer");
        }
        won
    }

    async fn reset(&self) {
        {
            let mut local = self.node.local.lock();
            local.operational.clear();
            local.incarnation += 1;
            local.lock.release();
        }
        debug!(node = %self.node.id, "local operational keys reset");
        self.node.broadcast_heartbeat().await;
    }

    async fn close(&self) {
        if self.node.token.is_cancelled() {
            return;
        }
        let leave = GossipMessage::Leave {
            cluster: self.node.cluster.clone(),
            from: self.node.id,
        };
        self.node.broadcast(&leave).await;
        self.node.token.cancel();

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            let _ = task.await;
        }
        self.node.listeners.write().clear();
        info!(node = %self.node.id, "left cluster");
    }
}

impl Drop for ClusterAppState {
    fn drop(&mut self) {
        self.node.token.cancel();
    }
}

impl Node {
    fn notify(&self, roles: &[ProcessRole]) {
        let listeners = self.listeners.read();
        for role in roles {
            for listener in listeners.iter() {
                listener(*role);
            }
        }
    }

    fn heartbeat(&self) -> GossipMessage {
        let local = self.local.lock();
        GossipMessage::Heartbeat {
            cluster: self.cluster.clone(),
            from: self.id,
            incarnation: local.incarnation,
            operational: local.operational.iter().copied().collect(),
            leader_claim: local.lock.claim(),
        }
    }

    async fn broadcast_heartbeat(&self) {
        let msg = self.heartbeat();
        self.broadcast(&msg).await;
    }

    async fn broadcast(&self, msg: &GossipMessage) {
        let encoded = match bincode::serialize(msg) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "failed to encode gossip message");
                return;
            }
        };
        let mut targets = self.seeds.clone();
        for addr in self.view.addrs() {
            if !targets.contains(&addr) {
                targets.push(addr);
            }
        }
        for target in targets {
            if let Err(e) = self.socket.send_to(&encoded, target).await {
                debug!(%target, error = %e, "failed to send gossip message");
            }
        }
    }

    async fn gossip_loop(self: Arc<Self>) {
        let period = self.timings.gossip_interval;
        loop {
            let jitter_ms = rand::rng().random_range(0..=period.as_millis() as u64 / 5);
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = self.changed.notified() => {}
                _ = tokio::time::sleep(period + Duration::from_millis(jitter_ms)) => {}
            }
            self.broadcast_heartbeat().await;
        }
    }

    async fn receive_loop(self: Arc<Self>) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let received = tokio::select! {
                _ = self.token.cancelled() => break,
                r = self.socket.recv_from(&mut buf) => r,
            };
            match received {
                Ok((len, src)) => match bincode::deserialize::<GossipMessage>(&buf[..len]) {
                    Ok(msg) => self.handle(msg, src).await,
                    Err(e) => debug!(%src, error = %e, "dropping undecodable datagram"),
                },
                Err(e) => {
                    warn!(error = %e, "failed to receive gossip datagram");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    async fn handle(&self, msg: GossipMessage, src: SocketAddr) {
        if msg.cluster() != self.cluster {
            debug!(%src, cluster = msg.cluster(), "ignoring message from another cluster");
            return;
        }
        if msg.from() == self.id {
            return;
        }
        match msg {
            GossipMessage::Heartbeat {
                from,
                incarnation,
                operational,
                leader_claim,
                ..
            } => {
                let applied = self.view.apply(
                    Heartbeat {
                        from,
                        addr: src,
                        incarnation,
                        operational: &operational,
                        claim: leader_claim,
                    },
                    Instant::now(),
                );
                if applied.discovered {
                    info!(peer = %from, addr = %src, peers = self.view.len(), "discovered cluster peer");
                    // answer at once so the newcomer does not wait a full gossip period
                    let reply = self.heartbeat();
                    if let Ok(bytes) = bincode::serialize(&reply) {
                        let _ = self.socket.send_to(&bytes, src).await;
                    }
                }
                for role in &applied.raised {
                    debug!(peer = %from, %role, "remote process became operational");
                }
                self.notify(&applied.raised);
            }
            GossipMessage::Leave { from, .. } => {
                if self.view.depart(from, Instant::now()) {
                    info!(peer = %from, peers = self.view.len(), "cluster peer left");
                }
            }
        }
    }

    async fn failure_detection_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.timings.failure_detection_interval);
        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = interval.tick() => {}
            }
            for peer in self.view.expire(Instant::now(), self.timings.dead_timeout) {
                warn!(
                    peer = %peer,
                    timeout = ?self.timings.dead_timeout,
                    "cluster peer declared dead, dropping its keys and lock claim"
                );
            }
        }
    }
}

fn bind_ip(config: &ClusterConfig) -> IpAddr {
    config
        .interfaces()
        .first()
        .copied()
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

async fn bind(config: &ClusterConfig) -> Result<UdpSocket, StateError> {
    let mut addr = SocketAddr::new(bind_ip(config), config.port());
    let mut attempt = 0;
    loop {
        match UdpSocket::bind(addr).await {
            Ok(socket) => return Ok(socket),
            Err(source) => {
                attempt += 1;
                let next = addr
                    .port()
                    .checked_add(1)
                    .filter(|_| config.is_port_autoincrement() && attempt < PORT_ATTEMPTS);
                match next {
                    Some(port) => {
                        debug!(%addr, error = %source, "cluster port taken, trying next");
                        addr.set_port(port);
                    }
                    None => return Err(StateError::Bind { addr, source }),
                }
            }
        }
    }
}

async fn resolve(members: &[String], local_addr: SocketAddr) -> Vec<SocketAddr> {
    let mut seeds = Vec::new();
    for member in members {
        match tokio::net::lookup_host(member.as_str()).await {
            Ok(addrs) => {
                for addr in addrs {
                    if addr != local_addr && !seeds.contains(&addr) {
                        seeds.push(addr);
                    }
                }
            }
            Err(e) => warn!(member = %member, error = %e, "cannot resolve cluster member"),
        }
    }
    seeds
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
