//! Blind-counter rumor mongering.
//!
//! Every message carries a patience counter F. A node that pushes or relays a
//! message sends it to up to B peers that have not seen it yet (as far as this
//! node knows) and then decrements the counter. Once the counter reaches zero
//! further copies are dropped, and a periodic sweep deletes the entry.
//!
//! # Tasks
//!
//! - **Dissemination loop**: the only writer of patience. Waits on, in order
//!   of priority, the stop signal, "push now" requests, the optional push
//!   interval and relay candidates from every observed subject (fanned into one
//!   queue).
//! - **Cleaner**: removes zero-patience entries every `cleanup_interval`.
//!
//! The history lock is never held across a peer call. The loop snapshots the
//! notified set, talks to peers, then re-locks to record the result.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};
use vivaldi_core::{
    ChannelId, ChannelSubject, Clock, CoreError, CoreGate, Envelope, ForwardCandidate, Guid, Support,
    SystemClock,
};

use crate::config::GossipConfig;
use crate::error::{GossipError, Result};
use crate::peers::{PeerMap, SharedChannel};

type ForwardReceiver<S> = mpsc::UnboundedReceiver<ForwardCandidate<S>>;

/// Per-message bookkeeping.
#[derive(Debug, Clone)]
struct HistoryEntry {
    patience: u32,
    notified: HashSet<Guid>,
}

impl HistoryEntry {
    fn new(patience: u32) -> Self {
        Self {
            patience,
            notified: HashSet::new(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Hop {
    Origin,
    Relay,
}

/// State shared by the gossiper handle and its tasks.
struct Shared<S: Support> {
    core: Arc<dyn CoreGate<S>>,
    peers: Arc<PeerMap<S>>,
    config: GossipConfig,
    clock: Arc<dyn Clock>,
    history: Mutex<HashMap<Guid, HistoryEntry>>,
}

struct Running<S: Support> {
    stop: watch::Sender<bool>,
    inserts: mpsc::Sender<()>,
    disseminator: JoinHandle<ForwardReceiver<S>>,
    cleaner: JoinHandle<()>,
}

/// Gossip engine for one coordinate core.
pub struct BlindCounterGossiper<S: Support> {
    shared: Arc<Shared<S>>,
    forward_tx: mpsc::UnboundedSender<ForwardCandidate<S>>,
    /// Parked here while stopped, owned by the loop while running.
    forward_rx: Mutex<Option<ForwardReceiver<S>>>,
    running: Mutex<Option<Running<S>>>,
}

impl<S: Support> BlindCounterGossiper<S> {
    /// Create a stopped gossiper.
    pub fn new(core: Arc<dyn CoreGate<S>>, peers: Arc<PeerMap<S>>, config: GossipConfig) -> Result<Self> {
        Self::with_clock(core, peers, config, Arc::new(SystemClock))
    }

    /// Like [`new`](Self::new) with an explicit timestamp source.
    pub fn with_clock(
        core: Arc<dyn CoreGate<S>>,
        peers: Arc<PeerMap<S>>,
        config: GossipConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let (forward_tx, forward_rx) = mpsc::unbounded_channel();

        Ok(Self {
            shared: Arc::new(Shared {
                core,
                peers,
                config,
                clock,
                history: Mutex::new(HashMap::new()),
            }),
            forward_tx,
            forward_rx: Mutex::new(Some(forward_rx)),
            running: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &GossipConfig {
        &self.shared.config
    }

    pub fn peers(&self) -> &Arc<PeerMap<S>> {
        &self.shared.peers
    }

    /// Relay candidates published by `subject` feed this gossiper.
    ///
    /// Registering several subjects fans them all into the same queue.
    pub fn observe(&self, subject: &dyn ChannelSubject<ForwardCandidate<S>>) -> ChannelId {
        subject.register_channel(self.forward_tx.clone())
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Spawn the dissemination loop and the history cleaner.
    ///
    /// Returns false if already running. Must be called inside a Tokio runtime.
    pub fn start_gossiping(&self) -> bool {
        let mut running = self.running.lock();
        if running.is_some() {
            return false;
        }
        let Some(forwards) = self.forward_rx.lock().take() else {
            // A previous stop never handed the queue back
            warn!("relay queue missing, cannot start");
            return false;
        };

        let (stop, stop_rx) = watch::channel(false);
        let (inserts, insert_rx) = mpsc::channel(self.shared.config.insert_queue);

        let disseminator = tokio::spawn(disseminate(Arc::clone(&self.shared), stop_rx.clone(), insert_rx, forwards));
        let cleaner = tokio::spawn(clean_history(Arc::clone(&self.shared), stop_rx));

        *running = Some(Running {
            stop,
            inserts,
            disseminator,
            cleaner,
        });
        info!(
            node = %self.shared.core.guid(),
            fanout = self.shared.config.fanout,
            patience = self.shared.config.patience,
            "gossip started"
        );
        true
    }

    /// Stop both tasks and wait for the dissemination loop to exit.
    ///
    /// Returns false if the gossiper was not running.
    pub async fn stop_gossiping(&self) -> bool {
        let Some(running) = self.running.lock().take() else {
            return false;
        };

        // Receivers may already be gone if a task panicked
        let _ = running.stop.send(true);

        match running.disseminator.await {
            Ok(forwards) => *self.forward_rx.lock() = Some(forwards),
            Err(e) => warn!("dissemination loop ended abnormally: {}", e),
        }
        if let Err(e) = running.cleaner.await {
            warn!("history cleaner ended abnormally: {}", e);
        }

        info!(node = %self.shared.core.guid(), "gossip stopped");
        true
    }

    /// Ask the loop to originate a push now.
    ///
    /// Returns false if not running. A full queue already guarantees a
    /// pending push, so the request is coalesced.
    pub fn insert_gossip(&self) -> bool {
        let running = self.running.lock();
        let Some(running) = running.as_ref() else {
            return false;
        };

        match running.inserts.try_send(()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(())) => {
                trace!("insert queue full, coalescing");
                true
            }
            Err(mpsc::error::TrySendError::Closed(())) => false,
        }
    }

    /// Anti-entropy pull: fetch `peer`'s delta and merge it.
    pub async fn pull_from(&self, peer: Guid) -> Result<()> {
        let shared = &self.shared;
        let channel = shared.channel(peer)?;
        let me = shared.core.my_state();
        let session = shared.core.session();

        let reply = match shared.bounded(peer, channel.pull(&me, session)).await {
            Ok(reply) => reply,
            Err(e) => {
                shared.report_failure(peer, &e);
                return Err(e);
            }
        };
        shared.merge(reply)
    }

    /// Push our delta to `peer` and merge its reply.
    pub async fn exchange_with(&self, peer: Guid) -> Result<()> {
        let shared = &self.shared;
        let channel = shared.channel(peer)?;
        let payload = shared.outgoing()?;

        let reply = match shared.bounded(peer, channel.exchange(&payload)).await {
            Ok(reply) => reply,
            Err(e) => {
                shared.report_failure(peer, &e);
                return Err(e);
            }
        };
        shared.merge(reply)
    }

    /// Number of messages currently tracked.
    pub fn history_len(&self) -> usize {
        self.shared.history.lock().len()
    }

    /// Remaining patience of a tracked message.
    pub fn patience_of(&self, message_id: &Guid) -> Option<u32> {
        self.shared.history.lock().get(message_id).map(|e| e.patience)
    }
}

impl<S: Support> std::fmt::Debug for BlindCounterGossiper<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlindCounterGossiper")
            .field("node", &self.shared.core.guid())
            .field("config", &self.shared.config)
            .field("running", &self.is_running())
            .finish()
    }
}

impl<S: Support> Drop for BlindCounterGossiper<S> {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            let _ = running.stop.send(true);
            running.cleaner.abort();
        }
    }
}

async fn disseminate<S: Support>(
    shared: Arc<Shared<S>>,
    mut stop: watch::Receiver<bool>,
    mut inserts: mpsc::Receiver<()>,
    mut forwards: ForwardReceiver<S>,
) -> ForwardReceiver<S> {
    let mut ticker = shared.config.push_interval.map(|period| {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    loop {
        tokio::select! {
            biased;

            _ = stop.changed() => break,

            Some(()) = inserts.recv() => shared.originate().await,

            _ = next_tick(&mut ticker) => shared.originate().await,

            Some(candidate) = forwards.recv() => shared.relay(candidate).await,
        }
    }

    debug!(node = %shared.core.guid(), "dissemination loop exiting");
    forwards
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn clean_history<S: Support>(shared: Arc<Shared<S>>, mut stop: watch::Receiver<bool>) {
    let mut ticker = interval(shared.config.cleanup_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = stop.changed() => break,
            _ = ticker.tick() => {
                let mut history = shared.history.lock();
                let before = history.len();
                history.retain(|_, entry| entry.patience > 0);
                let swept = before - history.len();
                if swept > 0 {
                    trace!(swept, remaining = history.len(), "history swept");
                }
            }
        }
    }
}

impl<S: Support> Shared<S> {
    /// Start a new message with our own delta.
    async fn originate(&self) {
        let payload = match self.outgoing() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("cannot export state for gossip: {}", e);
                return;
            }
        };
        let message_id = payload.message_id;

        let notified = {
            let mut history = self.history.lock();
            let entry = history
                .entry(message_id)
                .or_insert_with(|| HistoryEntry::new(self.config.patience));
            entry.notified.insert(self.core.guid());
            entry.notified.clone()
        };

        self.spread(message_id, notified, &payload, Hop::Origin).await;
    }

    /// Relay a message received from elsewhere, if it still has patience.
    async fn relay(&self, candidate: ForwardCandidate<S>) {
        let message_id = candidate.message_id;

        let notified = {
            let mut history = self.history.lock();
            let entry = history
                .entry(message_id)
                .or_insert_with(|| HistoryEntry::new(self.config.patience));
            if entry.patience == 0 {
                trace!(message_id = %message_id, "message spread, dropping relay");
                return;
            }
            entry.notified.insert(candidate.sender);
            entry.notified.insert(self.core.guid());
            entry.notified.clone()
        };

        let me = self.core.my_state();
        let payload = candidate.payload.relayed_by(&me, self.clock.now_nanos());
        self.spread(message_id, notified, &payload, Hop::Relay).await;
    }

    /// One bounded fan-out round for `message_id`.
    async fn spread(&self, message_id: Guid, notified: HashSet<Guid>, payload: &Envelope<S>, hop: Hop) {
        let targets = self.peers.select(self.config.fanout, &notified);

        let results = join_all(targets.iter().map(|channel| self.deliver(channel, payload, hop))).await;

        let mut reached = Vec::with_capacity(results.len());
        let mut failed = Vec::new();
        for (channel, result) in targets.iter().zip(results) {
            let peer = channel.peer();
            match result {
                Ok(()) => reached.push(peer),
                Err(e) if e.is_unreachable() => {
                    warn!(peer = %peer, message_id = %message_id, "gossip delivery failed: {}", e);
                    failed.push(peer);
                }
                Err(e) => {
                    // Delivered, but the peer could not use it
                    debug!(peer = %peer, message_id = %message_id, "peer rejected gossip: {}", e);
                    reached.push(peer);
                }
            }
        }

        let patience = {
            let mut history = self.history.lock();
            history.get_mut(&message_id).map(|entry| {
                entry.notified.extend(reached.iter().copied());
                entry.patience = entry.patience.saturating_sub(1);
                entry.patience
            })
        };

        debug!(
            message_id = %message_id,
            ?hop,
            targets = targets.len(),
            reached = reached.len(),
            failed = failed.len(),
            patience = ?patience,
            "gossip round"
        );

        if !failed.is_empty() {
            self.core.signal_failed(&failed);
        }
    }

    async fn deliver(&self, channel: &SharedChannel<S>, payload: &Envelope<S>, hop: Hop) -> Result<()> {
        let peer = channel.peer();
        match hop {
            Hop::Origin => self.bounded(peer, channel.push(payload)).await,
            Hop::Relay => self.bounded(peer, channel.forward(payload)).await,
        }
    }

    /// Run a peer call under the configured timeout.
    async fn bounded<T>(&self, peer: Guid, call: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        let after = self.config.peer_timeout;
        timeout(after, call)
            .await
            .map_err(|_| GossipError::Timeout { peer, after })?
    }

    fn channel(&self, peer: Guid) -> Result<SharedChannel<S>> {
        self.peers
            .get(&peer)
            .ok_or(GossipError::Core(CoreError::UnknownPeer(peer)))
    }

    fn outgoing(&self) -> Result<Envelope<S>> {
        let updates = self.core.state_updates()?;
        Ok(Envelope::from_updates(updates, Guid::generate(), self.clock.now_nanos()))
    }

    fn merge(&self, reply: Envelope<S>) -> Result<()> {
        let message = reply.into_message(self.clock.now_nanos())?;
        self.core.update_state(message)?;
        Ok(())
    }

    fn report_failure(&self, peer: Guid, error: &GossipError) {
        if error.is_unreachable() {
            warn!(peer = %peer, "anti-entropy call failed: {}", error);
            self.core.signal_failed(&[peer]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use vivaldi_core::{CoordinateCore, NormedVectorSpace, PeerState, VivaldiTuning};

    use crate::channel::PeerChannel;

    /// Records pushes; optionally unreachable.
    struct Recorder {
        guid: Guid,
        down: bool,
        pushes: AtomicUsize,
        forwards: AtomicUsize,
    }

    impl Recorder {
        fn new(down: bool) -> Arc<Self> {
            Arc::new(Self {
                guid: Guid::generate(),
                down,
                pushes: AtomicUsize::new(0),
                forwards: AtomicUsize::new(0),
            })
        }

        fn hits(&self) -> usize {
            self.pushes.load(Ordering::SeqCst) + self.forwards.load(Ordering::SeqCst)
        }

        fn check(&self) -> Result<()> {
            if self.down {
                Err(GossipError::PeerUnreachable { peer: self.guid, reason: "down".into() })
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl PeerChannel<f64> for Recorder {
        fn peer(&self) -> Guid {
            self.guid
        }

        async fn push(&self, _payload: &Envelope<f64>) -> Result<()> {
            self.pushes.fetch_add(1, Ordering::SeqCst);
            self.check()
        }

        async fn pull(&self, _requester: &PeerState<f64>, _session: Guid) -> Result<Envelope<f64>> {
            self.check()?;
            Err(GossipError::BadPayload("recorder has no state".into()))
        }

        async fn exchange(&self, _payload: &Envelope<f64>) -> Result<Envelope<f64>> {
            self.check()?;
            Err(GossipError::BadPayload("recorder has no state".into()))
        }

        async fn forward(&self, _payload: &Envelope<f64>) -> Result<()> {
            self.forwards.fetch_add(1, Ordering::SeqCst);
            self.check()
        }
    }

    fn core() -> Arc<CoordinateCore<f64>> {
        let space = NormedVectorSpace::euclidean(2).unwrap();
        Arc::new(CoordinateCore::at_origin(Guid::generate(), space, VivaldiTuning::default()).unwrap())
    }

    fn gossiper(core: &Arc<CoordinateCore<f64>>, recorders: &[Arc<Recorder>], config: GossipConfig) -> BlindCounterGossiper<f64> {
        let peers = Arc::new(PeerMap::new());
        for recorder in recorders {
            peers.add_peer(Arc::clone(recorder) as SharedChannel<f64>);
        }
        let gate: Arc<dyn CoreGate<f64>> = Arc::clone(core) as Arc<dyn CoreGate<f64>>;
        BlindCounterGossiper::new(gate, peers, config).unwrap()
    }

    async fn settle() {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn start_stop_state_machine() {
        let core = core();
        let g = gossiper(&core, &[], GossipConfig::default());

        assert!(!g.insert_gossip());
        assert!(!g.stop_gossiping().await);

        assert!(g.start_gossiping());
        assert!(!g.start_gossiping());
        assert!(g.insert_gossip());

        assert!(g.stop_gossiping().await);
        assert!(!g.stop_gossiping().await);
        assert!(!g.insert_gossip());

        // The relay queue survives a restart
        assert!(g.start_gossiping());
        assert!(g.stop_gossiping().await);
    }

    #[tokio::test]
    async fn origination_reaches_fanout_peers() {
        let core = core();
        let recorders: Vec<_> = (0..5).map(|_| Recorder::new(false)).collect();
        let g = gossiper(&core, &recorders, GossipConfig::default().with_fanout(2).with_patience(2));

        g.start_gossiping();
        assert!(g.insert_gossip());
        settle().await;
        g.stop_gossiping().await;

        let hit: usize = recorders.iter().map(|p| p.pushes.load(Ordering::SeqCst)).sum();
        assert_eq!(hit, 2);
        assert!(recorders.iter().all(|p| p.hits() <= 1));
        assert_eq!(g.history_len(), 1);
    }

    #[tokio::test]
    async fn patience_one_message_is_swept() {
        let core = core();
        let recorders: Vec<_> = (0..3).map(|_| Recorder::new(false)).collect();
        let config = GossipConfig::default()
            .with_fanout(2)
            .with_patience(1)
            .with_cleanup_interval(Duration::from_millis(30));
        let g = gossiper(&core, &recorders, config.clone());

        g.start_gossiping();
        g.insert_gossip();
        settle().await;
        tokio::time::sleep(config.cleanup_interval * 2).await;

        assert_eq!(g.history_len(), 0);
        let hit: usize = recorders.iter().map(|p| p.hits()).sum();
        assert_eq!(hit, 2);
        g.stop_gossiping().await;
    }

    #[tokio::test]
    async fn relays_skip_sender_and_stop_at_zero_patience() {
        let core = core();
        let recorders: Vec<_> = (0..4).map(|_| Recorder::new(false)).collect();
        let g = gossiper(&core, &recorders, GossipConfig::default().with_fanout(2).with_patience(1));
        g.observe(&*core);
        g.start_gossiping();

        let source = core.state_updates();
        let mut envelope = Envelope::from_updates(source, Guid::generate(), 0);
        envelope.sender = recorders[0].guid;
        let message_id = envelope.message_id;

        core.push_to_channels(ForwardCandidate::new(envelope.clone()));
        settle().await;

        assert_eq!(recorders[0].hits(), 0);
        let forwarded: usize = recorders.iter().map(|p| p.forwards.load(Ordering::SeqCst)).sum();
        assert_eq!(forwarded, 2);
        assert_eq!(g.patience_of(&message_id), Some(0));

        // A second copy of the same message is dropped
        core.push_to_channels(ForwardCandidate::new(envelope));
        settle().await;
        let forwarded_again: usize = recorders.iter().map(|p| p.forwards.load(Ordering::SeqCst)).sum();
        assert_eq!(forwarded_again, 2);

        g.stop_gossiping().await;
    }

    #[tokio::test]
    async fn unreachable_peers_are_signalled_failed() {
        let core = core();
        let dead = Recorder::new(true);
        let g = gossiper(&core, &[Arc::clone(&dead)], GossipConfig::default());

        // The core only tracks failure for peers it has cached
        let mut deltas = HashMap::new();
        deltas.insert(
            dead.guid,
            vivaldi_core::PeerDelta { is_failed: false, coordinates: vec![1.0, 1.0] },
        );
        core.update_state(vivaldi_core::GossipMessage {
            session: Guid::nil(),
            sender: dead.guid,
            communicator: dead.guid,
            measured_rtt: 0.0,
            sender_error_estimate: 1.0,
            deltas,
        })
        .unwrap();
        assert!(!core.is_failed(&dead.guid));

        g.start_gossiping();
        g.insert_gossip();
        settle().await;
        g.stop_gossiping().await;

        assert_eq!(dead.pushes.load(Ordering::SeqCst), 1);
        assert!(core.is_failed(&dead.guid));
    }

    #[tokio::test]
    async fn periodic_push_without_inserts() {
        let core = core();
        let recorder = Recorder::new(false);
        let config = GossipConfig::default().with_push_interval(Duration::from_millis(10));
        let g = gossiper(&core, &[Arc::clone(&recorder)], config);

        g.start_gossiping();
        tokio::time::sleep(Duration::from_millis(80)).await;
        g.stop_gossiping().await;

        assert!(recorder.pushes.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn anti_entropy_errors() {
        let core = core();
        let dead = Recorder::new(true);
        let g = gossiper(&core, &[Arc::clone(&dead)], GossipConfig::default());

        let stranger = Guid::generate();
        assert!(matches!(
            g.pull_from(stranger).await,
            Err(GossipError::Core(CoreError::UnknownPeer(p))) if p == stranger
        ));
        assert!(g.pull_from(dead.guid).await.unwrap_err().is_unreachable());
        assert!(g.exchange_with(dead.guid).await.unwrap_err().is_unreachable());
    }

    #[tokio::test]
    async fn slow_peer_times_out() {
        struct Stall(Guid);

        #[async_trait]
        impl PeerChannel<f64> for Stall {
            fn peer(&self) -> Guid {
                self.0
            }
            async fn push(&self, _payload: &Envelope<f64>) -> Result<()> {
                std::future::pending().await
            }
            async fn pull(&self, _requester: &PeerState<f64>, _session: Guid) -> Result<Envelope<f64>> {
                std::future::pending().await
            }
            async fn exchange(&self, _payload: &Envelope<f64>) -> Result<Envelope<f64>> {
                std::future::pending().await
            }
        }

        let core = core();
        let peers = Arc::new(PeerMap::new());
        let stalled = Guid::generate();
        peers.add_peer(Arc::new(Stall(stalled)));
        let config = GossipConfig::default().with_peer_timeout(Duration::from_millis(20));
        let g = BlindCounterGossiper::new(core as Arc<dyn CoreGate<f64>>, peers, config).unwrap();

        let err = g.pull_from(stalled).await.unwrap_err();
        assert!(matches!(err, GossipError::Timeout { peer, .. } if peer == stalled));
    }
}
