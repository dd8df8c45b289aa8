//! The consensus engine: one single-threaded event loop per peer.
//!
//! The loop owns every piece of mutable state — acceptor, proposer,
//! instance store, watermark table — and handles exactly one event at a
//! time: a timer tick, an inbound wire request, a fan-out reply, or a host
//! command. Network I/O never happens on the loop itself; prepare, accept,
//! and decide fan-outs run as spawned tasks whose replies re-enter through
//! an internal queue, and inbound requests park their serving task on a
//! reply sink until the loop has computed the response.

use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::core::{
    AcceptOutcome, AcceptorCore, DecideOutcome, Fate, InstanceStore, PrepareOutcome, ProposerCore,
    Seq, Slot,
};
use crate::handle::{Command, LogHandle};
use crate::messages::{
    ALREADY_DECIDED, AcceptArgs, AcceptReply, DecideArgs, DecideReply, DoneReply, PrepareArgs,
    PrepareReply, REJECTED, Reply, Request,
};
use crate::transport::{Transport, WireHandler};

/// Work re-entering the loop from auxiliary tasks.
enum Event {
    Prepare(PrepareReply),
    Accept(AcceptReply),
    Decide(DecideReply),
    /// Results of a Min fan-out: one entry per peer, `None` where the call
    /// failed.
    DoneGathered {
        gathered: Vec<Option<Seq>>,
        reply: oneshot::Sender<Seq>,
    },
}

impl Event {
    fn from_reply(reply: Reply) -> Option<Self> {
        match reply {
            Reply::Prepare(reply) => Some(Event::Prepare(reply)),
            Reply::Accept(reply) => Some(Event::Accept(reply)),
            Reply::Decide(reply) => Some(Event::Decide(reply)),
            // done watermarks are only gathered by the Min task
            Reply::Done(_) => None,
        }
    }
}

/// One peer's consensus engine. Create with [`Engine::new`], then hand
/// [`Engine::run`] to the runtime and keep the returned [`LogHandle`] and
/// [`WireHandler`].
pub struct Engine<T: Transport, C: Clock> {
    me: usize,
    peers: Vec<T::Addr>,
    transport: T,
    clock: C,
    config: EngineConfig,

    acceptor: AcceptorCore,
    proposer: ProposerCore,
    store: InstanceStore,
    /// Last known Done watermark per peer, `-1` until first heard from.
    watermarks: Vec<Seq>,
    /// Ticks the current round has gone without completing.
    stall_ticks: u32,

    inbound_rx: mpsc::Receiver<(Request, oneshot::Sender<Reply>)>,
    /// Keeps the inbound queue open while no transport server is attached.
    _inbound_tx: mpsc::Sender<(Request, oneshot::Sender<Reply>)>,
    command_rx: mpsc::Receiver<Command>,
    event_rx: mpsc::UnboundedReceiver<Event>,
    event_tx: mpsc::UnboundedSender<Event>,
    cancel: CancellationToken,
}

impl<T: Transport, C: Clock> Engine<T, C> {
    /// Build an engine for peer `me` of the fixed group `peers`.
    ///
    /// Returns the engine itself (spawn [`Engine::run`]), the host-facing
    /// [`LogHandle`], and the [`WireHandler`] to register with whatever
    /// serves this peer's inbound traffic.
    ///
    /// # Panics
    ///
    /// Panics when `peers` is empty, holds more than 256 entries, or `me`
    /// is out of range. Peer indices are embedded in the low 8 bits of
    /// every proposal number, which is what makes the numbers globally
    /// unique.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        me: usize,
        peers: Vec<T::Addr>,
        transport: T,
        clock: C,
    ) -> (Self, LogHandle, WireHandler) {
        assert!(!peers.is_empty(), "peer list must not be empty");
        assert!(peers.len() <= 256, "peer ids must fit in 8 bits");
        assert!(me < peers.len(), "own index must be inside the peer list");
        let id = u8::try_from(me).expect("index below 256 fits in u8");

        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        let (command_tx, command_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let engine = Self {
            me,
            transport,
            clock,
            config,
            acceptor: AcceptorCore::new(),
            proposer: ProposerCore::new(id, peers.len()),
            store: InstanceStore::new(),
            watermarks: vec![-1; peers.len()],
            stall_ticks: 0,
            peers,
            inbound_rx,
            _inbound_tx: inbound_tx.clone(),
            command_rx,
            event_rx,
            event_tx,
            cancel: cancel.clone(),
        };
        let handle = LogHandle::new(command_tx, cancel);
        (engine, handle, WireHandler::new(inbound_tx))
    }

    /// Drive the event loop until killed or the host handle goes away.
    #[instrument(skip_all, name = "engine", fields(peer = self.me))]
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(peers = self.peers.len(), "engine started");

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    debug!("shutdown signal received");
                    break;
                }

                Some((request, reply_tx)) = self.inbound_rx.recv() => {
                    self.on_request(request, reply_tx);
                }

                Some(event) = self.event_rx.recv() => {
                    self.on_event(event);
                }

                command = self.command_rx.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => {
                        debug!("host handle dropped, stopping");
                        break;
                    }
                },

                _ = ticker.tick() => self.on_tick(),
            }
        }
        debug!("engine stopped");
    }

    /// Proposer driver: find the oldest unsettled instance and make sure a
    /// round is moving for it.
    fn on_tick(&mut self) {
        let Some(slot) = self.store.next_unsettled() else {
            return;
        };
        if let Some(round_seq) = self.proposer.round_seq()
            && round_seq != slot.seq
        {
            // the instance that round was driving got settled under us
            trace!(round_seq, next = slot.seq, "abandoning superseded round");
            self.proposer.abandon();
            self.stall_ticks = 0;
        }
        if self.proposer.idle() || self.stall_ticks >= self.config.stall_ticks {
            self.stall_ticks = 0;
            self.begin_round(slot);
        } else {
            self.stall_ticks += 1;
        }
    }

    fn begin_round(&mut self, slot: Slot) {
        let n = self
            .proposer
            .begin_round(slot.clone(), self.clock.unix_seconds());
        debug!(n, seq = slot.seq, "starting round");
        self.broadcast(Request::Prepare(PrepareArgs { n, slot }));
    }

    /// Fan a request out to every peer, self included. Each call runs in
    /// its own task; replies re-enter the loop as events, failures are
    /// dropped and left to the next tick's retry.
    fn broadcast(&self, request: Request) {
        for addr in &self.peers {
            let transport = self.transport.clone();
            let addr = addr.clone();
            let request = request.clone();
            let event_tx = self.event_tx.clone();
            tokio::spawn(async move {
                match transport.call(&addr, request).await {
                    Ok(reply) => {
                        if let Some(event) = Event::from_reply(reply) {
                            let _ = event_tx.send(event);
                        }
                    }
                    Err(error) => trace!(?addr, %error, "call failed"),
                }
            });
        }
    }

    fn on_event(&mut self, event: Event) {
        match event {
            Event::Prepare(reply) => {
                // a synthetic "decided here" reply carries a decision we can
                // fold in right away, whatever round it belongs to
                if reply.n_a == ALREADY_DECIDED
                    && let Some(decided) = reply.v_a.clone()
                    && self.store.learn(decided.clone())
                {
                    debug!(seq = decided.seq, "learned decision from prepare reply");
                }
                if let PrepareOutcome::Quorum { n, chosen } = self.proposer.on_prepare_reply(&reply)
                {
                    debug!(n, seq = chosen.seq, "prepare quorum, sending accepts");
                    self.broadcast(Request::Accept(AcceptArgs { n, slot: chosen }));
                }
            }
            Event::Accept(reply) => {
                if let AcceptOutcome::Quorum { n, chosen } = self.proposer.on_accept_reply(&reply) {
                    debug!(n, seq = chosen.seq, "accept quorum, broadcasting decision");
                    self.broadcast(Request::Decide(DecideArgs { n, slot: chosen }));
                }
            }
            Event::Decide(reply) => {
                if let DecideOutcome::Decided { chosen } = self.proposer.on_decide_reply(&reply) {
                    debug!(seq = chosen.seq, "round complete");
                    self.store.learn(chosen.clone());
                    self.store.settle_current(&chosen);
                    self.stall_ticks = 0;
                }
            }
            Event::DoneGathered { gathered, reply } => {
                for (known, fresh) in self.watermarks.iter_mut().zip(gathered) {
                    if let Some(mark) = fresh
                        && mark > *known
                    {
                        *known = mark;
                    }
                }
                let min = self.watermarks.iter().copied().min().unwrap_or(-1) + 1;
                debug!(min, "folded done watermarks");
                self.store.forget_below(min);
                let _ = reply.send(min);
            }
        }
    }

    fn on_request(&mut self, request: Request, reply_tx: oneshot::Sender<Reply>) {
        let reply = match request {
            Request::Prepare(args) => {
                trace!(n = args.n, seq = args.slot.seq, "prepare request");
                Reply::Prepare(if self.store.fate(args.slot.seq) == Fate::Forgotten {
                    // reclaimed instance, nothing useful to promise
                    PrepareReply {
                        n: args.n,
                        n_a: REJECTED,
                        v_a: None,
                    }
                } else {
                    let settled = self.store.settled_value(args.slot.seq);
                    self.acceptor.prepare(&args, settled)
                })
            }
            Request::Accept(args) => {
                trace!(n = args.n, seq = args.slot.seq, "accept request");
                Reply::Accept(if self.store.fate(args.slot.seq) == Fate::Forgotten {
                    AcceptReply { n: REJECTED }
                } else {
                    self.acceptor.accept(&args)
                })
            }
            Request::Decide(args) => {
                trace!(n = args.n, seq = args.slot.seq, "decide request");
                if self.store.learn(args.slot.clone()) {
                    debug!(seq = args.slot.seq, "learned decided value");
                }
                self.acceptor.reset();
                Reply::Decide(DecideReply { n: args.n })
            }
            Request::GetDone => Reply::Done(DoneReply {
                done: self.store.done(),
            }),
        };
        // the caller may have timed out and gone away; that is its problem
        let _ = reply_tx.send(reply);
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Start { slot, ack } => {
                debug!(seq = slot.seq, "start");
                self.store.push(slot);
                let _ = ack.send(());
            }
            Command::Done { seq, ack } => {
                debug!(seq, "done");
                self.store.done_up_to(seq);
                let _ = ack.send(());
            }
            Command::Max { reply } => {
                let _ = reply.send(self.store.max_seq());
            }
            Command::Status { seq, reply } => {
                let _ = reply.send(self.store.status(seq));
            }
            Command::Min { reply } => self.gather_done(reply),
        }
    }

    /// Min fan-out: ask every peer for its Done watermark off-loop, then
    /// feed the answers back in for the fold.
    fn gather_done(&self, reply: oneshot::Sender<Seq>) {
        let transport = self.transport.clone();
        let peers = self.peers.clone();
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            let calls = peers
                .iter()
                .map(|addr| transport.call(addr, Request::GetDone));
            let gathered = futures::future::join_all(calls)
                .await
                .into_iter()
                .map(|result| match result {
                    Ok(Reply::Done(done)) => Some(done.done),
                    _ => None,
                })
                .collect();
            let _ = event_tx.send(Event::DoneGathered { gathered, reply });
        });
    }
}
