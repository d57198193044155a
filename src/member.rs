// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

use crate::{ChangeMessage, Commit, Config, CouncilHandle, CouncilState, Error, Message, Updater};
use im::{OrdMap, OrdSet, Vector};
use itertools::Itertools;
use std::fmt::Debug;
use std::hash::Hash;
use tracing::{debug, error, info, trace, warn};

// A `Member` is an explicit state machine rather than a bundle of futures:
// the host feeds it messages with `step`, advances its timers with `tick`,
// and ships whatever it pushes onto the outgoing queue. Every protocol
// variable lives in a plain field, so a member can be cloned, hashed and
// handed to a model checker.
//
// The protocol itself is lock-then-broadcast. A member that wants to commit
// a change claims its own lock, asks every other peer for theirs, and once
// all have granted, broadcasts the change numbered `counter + 1`. A granted
// lock stays with its grantee until the grantee's change commits at the
// granter, or until the grantee releases it after being declined somewhere
// else. So at most one change is ever in flight and every member sees the
// same change under the same counter.

/// Where a member is in its lifecycle.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Greeting, // Joiner waiting for a welcome, or backing off before re-greeting.
    Joining,  // Joiner holding a snapshot, arbitrating its own `Join`.
    Active,   // Listed in the council.
    Departed, // Own `Leave` committed.
    Failed,   // Fatal protocol violation or failed join.
}

/// A claim on some member's lock: who holds it, and for which attempt.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Claim<Peer> {
    pub peer: Peer,
    pub attempt: u64,
}

/// Returned by `apply` and `leave`; see `Member::is_applied`.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
enum Proposal<D> {
    Update(D),
    Leave,
}

// Progress of the member's own bid for the council-wide lock.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
enum Arbitration<Peer: Ord + Clone> {
    Idle,
    Requesting {
        attempt: u64,
        asked: OrdSet<Peer>,
        awaiting: OrdSet<Peer>,
    },
    Backoff {
        remaining: u32,
    },
}

/// One participant in a council, holding a replica of the shared value.
///
/// `Peer` identifies a member and doubles as its address: the host routes
/// every `Message` to the member named by its `to` field. The `Ord` of
/// `Peer` is also its priority when lock bids collide; lower wins.
///
/// A member never blocks. Operations that would wait on the network in a
/// threaded design (`join`, `apply`, `leave`) start here and complete over
/// later calls to `step` and `tick`; `stage`, `is_applied` and `value` report
/// how far they got.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Member<Peer, D, V, U>
where
    Peer: Ord + Clone + Debug + Hash,
    D: Clone,
    V: Clone,
{
    id: Peer,
    updater: U,
    config: Config,
    stage: Stage,

    // The replica; `None` until a joiner is welcomed.
    state: Option<CouncilState<Peer, V>>,

    // Joiner bookkeeping. `contacted` is every peer that may hold a claim or
    // a release watermark for one of our attempts, and is told when the join
    // fails.
    greeter: Option<Peer>,
    greeting_sent: bool,
    greeting_elapsed: u32,
    contacted: OrdSet<Peer>,

    // Lock bookkeeping. `holder` is whoever this member has granted its
    // lock to, itself included; `released` is the highest attempt each
    // requester has given up on.
    holder: Option<Claim<Peer>>,
    released: OrdMap<Peer, u64>,
    deferred_greetings: Vector<Claim<Peer>>,

    // Own bids.
    attempt: u64,
    failures: u32,
    arbitration: Arbitration<Peer>,

    // Local serialization: proposals commit one at a time, in order.
    queue: Vector<Proposal<D>>,
    submitted: u64,
    applied: u64,
    leaving: bool,

    commits: Vector<Commit<Peer, D>>,
}

impl<Peer, D, V, U> Member<Peer, D, V, U>
where
    Peer: Ord + Clone + Debug + Hash + 'static,
    D: Clone + Debug + 'static,
    V: Clone + 'static,
    U: Updater<D, V>,
{
    fn new(
        id: Peer,
        updater: U,
        config: Config,
        stage: Stage,
        state: Option<CouncilState<Peer, V>>,
        greeter: Option<Peer>,
    ) -> Self {
        Member {
            id,
            updater,
            config,
            stage,
            state,
            greeter,
            greeting_sent: false,
            greeting_elapsed: 0,
            contacted: OrdSet::new(),
            holder: None,
            released: OrdMap::new(),
            deferred_greetings: Vector::new(),
            attempt: 0,
            failures: 0,
            arbitration: Arbitration::Idle,
            queue: Vector::new(),
            submitted: 0,
            applied: 0,
            leaving: false,
            commits: Vector::new(),
        }
    }

    /// Forms a new council with this member as its only peer.
    pub fn found(id: Peer, updater: U, value: V, config: Config) -> Self {
        info!("peer {:?} founding council", id);
        let state = CouncilState::founding(id.clone(), value);
        Member::new(id, updater, config, Stage::Active, Some(state), None)
    }

    /// Starts joining the council that `handle` points into. The first
    /// `step` sends the greeting; the member is usable once `is_active`.
    pub fn join(id: Peer, updater: U, handle: CouncilHandle<Peer>, config: Config) -> Self {
        info!("peer {:?} joining council via {:?}", id, handle.greeter);
        Member::new(id, updater, config, Stage::Greeting, None, Some(handle.greeter))
    }

    pub fn id(&self) -> &Peer {
        &self.id
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn is_active(&self) -> bool {
        self.stage == Stage::Active
    }

    pub fn is_departed(&self) -> bool {
        self.stage == Stage::Departed
    }

    /// A handle other processes can join through.
    pub fn handle(&self) -> CouncilHandle<Peer> {
        CouncilHandle {
            greeter: self.id.clone(),
        }
    }

    pub fn state(&self) -> Option<&CouncilState<Peer, V>> {
        self.state.as_ref()
    }

    /// The local replica. Never touches the network.
    pub fn value(&self) -> Option<&V> {
        self.state.as_ref().map(|s| &s.value)
    }

    pub fn peers(&self) -> Option<&Vector<Peer>> {
        self.state.as_ref().map(|s| &s.peers)
    }

    pub fn counter(&self) -> Option<u64> {
        self.state.as_ref().map(|s| s.counter)
    }

    /// Whoever this member's lock is currently granted to.
    pub fn lock_holder(&self) -> Option<&Claim<Peer>> {
        self.holder.as_ref()
    }

    /// Drains the log of changes committed here since the last call, in
    /// counter order. The log grows without bound if never drained.
    pub fn take_commits(&mut self) -> Vec<Commit<Peer, D>> {
        let commits = self.commits.iter().cloned().collect();
        self.commits.clear();
        commits
    }

    fn usable(&self) -> Result<(), Error> {
        match self.stage {
            Stage::Failed => Err(Error::Failed),
            Stage::Departed => Err(Error::Departed),
            _ if self.leaving => Err(Error::Leaving),
            _ => Ok(()),
        }
    }

    fn enqueue(&mut self, prop: Proposal<D>) -> Ticket {
        self.queue.push_back(prop);
        self.submitted += 1;
        Ticket(self.submitted)
    }

    /// Queues `diff` for commitment across the council. Proposals from one
    /// member commit in the order they were queued; one queued while still
    /// joining waits for the join to commit.
    pub fn apply(&mut self, diff: D) -> Result<Ticket, Error> {
        self.usable()?;
        trace!("peer {:?} queued update {:?}", self.id, diff);
        Ok(self.enqueue(Proposal::Update(diff)))
    }

    /// Queues this member's departure behind any proposals already queued.
    /// Once it commits the member is `Departed`. A member dropped without
    /// leaving stays listed at every other peer, and stalls their bids.
    pub fn leave(&mut self) -> Result<Ticket, Error> {
        self.usable()?;
        info!("peer {:?} leaving council", self.id);
        self.leaving = true;
        Ok(self.enqueue(Proposal::Leave))
    }

    /// Number of local proposals queued and not yet committed.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Returns true once the proposal behind `ticket` has committed here.
    pub fn is_applied(&self, ticket: Ticket) -> bool {
        self.applied >= ticket.0
    }

    fn fail(&mut self, err: Error, outgoing: &mut Vec<Message<Peer, D, V>>) -> Error {
        error!("peer {:?} failed: {}", self.id, err);
        if self.stage == Stage::Greeting || self.stage == Stage::Joining {
            self.withdraw(outgoing);
        }
        self.stage = Stage::Failed;
        err
    }

    // A joiner that fails would otherwise leave its greeter, and anyone else
    // that granted it a lock, holding that grant forever.
    fn withdraw(&mut self, outgoing: &mut Vec<Message<Peer, D, V>>) {
        if self.attempt == 0 {
            return;
        }
        for peer in self.contacted.iter() {
            debug!(
                "peer {:?} withdrawing attempt #{} from {:?}",
                self.id, self.attempt, peer
            );
            outgoing.push(Message::Withdraw {
                from: self.id.clone(),
                to: peer.clone(),
                attempt: self.attempt,
            });
        }
        self.contacted.clear();
    }

    /// Consumes `incoming` messages and pushes any resulting messages onto
    /// `outgoing`. An error is fatal: the member stops participating.
    pub fn step<'a, MI>(
        &mut self,
        incoming: MI,
        outgoing: &mut Vec<Message<Peer, D, V>>,
    ) -> Result<(), Error>
    where
        MI: std::iter::Iterator<Item = &'a Message<Peer, D, V>>,
    {
        if self.stage == Stage::Failed {
            return Err(Error::Failed);
        }
        for msg in incoming {
            if let Err(e) = self.receive(msg, outgoing) {
                return Err(self.fail(e, outgoing));
            }
        }
        if let Err(e) = self.progress(outgoing) {
            return Err(self.fail(e, outgoing));
        }
        Ok(())
    }

    /// Advances backoff and greeting timers by one tick.
    pub fn tick(&mut self, outgoing: &mut Vec<Message<Peer, D, V>>) -> Result<(), Error> {
        if self.stage == Stage::Failed {
            return Err(Error::Failed);
        }
        if let Arbitration::Backoff { remaining } = &mut self.arbitration {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                trace!("peer {:?} backoff expired", self.id);
                self.arbitration = Arbitration::Idle;
            }
        }
        if self.stage == Stage::Greeting && self.greeting_sent {
            self.greeting_elapsed += 1;
            if let Some(limit) = self.config.greeting_timeout_tick {
                if self.greeting_elapsed >= limit {
                    return Err(self.fail(Error::GreetingTimedOut(limit), outgoing));
                }
            }
        }
        if let Err(e) = self.progress(outgoing) {
            return Err(self.fail(e, outgoing));
        }
        Ok(())
    }

    fn receive(
        &mut self,
        msg: &Message<Peer, D, V>,
        outgoing: &mut Vec<Message<Peer, D, V>>,
    ) -> Result<(), Error> {
        if msg.to() != &self.id {
            warn!(
                "peer {:?} dropping misrouted {} for {:?}",
                self.id,
                msg.kind(),
                msg.to()
            );
            return Ok(());
        }
        match msg {
            Message::Greeting { from, attempt, .. } => {
                self.on_greeting(from, *attempt, outgoing);
                Ok(())
            }
            Message::Welcome { from, state, .. } => {
                self.on_welcome(from, state, outgoing);
                Ok(())
            }
            Message::Rebuff { from, .. } => {
                if self.stage == Stage::Greeting && self.greeter.as_ref() == Some(from) {
                    warn!("peer {:?} rebuffed by {:?}", self.id, from);
                    return Err(Error::JoinRefused);
                }
                Ok(())
            }
            Message::LockRequest { from, attempt, .. } => {
                self.on_lock_request(from, *attempt, outgoing);
                Ok(())
            }
            Message::LockResponse {
                from,
                attempt,
                granted,
                holder,
                ..
            } => {
                self.on_lock_response(from, *attempt, *granted, holder.as_ref(), outgoing);
                Ok(())
            }
            Message::LockRelease { from, attempt, .. } => {
                self.on_lock_release(from, *attempt);
                Ok(())
            }
            Message::Withdraw { from, attempt, .. } => {
                self.on_lock_release(from, *attempt);
                self.released.remove(from);
                Ok(())
            }
            Message::Change {
                from,
                attempt,
                counter,
                change,
                ..
            } => self.on_change(from, *attempt, *counter, change),
        }
    }

    fn is_released(&self, peer: &Peer, attempt: u64) -> bool {
        match self.released.get(peer) {
            Some(r) => attempt <= *r,
            None => false,
        }
    }

    fn on_greeting(&mut self, from: &Peer, attempt: u64, outgoing: &mut Vec<Message<Peer, D, V>>) {
        if self.leaving || self.stage == Stage::Departed {
            debug!("peer {:?} rebuffing greeting from {:?}", self.id, from);
            outgoing.push(Message::Rebuff {
                from: self.id.clone(),
                to: from.clone(),
            });
            return;
        }
        if self.is_released(from, attempt) {
            trace!("peer {:?} ignoring stale greeting from {:?}", self.id, from);
            return;
        }
        // Answered in `progress`, once the lock is free and this member is
        // itself a registered peer.
        self.deferred_greetings.retain(|c| &c.peer != from);
        self.deferred_greetings.push_back(Claim {
            peer: from.clone(),
            attempt,
        });
    }

    fn on_welcome(
        &mut self,
        from: &Peer,
        state: &CouncilState<Peer, V>,
        outgoing: &mut Vec<Message<Peer, D, V>>,
    ) {
        if self.stage != Stage::Greeting
            || !self.greeting_sent
            || self.greeter.as_ref() != Some(from)
        {
            warn!("peer {:?} ignoring unsolicited welcome from {:?}", self.id, from);
            return;
        }
        debug!(
            "peer {:?} welcomed by {:?} at #{} with peers [{}]",
            self.id,
            from,
            state.counter,
            state.peers.iter().map(|p| format!("{:?}", p)).join(", ")
        );
        self.state = Some(state.clone());
        self.stage = Stage::Joining;
        self.greeting_sent = false;
        // The greeter already granted us its lock for this attempt.
        let asked: OrdSet<Peer> = state
            .peers
            .iter()
            .filter(|p| *p != from && **p != self.id)
            .cloned()
            .collect();
        self.request_locks(self.attempt, asked, outgoing);
    }

    fn on_lock_request(&mut self, from: &Peer, attempt: u64, outgoing: &mut Vec<Message<Peer, D, V>>) {
        // A grant is only ever replaced once it is cleared, never overwritten,
        // even by a newer attempt from the same peer: its previous change may
        // still be on the way here.
        let granted =
            self.stage == Stage::Active && !self.is_released(from, attempt) && self.holder.is_none();
        if granted {
            trace!(
                "peer {:?} granting lock to {:?} for attempt #{}",
                self.id,
                from,
                attempt
            );
            self.holder = Some(Claim {
                peer: from.clone(),
                attempt,
            });
        } else {
            trace!(
                "peer {:?} declining lock to {:?} for attempt #{} (held by {:?})",
                self.id,
                from,
                attempt,
                self.holder
            );
        }
        outgoing.push(Message::LockResponse {
            from: self.id.clone(),
            to: from.clone(),
            attempt,
            granted,
            holder: if granted {
                None
            } else {
                self.holder.as_ref().map(|c| c.peer.clone())
            },
        });
    }

    fn on_lock_response(
        &mut self,
        from: &Peer,
        attempt: u64,
        granted: bool,
        holder: Option<&Peer>,
        outgoing: &mut Vec<Message<Peer, D, V>>,
    ) {
        let current = match &mut self.arbitration {
            Arbitration::Requesting {
                attempt: a,
                awaiting,
                ..
            } if *a == attempt && awaiting.contains(from) => awaiting,
            _ => {
                trace!(
                    "peer {:?} ignoring stale lock response from {:?} for attempt #{}",
                    self.id,
                    from,
                    attempt
                );
                return;
            }
        };
        if granted {
            current.remove(from);
        } else {
            debug!(
                "peer {:?} declined by {:?} for attempt #{} (held by {:?})",
                self.id, from, attempt, holder
            );
            let outranks = match holder {
                Some(h) => self.id < *h,
                None => false,
            };
            self.abandon_attempt(outranks, outgoing);
        }
    }

    fn on_lock_release(&mut self, from: &Peer, attempt: u64) {
        if !self.is_released(from, attempt) {
            self.released.insert(from.clone(), attempt);
        }
        if let Some(c) = &self.holder {
            if &c.peer == from && c.attempt <= attempt {
                trace!("peer {:?} lock released by {:?}", self.id, from);
                self.holder = None;
            }
        }
        self.deferred_greetings
            .retain(|c| !(&c.peer == from && c.attempt <= attempt));
    }

    fn on_change(
        &mut self,
        from: &Peer,
        attempt: u64,
        counter: u64,
        change: &ChangeMessage<Peer, D>,
    ) -> Result<(), Error> {
        match self.stage {
            Stage::Active => self.commit(from, attempt, counter, change),
            Stage::Departed => {
                debug!(
                    "peer {:?} departed, ignoring change #{} from {:?}",
                    self.id, counter, from
                );
                Ok(())
            }
            _ => Err(Error::UnexpectedChange { counter }),
        }
    }

    // The only path that mutates the replica, for remote and own changes.
    fn commit(
        &mut self,
        from: &Peer,
        attempt: u64,
        counter: u64,
        change: &ChangeMessage<Peer, D>,
    ) -> Result<(), Error> {
        let state = match &mut self.state {
            Some(s) => s,
            None => return Err(Error::UnexpectedChange { counter }),
        };
        let own_position = state.position(&self.id);
        let departing = match change {
            ChangeMessage::Leave(i) => state.peers.get(*i).cloned(),
            _ => None,
        };
        state.commit(counter, change, &self.updater)?;
        trace!(
            "peer {:?} committed #{} from {:?}: {:?}",
            self.id,
            counter,
            from,
            change
        );
        match change {
            ChangeMessage::Join(p) => {
                info!("peer {:?} sees {:?} join at #{}", self.id, p, counter)
            }
            ChangeMessage::Leave(i) => {
                info!("peer {:?} sees position {} leave at #{}", self.id, i, counter);
                if own_position == Some(*i) {
                    self.stage = Stage::Departed;
                }
            }
            ChangeMessage::Update(_) => (),
        }
        if let Some(c) = &self.holder {
            if &c.peer == from && c.attempt <= attempt {
                self.holder = None;
            }
        }
        // A process may later rejoin under the departed id, counting its
        // attempts from scratch.
        if let Some(p) = departing {
            self.released.remove(&p);
            self.deferred_greetings.retain(|c| c.peer != p);
        }
        self.commits.push_back(Commit {
            counter,
            from: from.clone(),
            change: change.clone(),
        });
        Ok(())
    }

    fn request_locks(&mut self, attempt: u64, asked: OrdSet<Peer>, outgoing: &mut Vec<Message<Peer, D, V>>) {
        if self.stage == Stage::Joining {
            self.contacted.extend(asked.iter().cloned());
        }
        self.holder = Some(Claim {
            peer: self.id.clone(),
            attempt,
        });
        for peer in asked.iter() {
            outgoing.push(Message::LockRequest {
                from: self.id.clone(),
                to: peer.clone(),
                attempt,
            });
        }
        trace!(
            "peer {:?} requesting lock from {} peers for attempt #{}",
            self.id,
            asked.len(),
            attempt
        );
        self.arbitration = Arbitration::Requesting {
            attempt,
            awaiting: asked.clone(),
            asked,
        };
    }

    fn abandon_attempt(&mut self, outranks_blockers: bool, outgoing: &mut Vec<Message<Peer, D, V>>) {
        let (attempt, mut asked) = match &self.arbitration {
            Arbitration::Requesting { attempt, asked, .. } => (*attempt, asked.clone()),
            _ => return,
        };
        if self.stage == Stage::Joining {
            // A fresh snapshot comes with the next greeting.
            if let Some(g) = &self.greeter {
                asked.insert(g.clone());
            }
            self.stage = Stage::Greeting;
            self.state = None;
        }
        for peer in asked.iter() {
            outgoing.push(Message::LockRelease {
                from: self.id.clone(),
                to: peer.clone(),
                attempt,
            });
        }
        if let Some(c) = &self.holder {
            if c.peer == self.id {
                self.holder = None;
            }
        }
        self.failures += 1;
        let remaining = self.config.backoff_tick(self.failures, outranks_blockers);
        debug!(
            "peer {:?} abandoned attempt #{}, backing off {} ticks",
            self.id, attempt, remaining
        );
        self.arbitration = Arbitration::Backoff { remaining };
    }

    // Sends `change` to every other peer and commits it locally. Only called
    // with every peer's lock granted.
    fn broadcast(
        &mut self,
        change: ChangeMessage<Peer, D>,
        outgoing: &mut Vec<Message<Peer, D, V>>,
    ) -> Result<(), Error> {
        let attempt = match &self.arbitration {
            Arbitration::Requesting { attempt, .. } => *attempt,
            _ => return Ok(()),
        };
        let state = match &self.state {
            Some(s) => s,
            None => return Ok(()),
        };
        let counter = state.counter + 1;
        for peer in state.peers.iter().filter(|p| **p != self.id) {
            outgoing.push(Message::Change {
                from: self.id.clone(),
                to: peer.clone(),
                attempt,
                counter,
                change: change.clone(),
            });
        }
        debug!("peer {:?} broadcasting #{}: {:?}", self.id, counter, change);
        self.arbitration = Arbitration::Idle;
        self.failures = 0;
        let id = self.id.clone();
        self.commit(&id, attempt, counter, &change)
    }

    fn serve_greetings(&mut self, outgoing: &mut Vec<Message<Peer, D, V>>) -> bool {
        if self.holder.is_some() {
            return false;
        }
        let claim = match self.deferred_greetings.pop_front() {
            Some(c) => c,
            None => return false,
        };
        let state = match &self.state {
            Some(s) => s.clone(),
            None => return false,
        };
        debug!(
            "peer {:?} welcoming {:?} at #{}",
            self.id, claim.peer, state.counter
        );
        outgoing.push(Message::Welcome {
            from: self.id.clone(),
            to: claim.peer.clone(),
            state,
        });
        self.holder = Some(claim);
        true
    }

    fn rebuff_greetings(&mut self, outgoing: &mut Vec<Message<Peer, D, V>>) {
        while let Some(c) = self.deferred_greetings.pop_front() {
            outgoing.push(Message::Rebuff {
                from: self.id.clone(),
                to: c.peer,
            });
        }
    }

    fn send_greeting(&mut self, outgoing: &mut Vec<Message<Peer, D, V>>) -> bool {
        if self.greeting_sent || self.arbitration != Arbitration::Idle {
            return false;
        }
        let greeter = match &self.greeter {
            Some(g) => g.clone(),
            None => return false,
        };
        self.attempt += 1;
        self.greeting_sent = true;
        self.greeting_elapsed = 0;
        self.contacted.insert(greeter.clone());
        trace!(
            "peer {:?} greeting {:?} for attempt #{}",
            self.id,
            greeter,
            self.attempt
        );
        outgoing.push(Message::Greeting {
            from: self.id.clone(),
            to: greeter,
            attempt: self.attempt,
        });
        true
    }

    fn all_granted(&self) -> bool {
        match &self.arbitration {
            Arbitration::Requesting { awaiting, .. } => awaiting.is_empty(),
            _ => false,
        }
    }

    // One transition of the member's own state machine; true if anything
    // changed.
    fn advance(&mut self, outgoing: &mut Vec<Message<Peer, D, V>>) -> Result<bool, Error> {
        match self.stage {
            Stage::Failed => Ok(false),
            Stage::Departed => {
                self.rebuff_greetings(outgoing);
                Ok(false)
            }
            Stage::Greeting => Ok(self.send_greeting(outgoing)),
            Stage::Joining => {
                if !self.all_granted() {
                    return Ok(false);
                }
                self.broadcast(ChangeMessage::Join(self.id.clone()), outgoing)?;
                info!("peer {:?} joined council", self.id);
                self.stage = Stage::Active;
                self.greeter = None;
                self.contacted.clear();
                Ok(true)
            }
            Stage::Active => {
                if self.leaving {
                    self.rebuff_greetings(outgoing);
                } else if self.serve_greetings(outgoing) {
                    return Ok(true);
                }
                if self.all_granted() {
                    let change = match self.queue.front() {
                        Some(Proposal::Update(d)) => ChangeMessage::Update(d.clone()),
                        Some(Proposal::Leave) => {
                            match self.state.as_ref().and_then(|s| s.position(&self.id)) {
                                Some(i) => ChangeMessage::Leave(i),
                                None => return Ok(false),
                            }
                        }
                        None => return Ok(false),
                    };
                    self.broadcast(change, outgoing)?;
                    self.queue.pop_front();
                    self.applied += 1;
                    return Ok(true);
                }
                if self.arbitration == Arbitration::Idle
                    && self.holder.is_none()
                    && !self.queue.is_empty()
                {
                    self.attempt += 1;
                    let asked: OrdSet<Peer> = match &self.state {
                        Some(s) => s.peers.iter().filter(|p| **p != self.id).cloned().collect(),
                        None => return Ok(false),
                    };
                    self.request_locks(self.attempt, asked, outgoing);
                    return Ok(true);
                }
                Ok(false)
            }
        }
    }

    fn progress(&mut self, outgoing: &mut Vec<Message<Peer, D, V>>) -> Result<(), Error> {
        while self.advance(outgoing)? {}
        Ok(())
    }
}
