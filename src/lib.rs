// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

/*!
 * This crate implements a "council": a small protocol for keeping one value
 * identical across an open set of communicating processes. Each process runs
 * a `Member` holding its own replica; changes to the value are proposed at
 * any member and committed at every member in the same total order.
 *
 * The protocol is lock-then-broadcast:
 *
 *   - A member proposing a change first wins a council-wide lock by asking
 *     every other member for a grant. Colliding bids are declined and retried
 *     after a backoff, with lower-sorting peers retrying sooner.
 *
 *   - Holding every grant, it broadcasts the change tagged with the next
 *     value of a counter. Committing that change releases each member's
 *     grant. At most one change is in flight at a time, so every member sees
 *     the same change under the same counter.
 *
 *   - Membership changes ride the same path. A joiner fetches a snapshot
 *     from any member it holds a `CouncilHandle` for, then broadcasts its own
 *     `Join`; a leaver broadcasts `Leave` with its position in the list.
 *
 * What this is not: a quorum protocol. It assumes reliable, per-pair FIFO
 * delivery and responsive peers. A member that stops answering stalls every
 * bid, and a member that vanishes without leaving stays listed forever.
 * Nothing is persisted. If you need to survive failures, put this under a
 * failure detector or use real consensus.
 *
 * Like any sans-IO state machine, a `Member` does no I/O of its own. The
 * host routes `Message`s between members, calls `step` with whatever
 * arrived and `tick` periodically, and sends out whatever the member queued.
 *
 * The value is only ever changed by running a caller-supplied `Updater`
 * over each committed diff, so the updater has to be deterministic or the
 * replicas drift apart.
 */

mod cfg;
mod error;
mod member;
mod message;
mod state;
mod updater;


pub use crate::cfg::Config;
pub use crate::error::Error;
pub use crate::member::{Claim, Member, Stage, Ticket};
pub use crate::message::{ChangeMessage, Message};
pub use crate::state::{Commit, CouncilHandle, CouncilState};
pub use crate::updater::Updater;
