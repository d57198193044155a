// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

use crate::CouncilState;
use serde::{Deserialize, Serialize};

/// A `ChangeMessage` is the content of one committed change. Every member
/// applies the same sequence of them, one per counter value.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChangeMessage<Peer, D> {
    /// A new member is appended to the membership list.
    Join(Peer),
    /// The member at this position in the membership list departs.
    Leave(usize),
    /// An application-level mutation, run through the `Updater`.
    Update(D),
}

/// Messages travel point-to-point between members; routing them to the
/// member named by `to` is the host's job, as is delivering them reliably and
/// in order between any two peers.
///
/// The request/response pairs stand in for the synchronous channels: a
/// `Greeting` is answered by a `Welcome` (or a `Rebuff`), a `LockRequest` by
/// a `LockResponse`. `LockRelease`, `Withdraw` and `Change` are one-way.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Message<Peer: Clone, D, V> {
    Greeting {
        from: Peer,
        to: Peer,
        attempt: u64,
    },
    Welcome {
        from: Peer,
        to: Peer,
        state: CouncilState<Peer, V>,
    },
    Rebuff {
        from: Peer,
        to: Peer,
    },
    LockRequest {
        from: Peer,
        to: Peer,
        attempt: u64,
    },
    LockResponse {
        from: Peer,
        to: Peer,
        attempt: u64,
        granted: bool,
        /// On a decline, the peer currently holding the granter's lock, if
        /// any.
        holder: Option<Peer>,
    },
    LockRelease {
        from: Peer,
        to: Peer,
        attempt: u64,
    },
    /// Sent by a joiner that gives up for good: releases whatever it was
    /// granted up to `attempt`, and lets the recipient forget its attempts so
    /// a later process under the same id starts afresh.
    Withdraw {
        from: Peer,
        to: Peer,
        attempt: u64,
    },
    Change {
        from: Peer,
        to: Peer,
        /// The lock attempt the proposer won; committing the change releases
        /// grants made for it, but not grants for any later attempt.
        attempt: u64,
        counter: u64,
        change: ChangeMessage<Peer, D>,
    },
}

impl<Peer: Clone, D, V> Message<Peer, D, V> {
    pub fn from(&self) -> &Peer {
        match self {
            Message::Greeting { from, .. }
            | Message::Welcome { from, .. }
            | Message::Rebuff { from, .. }
            | Message::LockRequest { from, .. }
            | Message::LockResponse { from, .. }
            | Message::LockRelease { from, .. }
            | Message::Withdraw { from, .. }
            | Message::Change { from, .. } => from,
        }
    }

    pub fn to(&self) -> &Peer {
        match self {
            Message::Greeting { to, .. }
            | Message::Welcome { to, .. }
            | Message::Rebuff { to, .. }
            | Message::LockRequest { to, .. }
            | Message::LockResponse { to, .. }
            | Message::LockRelease { to, .. }
            | Message::Withdraw { to, .. }
            | Message::Change { to, .. } => to,
        }
    }

    /// Short name of the message kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Greeting { .. } => "greeting",
            Message::Welcome { .. } => "welcome",
            Message::Rebuff { .. } => "rebuff",
            Message::LockRequest { .. } => "lock-request",
            Message::LockResponse { .. } => "lock-response",
            Message::LockRelease { .. } => "lock-release",
            Message::Withdraw { .. } => "withdraw",
            Message::Change { .. } => "change",
        }
    }
}
