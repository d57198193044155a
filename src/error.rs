// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

/// Errors surfaced by a `Member` to its host.
///
/// Only join failures are expected in normal operation. A `CounterMismatch`
/// means the transport broke its reliable-FIFO promise or the lock protocol
/// has a bug; there is no resynchronization path, so the member stops
/// participating and reports `Failed` from then on.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A change arrived out of sequence.
    #[error("change #{received} arrived at peer expecting #{expected}")]
    CounterMismatch { expected: u64, received: u64 },

    /// A change arrived before this member's own join committed.
    #[error("change #{counter} arrived before this peer joined")]
    UnexpectedChange { counter: u64 },

    /// A `Leave` named a position outside the membership list.
    #[error("leave of position {index} in a council of {len} peers")]
    LeaveOutOfRange { index: usize, len: usize },

    /// The greeter has left, or is leaving, the council. The host can retry
    /// through a handle to some other member.
    #[error("greeting rebuffed by a departing member")]
    JoinRefused,

    /// No welcome arrived before the configured greeting timeout.
    #[error("no welcome within {0} ticks")]
    GreetingTimedOut(u32),

    /// The member has left the council and accepts no more changes.
    #[error("member has departed")]
    Departed,

    /// A leave is already queued; no more changes are accepted.
    #[error("member is leaving")]
    Leaving,

    /// A previous fatal error stopped this member.
    #[error("member has failed")]
    Failed,
}
