// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

use crate::{ChangeMessage, Error, Updater};
use im::Vector;
use serde::{Deserialize, Serialize};

/// The replicated part of a member: membership list, value and change
/// counter. Quiescent members all hold equal `CouncilState`s, and a joiner
/// starts from a snapshot of one.
///
/// Peer order matters: a `Leave` names its departing member by position, so
/// every replica keeps `peers` in the same order. `Vector` gives a true
/// ordered removal and makes snapshots cheap to clone.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CouncilState<Peer: Clone, V> {
    pub peers: Vector<Peer>,
    pub value: V,
    pub counter: u64,
}

impl<Peer: Clone + PartialEq, V> CouncilState<Peer, V> {
    /// State of a single-member council seeded with `value`.
    pub fn founding(peer: Peer, value: V) -> Self {
        CouncilState {
            peers: Vector::unit(peer),
            value,
            counter: 0,
        }
    }

    pub fn position(&self, peer: &Peer) -> Option<usize> {
        self.peers.index_of(peer)
    }

    pub fn contains(&self, peer: &Peer) -> bool {
        self.position(peer).is_some()
    }

    /// Applies the change numbered `counter`, which has to be the next one.
    /// On error nothing is modified.
    pub fn commit<D, U: Updater<D, V>>(
        &mut self,
        counter: u64,
        change: &ChangeMessage<Peer, D>,
        updater: &U,
    ) -> Result<(), Error> {
        let expected = self.counter + 1;
        if counter != expected {
            return Err(Error::CounterMismatch {
                expected,
                received: counter,
            });
        }
        match change {
            ChangeMessage::Join(peer) => self.peers.push_back(peer.clone()),
            ChangeMessage::Leave(index) => {
                if *index >= self.peers.len() {
                    return Err(Error::LeaveOutOfRange {
                        index: *index,
                        len: self.peers.len(),
                    });
                }
                self.peers.remove(*index);
            }
            ChangeMessage::Update(diff) => updater.update(diff, &mut self.value),
        }
        self.counter = counter;
        Ok(())
    }
}

/// A `CouncilHandle` is what gets handed to a process that wants to join: it
/// names the member whose greeting channel the joiner should contact. It is
/// only good for as long as that member stays in the council.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CouncilHandle<Peer> {
    pub greeter: Peer,
}

/// One entry of a member's commit log: the change that was committed under
/// `counter`, and the member that proposed it.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Commit<Peer, D> {
    pub counter: u64,
    pub from: Peer,
    pub change: ChangeMessage<Peer, D>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(d: &i64, v: &mut i64) {
        *v += *d;
    }

    type State = CouncilState<char, i64>;
    type Change = ChangeMessage<char, i64>;

    fn three_peers() -> State {
        let mut st = State::founding('a', 10);
        st.commit(1, &Change::Join('b'), &add).unwrap();
        st.commit(2, &Change::Join('c'), &add).unwrap();
        st
    }

    #[test]
    fn joins_append_in_order() {
        let st = three_peers();
        assert_eq!(st.peers.iter().collect::<String>(), "abc");
        assert_eq!(st.counter, 2);
        assert_eq!(st.position(&'c'), Some(2));
        assert!(!st.contains(&'z'));
    }

    #[test]
    fn leave_keeps_remaining_order() {
        let mut st = three_peers();
        st.commit(3, &Change::Leave(0), &add).unwrap();
        assert_eq!(st.peers.iter().collect::<String>(), "bc");
        assert_eq!(st.position(&'c'), Some(1));
    }

    #[test]
    fn update_runs_updater() {
        let mut st = three_peers();
        st.commit(3, &Change::Update(5), &add).unwrap();
        st.commit(4, &Change::Update(-2), &add).unwrap();
        assert_eq!(st.value, 13);
        assert_eq!(st.counter, 4);
    }

    #[test]
    fn out_of_sequence_change_is_rejected() {
        let mut st = three_peers();
        let before = st.clone();
        assert_eq!(
            st.commit(4, &Change::Update(1), &add),
            Err(Error::CounterMismatch {
                expected: 3,
                received: 4
            })
        );
        assert_eq!(
            st.commit(2, &Change::Update(1), &add),
            Err(Error::CounterMismatch {
                expected: 3,
                received: 2
            })
        );
        assert_eq!(st, before);
    }

    #[test]
    fn leave_out_of_range_is_rejected() {
        let mut st = three_peers();
        assert_eq!(
            st.commit(3, &Change::Leave(3), &add),
            Err(Error::LeaveOutOfRange { index: 3, len: 3 })
        );
        assert_eq!(st.counter, 2);
    }
}
