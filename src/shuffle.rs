//! Restart-safe shuffle without repetition.
//!
//! The play order is a uniformly random permutation of the catalog's
//! indices, consumed front to back. The permutation and the cursor are
//! persisted in session storage after every draw, so a page navigation
//! within the same tab continues the cycle instead of starting a new one.
//!
//! Invariants upheld by [`TrackOrder::next_track`]:
//! * every index is drawn exactly once per cycle;
//! * when a cycle ends, a new permutation never starts with the index that
//!   ended the previous one (unless there is only one track);
//! * a draw equal to the caller's last index is re-drawn once.
//!
//! Stored state that is not a permutation of the catalog's indices, or a
//! cursor that is not an in-bounds integer, is discarded and regenerated.

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    storage::Storage,
};

/// Shuffle state: a permutation and the position of the next draw.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShuffleState {
    pub order: Vec<usize>,
    pub cursor: usize,
}

impl ShuffleState {
    /// Returns whether this is a valid state for a catalog of `len` tracks.
    #[must_use]
    pub fn is_valid_for(&self, len: usize) -> bool {
        if self.order.len() != len || self.cursor >= len {
            return false;
        }

        let mut seen = vec![false; len];
        self.order.iter().all(|&index| {
            index < len && !std::mem::replace(&mut seen[index], true)
        })
    }
}

/// Track Order Store backed by session storage.
pub struct TrackOrder {
    storage: Box<dyn Storage>,
    order_key: String,
    cursor_key: String,
    len: usize,
    rng: fastrand::Rng,

    /// Last state written, used when storage refuses reads.
    fallback: Option<ShuffleState>,
}

impl TrackOrder {
    #[must_use]
    pub fn new(
        storage: Box<dyn Storage>,
        order_key: impl Into<String>,
        cursor_key: impl Into<String>,
        len: usize,
    ) -> Self {
        Self::with_rng(storage, order_key, cursor_key, len, fastrand::Rng::new())
    }

    /// Creates a store with a given random number generator, for
    /// reproducible orders.
    #[must_use]
    pub fn with_rng(
        storage: Box<dyn Storage>,
        order_key: impl Into<String>,
        cursor_key: impl Into<String>,
        len: usize,
        rng: fastrand::Rng,
    ) -> Self {
        Self {
            storage,
            order_key: order_key.into(),
            cursor_key: cursor_key.into(),
            len,
            rng,
            fallback: None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the next catalog index to play.
    ///
    /// `last` is the index that is currently loaded, if any. Returns `None`
    /// only for an empty catalog.
    pub fn next_track(&mut self, last: Option<usize>) -> Option<usize> {
        if self.len == 0 {
            return None;
        }

        let mut state = self.load();
        let mut index = self.draw(&mut state);

        if self.len > 1 && Some(index) == last {
            trace!("drew {index} twice in a row, drawing once more");
            index = self.draw(&mut state);
        }

        self.save(&state);
        Some(index)
    }

    /// Discards the stored state for a catalog of a new size.
    pub fn reset(&mut self, len: usize) {
        self.len = len;
        self.fallback = None;
        for key in [&self.order_key, &self.cursor_key] {
            if let Err(e) = self.storage.remove(key) {
                debug!("could not clear {key}: {e}");
            }
        }
    }

    /// Takes `order[cursor]` and advances, regenerating at the end of the
    /// cycle.
    fn draw(&mut self, state: &mut ShuffleState) -> usize {
        let index = state.order[state.cursor];
        state.cursor += 1;

        if state.cursor >= state.order.len() {
            let mut order = self.permutation();
            if order.len() > 1 && order[0] == index {
                order.swap(0, 1);
            }
            trace!("shuffle cycle complete, new order: {order:?}");
            state.order = order;
            state.cursor = 0;
        }

        index
    }

    /// Fisher–Yates over `0..len`.
    fn permutation(&mut self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.len).collect();
        for i in (1..order.len()).rev() {
            let j = self.rng.usize(..=i);
            order.swap(i, j);
        }
        order
    }

    fn load(&mut self) -> ShuffleState {
        match self.read() {
            Ok(state) if state.is_valid_for(self.len) => return state,
            Ok(state) => debug!(
                "discarding shuffle state for {} tracks: {state:?}",
                self.len
            ),
            Err(e) => match self.fallback.take() {
                Some(state) if state.is_valid_for(self.len) => {
                    trace!("shuffle state not readable ({e}), using last known");
                    return state;
                }
                _ => debug!("shuffle state not readable: {e}"),
            },
        }

        ShuffleState {
            order: self.permutation(),
            cursor: 0,
        }
    }

    fn read(&self) -> Result<ShuffleState> {
        let order = self
            .storage
            .get(&self.order_key)?
            .ok_or_else(|| Error::not_found("no shuffle order"))?;
        let cursor = self
            .storage
            .get(&self.cursor_key)?
            .ok_or_else(|| Error::not_found("no shuffle cursor"))?;

        Ok(ShuffleState {
            order: serde_json::from_str(&order)?,
            cursor: serde_json::from_str(&cursor)?,
        })
    }

    fn save(&mut self, state: &ShuffleState) {
        let written = serde_json::to_string(&state.order)
            .map_err(Error::from)
            .and_then(|order| self.storage.set(&self.order_key, &order))
            .and_then(|()| {
                self.storage
                    .set(&self.cursor_key, &state.cursor.to_string())
            });

        if let Err(e) = written {
            debug!("could not persist shuffle state: {e}");
        }
        self.fallback = Some(state.clone());
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, collections::HashSet, rc::Rc};

    use super::*;
    use crate::storage::{MemoryStorage, UnavailableStorage};

    const ORDER: &str = "order";
    const CURSOR: &str = "cursor";

    fn store(storage: &Rc<RefCell<MemoryStorage>>, len: usize, seed: u64) -> TrackOrder {
        TrackOrder::with_rng(
            Box::new(Rc::clone(storage)),
            ORDER,
            CURSOR,
            len,
            fastrand::Rng::with_seed(seed),
        )
    }

    #[test]
    fn every_index_once_per_cycle() {
        for len in 1..=12 {
            for seed in 0..20 {
                let storage = Rc::new(RefCell::new(MemoryStorage::new()));
                let mut order = store(&storage, len, seed);

                let cycle: Vec<usize> = (0..len).map(|_| order.next_track(None).unwrap()).collect();
                let unique: HashSet<_> = cycle.iter().copied().collect();
                assert_eq!(unique.len(), len, "len {len} seed {seed}: {cycle:?}");
                assert!(cycle.iter().all(|&i| i < len));
            }
        }
    }

    #[test]
    fn no_repeat_across_cycle_boundary() {
        for len in 2..=6 {
            for seed in 0..200 {
                let storage = Rc::new(RefCell::new(MemoryStorage::new()));
                let mut order = store(&storage, len, seed);

                let mut previous = None;
                for _ in 0..(len * 4) {
                    let next = order.next_track(None).unwrap();
                    assert_ne!(Some(next), previous, "len {len} seed {seed}");
                    previous = Some(next);
                }
            }
        }
    }

    #[test]
    fn boundary_swap_when_new_cycle_starts_with_last() {
        // Three tracks, cycle consumed as B, C, A. Whatever the fresh
        // permutation is, it must not open with A.
        for seed in 0..100 {
            let storage = Rc::new(RefCell::new(MemoryStorage::new()));
            storage.borrow_mut().set(ORDER, "[1,2,0]").unwrap();
            storage.borrow_mut().set(CURSOR, "0").unwrap();
            let mut order = store(&storage, 3, seed);

            assert_eq!(order.next_track(None), Some(1));
            assert_eq!(order.next_track(Some(1)), Some(2));
            assert_eq!(order.next_track(Some(2)), Some(0));
            assert_ne!(order.next_track(Some(0)), Some(0), "seed {seed}");
        }
    }

    #[test]
    fn redraw_when_caller_index_comes_up() {
        let storage = Rc::new(RefCell::new(MemoryStorage::new()));
        storage.borrow_mut().set(ORDER, "[2,0,1,3]").unwrap();
        storage.borrow_mut().set(CURSOR, "0").unwrap();
        let mut order = store(&storage, 4, 7);

        assert_eq!(order.next_track(Some(2)), Some(0));
        assert_eq!(storage.borrow().get(CURSOR).unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn single_track_repeats() {
        let storage = Rc::new(RefCell::new(MemoryStorage::new()));
        let mut order = store(&storage, 1, 1);
        assert_eq!(order.next_track(None), Some(0));
        assert_eq!(order.next_track(Some(0)), Some(0));
        assert_eq!(order.next_track(Some(0)), Some(0));
    }

    #[test]
    fn empty_catalog_draws_nothing() {
        let storage = Rc::new(RefCell::new(MemoryStorage::new()));
        let mut order = store(&storage, 0, 1);
        assert_eq!(order.next_track(None), None);
    }

    #[test]
    fn continues_stored_cycle_after_restart() {
        let storage = Rc::new(RefCell::new(MemoryStorage::new()));
        let first: Vec<usize> = {
            let mut order = store(&storage, 5, 3);
            (0..2).map(|_| order.next_track(None).unwrap()).collect()
        };

        let mut order = store(&storage, 5, 99);
        let rest: Vec<usize> = (0..3).map(|_| order.next_track(None).unwrap()).collect();

        let all: HashSet<_> = first.iter().chain(&rest).copied().collect();
        assert_eq!(all.len(), 5);
    }

    #[test]
    fn malformed_state_is_regenerated() {
        let cases = [
            ("[0,1]", "0"),         // wrong length
            ("[0,1,7]", "0"),       // out of range
            ("[0,1,1]", "0"),       // not a permutation
            ("[0,1,-2]", "0"),      // negative
            ("[0,1,2]", "3"),       // cursor out of bounds
            ("[0,1,2]", "1.5"),     // non-integer cursor
            ("[0,1,2]", "\"one\""), // non-numeric cursor
            ("{\"a\":1}", "0"),     // wrong shape
            ("[0,1,", "0"),         // corrupt encoding
        ];

        for (raw_order, raw_cursor) in cases {
            let storage = Rc::new(RefCell::new(MemoryStorage::new()));
            storage.borrow_mut().set(ORDER, raw_order).unwrap();
            storage.borrow_mut().set(CURSOR, raw_cursor).unwrap();
            let mut order = store(&storage, 3, 5);

            let cycle: HashSet<usize> = (0..3).map(|_| order.next_track(None).unwrap()).collect();
            assert_eq!(cycle.len(), 3, "{raw_order} / {raw_cursor}");

            let stored: Vec<usize> =
                serde_json::from_str(&storage.borrow().get(ORDER).unwrap().unwrap()).unwrap();
            assert!(
                ShuffleState { order: stored, cursor: 0 }.is_valid_for(3),
                "{raw_order} / {raw_cursor}"
            );
        }
    }

    #[test]
    fn reset_for_new_catalog_size() {
        let storage = Rc::new(RefCell::new(MemoryStorage::new()));
        let mut order = store(&storage, 4, 11);
        order.next_track(None);

        order.reset(2);
        assert_eq!(storage.borrow().get(ORDER).unwrap(), None);
        let drawn: HashSet<usize> = (0..2).map(|_| order.next_track(None).unwrap()).collect();
        assert_eq!(drawn, HashSet::from([0, 1]));
    }

    #[test]
    fn keeps_cycling_without_storage() {
        let mut order = TrackOrder::with_rng(
            Box::new(UnavailableStorage),
            ORDER,
            CURSOR,
            4,
            fastrand::Rng::with_seed(2),
        );
        let cycle: HashSet<usize> = (0..4).map(|_| order.next_track(None).unwrap()).collect();
        assert_eq!(cycle.len(), 4);
    }
}
