//! Construct-once concurrent cache.
//!
//! Backs every memoized table of the compiler: generic instantiations,
//! constructed types, lowered SPIR-V types and compiled functions.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, ThreadId};

/// Returned when the thread constructing an entry asks for that entry again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reentrant;

enum State<V> {
    Empty,
    Building(ThreadId),
    Ready(V),
}

struct Cell<V> {
    state: Mutex<State<V>>,
    ready: Condvar,
}

impl<V> Cell<V> {
    fn new() -> Self {
        Self {
            state: Mutex::new(State::Empty),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Resets a cell to empty if its constructor unwinds.
struct Building<'a, V> {
    cell: &'a Cell<V>,
    finished: bool,
}

impl<V> Drop for Building<'_, V> {
    fn drop(&mut self) {
        if !self.finished {
            *self.cell.lock() = State::Empty;
            self.cell.ready.notify_all();
        }
    }
}

/// A concurrent map whose entries are constructed exactly once.
///
/// The first caller for a key runs the constructor while concurrent callers
/// for the same key block until it finishes, then observe the same value.
/// Lookups of completed entries only take a shared lock on the map. A failed
/// construction leaves no entry behind.
pub struct OnceMap<K, V> {
    cells: RwLock<HashMap<K, Arc<Cell<V>>>>,
}

impl<K, V> Default for OnceMap<K, V> {
    fn default() -> Self {
        Self {
            cells: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> fmt::Debug for OnceMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self
            .cells
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("OnceMap").field("entries", &len).finish()
    }
}

impl<K: Hash + Eq + Clone, V: Clone> OnceMap<K, V> {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the completed value for `key`, if any.
    pub fn get(&self, key: &K) -> Option<V> {
        let cell = self
            .cells
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()?;
        match &*cell.lock() {
            State::Ready(value) => Some(value.clone()),
            State::Empty | State::Building(_) => None,
        }
    }

    /// Returns the number of completed entries.
    pub fn len(&self) -> usize {
        self.cells
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|cell| matches!(*cell.lock(), State::Ready(_)))
            .count()
    }

    /// Returns `true` if no entry has completed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the value for `key`, running `init` if no caller has built it yet.
    ///
    /// Re-entering the same key from inside its own `init` fails with
    /// [`Reentrant`] instead of deadlocking.
    pub fn get_or_try_init<E>(&self, key: &K, init: impl FnOnce() -> Result<V, E>) -> Result<V, E>
    where
        E: From<Reentrant>,
    {
        let cell = self.cell(key);
        let me = thread::current().id();
        {
            let mut state = cell.lock();
            loop {
                match &*state {
                    State::Ready(value) => return Ok(value.clone()),
                    State::Building(owner) if *owner == me => return Err(Reentrant.into()),
                    State::Building(_) => {
                        state = cell
                            .ready
                            .wait(state)
                            .unwrap_or_else(PoisonError::into_inner);
                    }
                    State::Empty => {
                        *state = State::Building(me);
                        break;
                    }
                }
            }
        }

        let mut building = Building {
            cell: &cell,
            finished: false,
        };
        let result = init();
        match &result {
            Ok(value) => {
                *cell.lock() = State::Ready(value.clone());
                building.finished = true;
                cell.ready.notify_all();
            }
            Err(_) => {
                drop(building);
                self.evict(key, &cell);
            }
        }
        result
    }

    fn cell(&self, key: &K) -> Arc<Cell<V>> {
        if let Some(cell) = self
            .cells
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return Arc::clone(cell);
        }
        let mut cells = self.cells.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            cells
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Cell::new())),
        )
    }

    fn evict(&self, key: &K, cell: &Arc<Cell<V>>) {
        let mut cells = self.cells.write().unwrap_or_else(PoisonError::into_inner);
        let stale = match cells.get(key) {
            Some(current) => Arc::ptr_eq(current, cell) && matches!(*current.lock(), State::Empty),
            None => false,
        };
        if stale {
            cells.remove(key);
        }
    }
}
