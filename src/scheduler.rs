//! Coalescing of rebuild requests.
//!
//! Any thread may call [`Invalidator::request_rebuild`]. Each call bumps the generation counter,
//! but only the call that finds no rebuild pending enqueues a task, so any number of requests
//! between two turns of the host loop collapse into one pass.

use crate::dynamic::DynamicValue;
use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Work handed to the build thread.
pub enum Task {
    /// Rebuild at the latest generation. `generation` is the value when the task was scheduled.
    Rebuild { generation: u64 },
    /// Install an observer in the dynamic value registry.
    Register(Box<dyn DynamicValue>),
}

#[derive(Debug, Default)]
struct State {
    generation: AtomicU64,
    pending: AtomicBool,
}

/// A cloneable, thread-safe handle for requesting rebuilds.
#[derive(Clone)]
pub struct Invalidator {
    state: Arc<State>,
    sender: Sender<Task>,
}

impl Invalidator {
    /// Marks the UI dirty. Returns the new generation.
    pub fn request_rebuild(&self) -> u64 {
        let generation = self.state.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if self
            .state
            .pending
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            // the receiver only goes away with the host, at which point nobody is listening
            let _ = self.sender.send(Task::Rebuild { generation });
        }
        generation
    }

    /// The current generation.
    pub fn generation(&self) -> u64 {
        self.state.generation.load(Ordering::SeqCst)
    }

    /// Returns true if a rebuild has been scheduled but has not started yet.
    pub fn is_pending(&self) -> bool {
        self.state.pending.load(Ordering::SeqCst)
    }

    /// Hands an observer to the build thread. It is installed at the start of the next turn.
    pub fn register_observer<O: DynamicValue + 'static>(&self, observer: O) {
        let _ = self.sender.send(Task::Register(Box::new(observer)));
    }
}

/// What one turn of the host loop has to do.
#[derive(Default)]
pub struct Turn {
    /// Observers handed over since the last turn.
    pub registrations: Vec<Box<dyn DynamicValue>>,
    /// The generation to rebuild at, if a rebuild is due.
    pub rebuild: Option<u64>,
}

/// The receiving end, owned by the build thread.
pub struct Scheduler {
    state: Arc<State>,
    sender: Sender<Task>,
    receiver: Receiver<Task>,
    built: Option<u64>,
    executed: u64,
    skipped: u64,
}

impl Scheduler {
    pub fn new() -> Scheduler {
        let (sender, receiver) = channel::unbounded();
        Scheduler {
            state: Arc::new(State::default()),
            sender,
            receiver,
            built: None,
            executed: 0,
            skipped: 0,
        }
    }

    pub fn invalidator(&self) -> Invalidator {
        Invalidator {
            state: Arc::clone(&self.state),
            sender: self.sender.clone(),
        }
    }

    /// Drains the task queue.
    ///
    /// A rebuild is due if a rebuild task was queued and the generation has moved since the last
    /// pass marked built. A task whose generation was already covered is stale and skipped.
    pub fn turn(&mut self) -> Turn {
        let mut turn = Turn::default();
        let mut requested = false;
        loop {
            match self.receiver.try_recv() {
                Ok(Task::Rebuild { generation }) => {
                    trace!(generation, "rebuild task");
                    requested = true;
                }
                Ok(Task::Register(observer)) => turn.registrations.push(observer),
                Err(TryRecvError::Empty) => break,
                // we hold a sender ourselves
                Err(TryRecvError::Disconnected) => break,
            }
        }

        if requested {
            // clear the flag before reading the counter so a request racing with this turn is
            // either seen now or schedules a task of its own
            self.state.pending.store(false, Ordering::SeqCst);
            let current = self.state.generation.load(Ordering::SeqCst);
            if self.built == Some(current) {
                trace!(generation = current, "skipping stale rebuild");
                self.skipped += 1;
            } else {
                turn.rebuild = Some(current);
            }
        }
        turn
    }

    /// Records that a pass has been built at `generation`.
    pub fn mark_built(&mut self, generation: u64) {
        self.built = Some(generation);
        self.executed += 1;
    }

    /// The generation of the last built pass.
    pub fn built(&self) -> Option<u64> {
        self.built
    }

    pub fn generation(&self) -> u64 {
        self.state.generation.load(Ordering::SeqCst)
    }

    /// Number of passes marked built.
    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// Number of rebuild tasks found stale.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl Default for Scheduler {
    fn default() -> Scheduler {
        Scheduler::new()
    }
}
