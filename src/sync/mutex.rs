//! Process-wide mutex registry keyed by object identity.
//!
//! [`mutex`] addresses a mutex entry by the *identity* of an `Arc`-owned
//! object — pointer identity, not structural equality. Two `Arc`s that are
//! clones of each other address the same entry; two structurally equal but
//! distinct allocations address different entries. Values without stable
//! identity (plain numbers, booleans) cannot be keyed at all: only shared
//! allocations qualify.
//!
//! Contended locks are granted in FIFO arrival order. Release hands the
//! entry directly to the front waiter before waking it, so a later-arriving
//! task polled in between cannot barge ahead.
//!
//! Entries are never explicitly destroyed; an entry whose keyed object has
//! been dropped is reclaimed once it is unheld with no waiters.

use crate::error::{Failure, Status};
use crate::runtime::current_task;
use crate::task::TaskId;

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex, OnceLock, Weak};
use std::task::{Context, Poll, Waker};

static REGISTRY: OnceLock<StdMutex<Registry>> = OnceLock::new();

fn registry() -> &'static StdMutex<Registry> {
    REGISTRY.get_or_init(|| StdMutex::new(Registry::new()))
}

fn current_task_id() -> TaskId {
    current_task().map(|state| state.id).unwrap_or(TaskId::MAIN)
}

struct Waiter {
    task: TaskId,
    waker: Waker,
}

struct Entry {
    holder: Option<TaskId>,
    waiters: VecDeque<Waiter>,
    anchor: Weak<dyn Any + Send + Sync>,
}

impl Entry {
    fn vacant() -> Self {
        let anchor: Weak<dyn Any + Send + Sync> = Weak::<()>::new();
        Self {
            holder: None,
            waiters: VecDeque::new(),
            anchor,
        }
    }

    /// Hands the entry to the next FIFO waiter, or frees it.
    fn release(&mut self) {
        if let Some(next) = self.waiters.pop_front() {
            self.holder = Some(next.task);
            next.waker.wake();
        } else {
            self.holder = None;
        }
    }
}

struct Registry {
    entries: HashMap<usize, Entry>,
}

impl Registry {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    fn reclaim(&mut self) {
        self.entries.retain(|_, entry| {
            entry.holder.is_some() || !entry.waiters.is_empty() || entry.anchor.strong_count() > 0
        });
    }
}

/// Returns the mutex bound to `object`'s identity.
///
/// Repeated calls with clones of the same `Arc` return handles addressing
/// the same entry.
pub fn mutex<T: Send + Sync + 'static>(object: &Arc<T>) -> ScriptMutex {
    let key = Arc::as_ptr(object) as usize;
    let coerced: Arc<dyn Any + Send + Sync> = object.clone();
    let anchor: Weak<dyn Any + Send + Sync> = Arc::downgrade(&coerced);

    let mut reg = registry().lock().unwrap();
    reg.reclaim();

    let entry = reg.entries.entry(key).or_insert_with(Entry::vacant);
    if entry.anchor.strong_count() == 0 {
        entry.anchor = anchor;
    }

    ScriptMutex { key }
}

/// Handle to one identity-keyed mutex entry.
#[derive(Clone, Copy)]
pub struct ScriptMutex {
    key: usize,
}

impl ScriptMutex {
    /// Suspends the current task until it holds the mutex.
    ///
    /// Waiters are served in arrival order. A task that locks an entry it
    /// already holds queues behind itself and deadlocks; guard with
    /// [`Self::try_lock`] where re-entry is possible.
    pub fn lock(&self) -> LockFuture {
        LockFuture {
            key: self.key,
            task: None,
            queued: false,
            finished: false,
        }
    }

    /// Attempts to acquire without suspending. Returns whether the lock
    /// was taken.
    pub fn try_lock(&self) -> bool {
        let me = current_task_id();
        let mut reg = registry().lock().unwrap();
        let entry = reg.entries.entry(self.key).or_insert_with(Entry::vacant);

        if entry.holder.is_none() && entry.waiters.is_empty() {
            entry.holder = Some(me);
            true
        } else {
            false
        }
    }

    /// Releases the mutex, waking the next FIFO waiter.
    ///
    /// Releasing an entry held by another task (or by nobody) is a
    /// programming error: the call fails, and through the try/catch
    /// adapter that failure terminates the offending task.
    pub fn done(&self) -> Status<()> {
        let me = current_task_id();
        let mut reg = registry().lock().unwrap();

        let entry = match reg.entries.get_mut(&self.key) {
            Some(entry) => entry,
            None => return Err(Failure::NotMutexHolder),
        };

        if entry.holder != Some(me) {
            return Err(Failure::NotMutexHolder);
        }

        entry.release();
        Ok(())
    }

    /// Identity of the current holder, or None when free.
    ///
    /// Diagnostics only: the returned task may already have completed by
    /// the time the caller inspects it.
    pub fn holder(&self) -> Option<TaskId> {
        let reg = registry().lock().unwrap();
        reg.entries.get(&self.key).and_then(|entry| entry.holder)
    }
}

/// Future returned by [`ScriptMutex::lock`].
pub struct LockFuture {
    key: usize,
    task: Option<TaskId>,
    queued: bool,
    finished: bool,
}

impl Future for LockFuture {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let me = current_task_id();
        self.task = Some(me);

        let mut reg = registry().lock().unwrap();
        let entry = reg.entries.entry(self.key).or_insert_with(Entry::vacant);

        if self.queued {
            if entry.holder == Some(me) {
                // Granted by the releasing task.
                self.finished = true;
                return Poll::Ready(());
            }

            match entry.waiters.iter_mut().find(|w| w.task == me) {
                Some(waiter) => waiter.waker = cx.waker().clone(),
                None => entry.waiters.push_back(Waiter {
                    task: me,
                    waker: cx.waker().clone(),
                }),
            }
            return Poll::Pending;
        }

        if entry.holder.is_none() && entry.waiters.is_empty() {
            entry.holder = Some(me);
            self.finished = true;
            return Poll::Ready(());
        }

        entry.waiters.push_back(Waiter {
            task: me,
            waker: cx.waker().clone(),
        });
        self.queued = true;
        Poll::Pending
    }
}

impl Drop for LockFuture {
    fn drop(&mut self) {
        if !self.queued || self.finished {
            return;
        }

        // The wait was abandoned (task killed or the future dropped). Leave
        // the queue; if the grant already landed, pass it on.
        let me = match self.task {
            Some(task) => task,
            None => return,
        };

        let mut reg = registry().lock().unwrap();
        if let Some(entry) = reg.entries.get_mut(&self.key) {
            if entry.holder == Some(me) {
                entry.release();
            } else {
                entry.waiters.retain(|w| w.task != me);
            }
        }
    }
}

/// Task-teardown hook: releases everything `task` holds and removes it
/// from every wait queue, waking next waiters. Keeps a killed task from
/// deadlocking the registry.
pub(crate) fn abandon(task: TaskId) {
    let lock = match REGISTRY.get() {
        Some(lock) => lock,
        None => return,
    };

    let mut reg = lock.lock().unwrap();
    for entry in reg.entries.values_mut() {
        entry.waiters.retain(|w| w.task != task);
        if entry.holder == Some(task) {
            entry.release();
        }
    }
    reg.reclaim();
}
