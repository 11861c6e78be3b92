//! Waker implementation that re-queues tasks on wake.
//!
//! Implements the standard raw-waker protocol over an `Arc<Task<T>>`: waking
//! pushes the task back onto its runtime's queue so the executor polls it
//! again.

use crate::task::{Runnable, Task};

use std::sync::Arc;
use std::task::{RawWaker, RawWakerVTable, Waker};

struct TaskWaker<T> {
    task: Arc<Task<T>>,
}

impl<T: 'static> TaskWaker<T> {
    fn wake(&self) {
        let runnable: Arc<dyn Runnable> = self.task.clone();
        self.task.queue.push(runnable);
    }

    fn clone_raw(ptr: *const ()) -> RawWaker {
        unsafe {
            let arc = Arc::<TaskWaker<T>>::from_raw(ptr as *const TaskWaker<T>);
            let cloned = arc.clone();
            std::mem::forget(arc);
            RawWaker::new(Arc::into_raw(cloned) as *const (), &Self::VTABLE)
        }
    }

    fn wake_raw(ptr: *const ()) {
        unsafe {
            let arc = Arc::<TaskWaker<T>>::from_raw(ptr as *const TaskWaker<T>);
            arc.wake();
        }
    }

    fn wake_by_ref_raw(ptr: *const ()) {
        unsafe {
            let arc = Arc::<TaskWaker<T>>::from_raw(ptr as *const TaskWaker<T>);
            arc.wake();
            let _ = Arc::into_raw(arc);
        }
    }

    fn drop_raw(ptr: *const ()) {
        unsafe {
            drop(Arc::<TaskWaker<T>>::from_raw(ptr as *const TaskWaker<T>));
        }
    }

    const VTABLE: RawWakerVTable = RawWakerVTable::new(
        Self::clone_raw,
        Self::wake_raw,
        Self::wake_by_ref_raw,
        Self::drop_raw,
    );
}

/// Creates a Waker that re-queues `task` when called.
pub(crate) fn make_waker<T: 'static>(task: Arc<Task<T>>) -> Waker {
    let w = Arc::new(TaskWaker { task });
    let raw = RawWaker::new(Arc::into_raw(w) as *const (), &TaskWaker::<T>::VTABLE);
    unsafe { Waker::from_raw(raw) }
}
