use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Local};

// A panic inside a user supplied formatter or sink must not take the logger down with it, so
// poisoned locks are entered anyway.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Elapsed time between two dispatches, clamped at zero and truncated to milliseconds.
pub fn elapsed_between(last_time: &DateTime<Local>, time: &DateTime<Local>) -> Duration {
    let elapsed = (*time - *last_time).to_std().unwrap_or_default();
    Duration::from_millis(elapsed.as_millis() as u64)
}

pub fn format_delta(last_time: &DateTime<Local>, time: &DateTime<Local>) -> String {
    humantime::format_duration(elapsed_between(last_time, time)).to_string()
}
