//! Engine-wide single-writer lock.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::error::DocqlResult;
use crate::storage::CancelToken;

const POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Default)]
pub(crate) struct WriterLock {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

/// Held by the active writable transaction; released on drop.
#[derive(Debug)]
pub(crate) struct WriterGuard {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl WriterLock {
    /// Waits for the writer slot, polling `cancel` while blocked.
    pub(crate) fn acquire(&self, cancel: &CancelToken) -> DocqlResult<WriterGuard> {
        let (lock, cv) = &*self.inner;
        let mut busy = lock.lock();
        if *busy {
            debug!("waiting for the active writer to finish");
        }
        while *busy {
            cancel.check()?;
            cv.wait_for(&mut busy, POLL);
        }
        *busy = true;
        Ok(WriterGuard {
            inner: self.inner.clone(),
        })
    }
}

impl Drop for WriterGuard {
    fn drop(&mut self) {
        let (lock, cv) = &*self.inner;
        *lock.lock() = false;
        cv.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DocqlError;

    #[test]
    fn second_writer_waits_until_cancelled() {
        let lock = WriterLock::default();
        let _guard = lock.acquire(&CancelToken::new()).unwrap();
        let token = CancelToken::with_timeout(Duration::from_millis(30));
        assert!(matches!(lock.acquire(&token), Err(DocqlError::DeadlineExceeded)));
    }

    #[test]
    fn release_on_drop() {
        let lock = WriterLock::default();
        drop(lock.acquire(&CancelToken::new()).unwrap());
        assert!(lock.acquire(&CancelToken::new()).is_ok());
    }

    #[test]
    fn handoff_between_threads() {
        let lock = WriterLock::default();
        let guard = lock.acquire(&CancelToken::new()).unwrap();
        let other = lock.clone();
        let handle = std::thread::spawn(move || other.acquire(&CancelToken::new()).is_ok());
        std::thread::sleep(Duration::from_millis(30));
        drop(guard);
        assert!(handle.join().unwrap());
    }
}
