//! Striped per-user locks.

use std::hash::{DefaultHasher, Hash, Hasher};
use tally_core::UserId;
use tokio::sync::{Mutex, MutexGuard};

/// Fixed pool of async mutexes; a user always maps to the same stripe.
///
/// Two users may share a stripe and then wait on each other briefly. Memory
/// stays bounded regardless of how many users are seen.
pub(crate) struct UserLocks {
    stripes: Vec<Mutex<()>>,
}

impl UserLocks {
    pub(crate) fn new(stripes: usize) -> Self {
        Self {
            stripes: (0..stripes.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    fn stripe(&self, user_id: &UserId) -> usize {
        let mut hasher = DefaultHasher::new();
        user_id.hash(&mut hasher);
        (hasher.finish() % self.stripes.len() as u64) as usize
    }

    pub(crate) async fn lock(&self, user_id: &UserId) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe(user_id)].lock().await
    }
}
