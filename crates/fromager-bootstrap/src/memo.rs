//! Per-name memoization table (`spec.md` §5): "at most one in-flight
//! acquire+extract for a given canonical name; other concurrent
//! requirements for the same name block at the memoization point until
//! the first one reaches `Recorded` (or `Failed`)."

use std::sync::Arc;

use fromager_normalize::PackageName;
use fromager_version::Version;
use rustc_hash::FxHashMap;
use tokio::sync::{Mutex, Notify};

#[derive(Debug, Clone)]
enum Entry {
    InProgress(Arc<Notify>),
    Done(Version),
    Failed,
}

/// What the caller should do after consulting the table for a name.
#[derive(Debug, Clone)]
pub enum MemoOutcome {
    /// This caller won the race and must resolve+build the name itself,
    /// then call [`MemoTable::finish`]/[`MemoTable::fail`].
    ClaimedByMe,
    /// Someone else already recorded a version for this name.
    AlreadyDone(Version),
    /// A prior attempt for this name failed terminally.
    AlreadyFailed,
}

/// Guards the single chosen version per canonical name across the whole
/// recursive walk.
#[derive(Default)]
pub struct MemoTable {
    entries: Mutex<FxHashMap<PackageName, Entry>>,
}

impl MemoTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `name` for resolution, waiting out any in-flight attempt by
    /// another caller first. Loops because a waiter may wake to find the
    /// slot claimed again by yet another waiter (spurious notify or a
    /// `Failed` entry that a fresh caller is retrying).
    pub async fn claim_or_wait(&self, name: &PackageName) -> MemoOutcome {
        loop {
            let notify = {
                let mut entries = self.entries.lock().await;
                match entries.get(name) {
                    None => {
                        entries.insert(name.clone(), Entry::InProgress(Arc::new(Notify::new())));
                        return MemoOutcome::ClaimedByMe;
                    }
                    Some(Entry::Done(version)) => return MemoOutcome::AlreadyDone(version.clone()),
                    Some(Entry::Failed) => return MemoOutcome::AlreadyFailed,
                    Some(Entry::InProgress(notify)) => notify.clone(),
                }
            };
            notify.notified().await;
        }
    }

    /// Records the winning version and wakes every waiter.
    pub async fn finish(&self, name: &PackageName, version: Version) {
        let mut entries = self.entries.lock().await;
        if let Some(Entry::InProgress(notify)) = entries.insert(name.clone(), Entry::Done(version)) {
            notify.notify_waiters();
        }
    }

    /// Records terminal failure and wakes every waiter.
    pub async fn fail(&self, name: &PackageName) {
        let mut entries = self.entries.lock().await;
        if let Some(Entry::InProgress(notify)) = entries.insert(name.clone(), Entry::Failed) {
            notify.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_claimer_wins_second_waits_for_result() {
        let table = Arc::new(MemoTable::new());
        let name = PackageName::new("stevedore").unwrap();

        let outcome = table.claim_or_wait(&name).await;
        assert!(matches!(outcome, MemoOutcome::ClaimedByMe));

        let table2 = table.clone();
        let name2 = name.clone();
        let waiter = tokio::spawn(async move { table2.claim_or_wait(&name2).await });

        tokio::task::yield_now().await;
        table.finish(&name, "5.2.0".parse().unwrap()).await;

        let outcome = waiter.await.unwrap();
        match outcome {
            MemoOutcome::AlreadyDone(v) => assert_eq!(v, "5.2.0".parse().unwrap()),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_entry_is_reported_to_waiters() {
        let table = MemoTable::new();
        let name = PackageName::new("stevedore").unwrap();
        table.claim_or_wait(&name).await;
        table.fail(&name).await;
        assert!(matches!(table.claim_or_wait(&name).await, MemoOutcome::AlreadyFailed));
    }
}
