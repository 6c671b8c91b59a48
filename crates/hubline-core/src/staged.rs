//! # Staged Updates
//!
//! Two-phase apply for optimistic updates: stage the new state and keep the
//! previous one, attempt the remote or durable operation, then commit or
//! roll back.
//!
//! ```text
//!   current ──stage(mutate)──► Staged { previous, proposed }
//!                                   │
//!                 remote ok ◄───────┴───────► remote failed
//!                     │                            │
//!                 commit() → proposed          rollback() → previous
//! ```

/// A snapshot/restore pair around a proposed value.
#[derive(Debug, Clone, PartialEq)]
pub struct Staged<T> {
    previous: T,
    proposed: T,
}

impl<T: Clone> Staged<T> {
    /// Snapshots `current` and applies `mutate` to a copy.
    pub fn stage(current: &T, mutate: impl FnOnce(&mut T)) -> Self {
        let mut proposed = current.clone();
        mutate(&mut proposed);
        Staged {
            previous: current.clone(),
            proposed,
        }
    }

    pub fn proposed(&self) -> &T {
        &self.proposed
    }

    pub fn previous(&self) -> &T {
        &self.previous
    }

    /// Keeps the proposed value.
    pub fn commit(self) -> T {
        self.proposed
    }

    /// Restores the snapshot taken at stage time.
    pub fn rollback(self) -> T {
        self.previous
    }

    /// Commits when `outcome` is `Ok`, rolls back otherwise.
    ///
    /// The error is handed back alongside the restored value.
    pub fn settle<E>(self, outcome: Result<(), E>) -> (T, Result<(), E>) {
        match outcome {
            Ok(()) => (self.commit(), Ok(())),
            Err(e) => (self.rollback(), Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_keeps_proposed() {
        let staged = Staged::stage(&vec![1, 2], |v| v.push(3));
        assert_eq!(staged.proposed(), &vec![1, 2, 3]);
        assert_eq!(staged.commit(), vec![1, 2, 3]);
    }

    #[test]
    fn test_rollback_restores_snapshot() {
        let staged = Staged::stage(&String::from("before"), |s| s.push_str("-after"));
        assert_eq!(staged.previous(), "before");
        assert_eq!(staged.rollback(), "before");
    }

    #[test]
    fn test_settle() {
        let staged = Staged::stage(&1, |n| *n += 1);
        let (value, outcome) = staged.settle::<&str>(Err("remote failed"));
        assert_eq!(value, 1);
        assert!(outcome.is_err());

        let (value, outcome) = Staged::stage(&1, |n| *n += 1).settle::<&str>(Ok(()));
        assert_eq!(value, 2);
        assert!(outcome.is_ok());
    }
}
