use crate::verdict::{DenyReason, Verdict};
use std::collections::HashSet;
use std::time::Duration;

/// Distinct actors admitted to one session.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    members: HashSet<String>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit `actor_id` if it is already seated or a seat is free.
    /// Rejoining never changes the member count.
    pub fn join(&mut self, actor_id: &str, max_capacity: u32) -> Verdict {
        let cap = max_capacity as usize;

        if self.members.contains(actor_id) {
            return Verdict::allow(free_seats(cap, self.members.len()), Duration::ZERO);
        }

        if self.members.len() >= cap {
            return Verdict::deny(DenyReason::SessionFull, None);
        }

        self.members.insert(actor_id.to_owned());
        Verdict::allow(free_seats(cap, self.members.len()), Duration::ZERO)
    }

    /// Returns whether the actor was present.
    pub fn remove(&mut self, actor_id: &str) -> bool {
        self.members.remove(actor_id)
    }

    pub fn contains(&self, actor_id: &str) -> bool {
        self.members.contains(actor_id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

fn free_seats(cap: usize, used: usize) -> u32 {
    u32::try_from(cap.saturating_sub(used)).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_counts_down_free_seats() {
        let mut session = SessionRegistry::new();
        assert_eq!(session.join("a", 3).remaining, 2);
        assert_eq!(session.join("b", 3).remaining, 1);
        assert_eq!(session.join("c", 3).remaining, 0);

        let full = session.join("d", 3);
        assert!(!full.allowed);
        assert_eq!(full.reason, Some(DenyReason::SessionFull));
        assert_eq!(full.retry_after, None);
        assert_eq!(session.len(), 3);
    }

    #[test]
    fn rejoin_is_idempotent_even_when_full() {
        let mut session = SessionRegistry::new();
        session.join("a", 2);
        session.join("b", 2);

        let again = session.join("a", 2);
        assert!(again.allowed);
        assert_eq!(again.remaining, 0);
        assert_eq!(session.len(), 2);
    }

    #[test]
    fn remove_frees_a_seat() {
        let mut session = SessionRegistry::new();
        session.join("a", 1);
        assert!(!session.join("b", 1).allowed);

        assert!(session.remove("a"));
        assert!(!session.remove("a"));
        assert!(session.join("b", 1).allowed);
        assert!(session.contains("b"));
    }
}
