//! Progress of a publish operation as a single ordered value.

/// Totally ordered phases of an atomic or streaming publication.
///
/// The phase only ever advances; the cleanup epilogue consults it to
/// decide what (if anything) must be undone. Once
/// [`CommitPhase::RenamedPublished`] is reached the destination holds
/// the complete new content and must never be deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CommitPhase {
    /// Nothing irreversible has happened yet.
    Pending,
    /// The temp file exists and is being filled.
    Writing,
    /// File content has been synced per the requested durability.
    SyncedFile,
    /// The temp descriptor is closed.
    Closed,
    /// The rename succeeded; the destination is published.
    RenamedPublished,
    /// The post-publish directory sync was attempted.
    DirectorySyncAttempted,
    /// The directory sync succeeded; the rename itself is durable.
    SyncedDirectory,
}

impl CommitPhase {
    /// The destination holds the new content.
    pub fn published(self) -> bool {
        self >= CommitPhase::RenamedPublished
    }

    /// A directory sync was at least attempted after the rename.
    pub fn durability_attempted(self) -> bool {
        self >= CommitPhase::DirectorySyncAttempted
    }
}

#[cfg(test)]
mod tests {
    use super::CommitPhase::*;

    #[test]
    fn phases_are_totally_ordered() {
        let order = [
            Pending,
            Writing,
            SyncedFile,
            Closed,
            RenamedPublished,
            DirectorySyncAttempted,
            SyncedDirectory,
        ];
        for pair in order.windows(2) {
            assert!(pair[0] < pair[1], "{:?} should precede {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn predicates_switch_at_the_documented_phases() {
        assert!(!Closed.published());
        assert!(RenamedPublished.published());
        assert!(SyncedDirectory.published());

        assert!(!RenamedPublished.durability_attempted());
        assert!(DirectorySyncAttempted.durability_attempted());
    }
}
