use std::sync::Arc;

use crate::models::ChannelId;

/// Immutable list of channels a role combination can see.
///
/// Keeps the planet's display order for listing and a sorted copy for
/// membership tests. Cloning is a reference-count bump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelAccessSnapshot {
    inner: Arc<SnapshotInner>,
}

#[derive(Debug, PartialEq, Eq)]
struct SnapshotInner {
    ordered: Box<[ChannelId]>,
    sorted: Box<[ChannelId]>,
}

impl ChannelAccessSnapshot {
    /// Build from ids already in display order
    #[must_use]
    pub fn from_ordered(ids: &[ChannelId]) -> Self {
        let ordered: Box<[ChannelId]> = ids.into();
        let mut sorted = ordered.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        Self {
            inner: Arc::new(SnapshotInner {
                ordered,
                sorted: sorted.into_boxed_slice(),
            }),
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::from_ordered(&[])
    }

    #[must_use]
    pub fn contains(&self, channel_id: ChannelId) -> bool {
        self.inner.sorted.binary_search(&channel_id).is_ok()
    }

    /// Visible channel ids in display order
    #[must_use]
    pub fn ids(&self) -> &[ChannelId] {
        &self.inner.ordered
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.ordered.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.ordered.is_empty()
    }
}
