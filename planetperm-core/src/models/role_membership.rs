//! Role membership key
//!
//! A 256-bit set where bit *i* means "holds the role whose flag bit index is
//! *i*". Two members with the same roles produce the same key, so every
//! cache in this crate is keyed by the role combination rather than by the
//! member.

use serde::{Deserialize, Serialize};

/// Number of role slots a planet can hand out
pub const MAX_ROLES: usize = 256;

const BLOCKS: usize = MAX_ROLES / 64;

/// Immutable bit set of held role indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct RoleMembership {
    blocks: [u64; BLOCKS],
}

impl RoleMembership {
    /// The membership everyone starts with: the default role at index 0
    pub const DEFAULT: Self = Self::new([1, 0, 0, 0]);

    /// No roles at all
    pub const EMPTY: Self = Self::new([0; BLOCKS]);

    #[must_use]
    pub const fn new(blocks: [u64; BLOCKS]) -> Self {
        Self { blocks }
    }

    /// Build a membership from role indices; indices >= 256 are ignored
    #[must_use]
    pub fn from_role_indices<I>(indices: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        indices
            .into_iter()
            .fold(Self::EMPTY, |acc, index| acc.with_role(index))
    }

    #[must_use]
    pub const fn blocks(&self) -> &[u64; BLOCKS] {
        &self.blocks
    }

    #[must_use]
    pub const fn has_role(&self, index: usize) -> bool {
        if index >= MAX_ROLES {
            return false;
        }
        (self.blocks[index >> 6] & (1u64 << (index & 63))) != 0
    }

    /// Copy with `index` added
    #[must_use]
    pub const fn with_role(mut self, index: usize) -> Self {
        if index < MAX_ROLES {
            self.blocks[index >> 6] |= 1u64 << (index & 63);
        }
        self
    }

    /// Copy with `index` removed
    #[must_use]
    pub const fn without_role(mut self, index: usize) -> Self {
        if index < MAX_ROLES {
            self.blocks[index >> 6] &= !(1u64 << (index & 63));
        }
        self
    }

    #[must_use]
    pub fn role_count(&self) -> usize {
        self.blocks.iter().map(|b| b.count_ones() as usize).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|b| *b == 0)
    }

    /// Held role indices in ascending order, without allocating
    #[must_use]
    pub const fn iter_role_indices(&self) -> RoleIndices {
        RoleIndices {
            blocks: self.blocks,
            block: 0,
        }
    }

    /// 32-byte little-endian encoding
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        for (chunk, block) in out.chunks_exact_mut(8).zip(self.blocks.iter()) {
            chunk.copy_from_slice(&block.to_le_bytes());
        }
        out
    }

    /// Decode [`Self::to_bytes`] output; short input yields [`Self::DEFAULT`]
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        if bytes.len() < 32 {
            return Self::DEFAULT;
        }

        let mut blocks = [0u64; BLOCKS];
        for (block, chunk) in blocks.iter_mut().zip(bytes.chunks_exact(8)) {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(chunk);
            *block = u64::from_le_bytes(buf);
        }
        Self { blocks }
    }
}

/// Iterator over the set bits of a [`RoleMembership`]
#[derive(Debug, Clone)]
pub struct RoleIndices {
    blocks: [u64; BLOCKS],
    block: usize,
}

impl Iterator for RoleIndices {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.block < BLOCKS {
            let bits = self.blocks[self.block];
            if bits != 0 {
                let tz = bits.trailing_zeros() as usize;
                self.blocks[self.block] = bits & (bits - 1);
                return Some((self.block << 6) + tz);
            }
            self.block += 1;
        }
        None
    }
}
