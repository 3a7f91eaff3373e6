use std::io::{self, SeekFrom};
use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::constants::MEBIBYTE;
use crate::part::Part;

pub type Digest32 = [u8; 32];

/// Both checksums of a byte range, computed in one streaming pass.
pub struct RangeDigest {
    /// SHA-256 binary tree hash over 1 MiB leaves.
    pub tree: Digest32,
    /// Plain SHA-256 of the whole range.
    pub linear: Digest32,
}

/// Streaming tree-hash builder. Leaves are SHA-256 digests of consecutive
/// 1 MiB chunks (the last may be shorter). Completed leaves are merged
/// online: whenever the top two stack entries share a level, they are
/// popped, concatenated left‖right, hashed, and pushed one level up. The
/// stack therefore never holds more than log2(range / 1 MiB) digests.
pub struct TreeHasher {
    stack: Vec<(u32, Digest32)>,
    leaf: Sha256,
    leaf_len: usize,
    linear: Sha256,
}

impl TreeHasher {
    pub fn new() -> Self {
        Self {
            stack: Vec::new(),
            leaf: Sha256::new(),
            leaf_len: 0,
            linear: Sha256::new(),
        }
    }

    pub fn update(&mut self, mut data: &[u8]) {
        self.linear.update(data);
        while !data.is_empty() {
            let room = MEBIBYTE as usize - self.leaf_len;
            let take = room.min(data.len());
            self.leaf.update(&data[..take]);
            self.leaf_len += take;
            data = &data[take..];
            if self.leaf_len == MEBIBYTE as usize {
                self.push_leaf();
            }
        }
    }

    fn push_leaf(&mut self) {
        let digest = std::mem::take(&mut self.leaf).finalize().into();
        self.leaf_len = 0;
        self.stack.push((1, digest));
        while self.stack.len() >= 2 {
            let (level_a, _) = self.stack[self.stack.len() - 2];
            let (level_b, _) = self.stack[self.stack.len() - 1];
            if level_a != level_b {
                break;
            }
            let (_, right) = self.stack.pop().unwrap();
            let (level, left) = self.stack.pop().unwrap();
            self.stack.push((level + 1, combine(&left, &right)));
        }
    }

    pub fn finalize(self) -> RangeDigest {
        let TreeHasher {
            mut stack,
            leaf,
            leaf_len,
            linear,
        } = self;
        // Flush the final, possibly short, leaf. An empty range hashes as
        // a single empty leaf so the digest is still defined.
        if leaf_len > 0 || stack.is_empty() {
            stack.push((1, leaf.finalize().into()));
        }
        // Collapse whatever levels remain, ignoring level equality.
        while stack.len() >= 2 {
            let (_, right) = stack.pop().unwrap();
            let (level, left) = stack.pop().unwrap();
            stack.push((level + 1, combine(&left, &right)));
        }
        let (_, tree) = stack.pop().unwrap();
        RangeDigest {
            tree,
            linear: linear.finalize().into(),
        }
    }
}

impl Default for TreeHasher {
    fn default() -> Self {
        Self::new()
    }
}

pub fn combine(left: &Digest32, right: &Digest32) -> Digest32 {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Final archive checksum: pairwise combine across the ordered per-part
/// tree hashes, level by level. An odd tail carries forward unchanged
/// until it pairs with a sibling at a higher level.
///
/// `hashes` must be non-empty.
pub fn root_of(hashes: &[Digest32]) -> Digest32 {
    let mut level: Vec<Digest32> = hashes.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => combine(left, right),
                [lone] => *lone,
                _ => unreachable!(),
            })
            .collect();
    }
    level[0]
}

/// Hash a file range in a single pass, one 1 MiB chunk in memory at a
/// time.
pub async fn hash_range(path: &Path, part: &Part) -> io::Result<RangeDigest> {
    let mut file = File::open(path).await?;
    file.seek(SeekFrom::Start(part.start)).await?;

    let mut hasher = TreeHasher::new();
    let mut buf = vec![0u8; MEBIBYTE as usize];
    let mut remaining = part.len();
    while remaining > 0 {
        let want = (buf.len() as u64).min(remaining) as usize;
        let n = file.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "file shorter than the planned part range",
            ));
        }
        hasher.update(&buf[..n]);
        remaining -= n as u64;
    }
    Ok(hasher.finalize())
}
