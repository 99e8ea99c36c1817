//! Merkle trees and BUMP inclusion proofs.
//!
//! A BUMP is the compact proof handed back to clients once their transaction
//! is mined: block height, then one level of sibling hashes per tree level,
//! each leaf tagged with its offset inside that level. Reducing a BUMP with
//! the transaction id must reproduce the block's Merkle root; that property
//! is what the tests below pin down.

use std::fmt;
use std::str::FromStr;

use bytes::{Buf, BufMut, BytesMut};

use arc_types::ChainHash;
use arc_wire::varint;

/// Leaf flag bit: the working hash is duplicated, no hash bytes follow.
const FLAG_DUPLICATE: u8 = 0b01;
/// Leaf flag bit: this leaf is the client's transaction id.
const FLAG_TXID: u8 = 0b10;

/// Builds the full Merkle tree over `leaves`, bottom level first.
///
/// Odd-length levels hash their last entry with itself, as the block header
/// Merkle root does. The returned vector always ends in the single-entry
/// root level.
pub fn build_merkle_tree(leaves: &[ChainHash]) -> Vec<Vec<ChainHash>> {
    let mut levels = vec![leaves.to_vec()];
    while levels.last().is_some_and(|level| level.len() > 1) {
        let prev = levels.last().unwrap();
        let mut next = Vec::with_capacity(prev.len().div_ceil(2));
        for pair in prev.chunks(2) {
            let left = &pair[0];
            let right = pair.get(1).unwrap_or(left);
            next.push(hash_pair(left, right));
        }
        levels.push(next);
    }
    levels
}

/// The root of a tree built by [`build_merkle_tree`].
pub fn merkle_root(levels: &[Vec<ChainHash>]) -> ChainHash {
    levels
        .last()
        .and_then(|level| level.first())
        .copied()
        .unwrap_or(ChainHash::ZERO)
}

fn hash_pair(left: &ChainHash, right: &ChainHash) -> ChainHash {
    let mut concat = [0u8; 64];
    concat[..32].copy_from_slice(left.as_bytes());
    concat[32..].copy_from_slice(right.as_bytes());
    ChainHash::double_sha256(&concat)
}

/// One leaf of a BUMP level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BumpLeaf {
    /// Position inside the level.
    pub offset: u64,
    /// Absent only for duplicate leaves.
    pub hash: Option<ChainHash>,
    /// This leaf carries the client's transaction id.
    pub txid: bool,
    /// The sibling is a copy of the working hash (odd-length level).
    pub duplicate: bool,
}

/// A BSV Unified Merkle Path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bump {
    pub block_height: u64,
    /// Level 0 holds the client txid leaf and its sibling; each level above
    /// holds the single sibling for that height. A coinbase-only block has
    /// one level holding only the txid leaf.
    pub path: Vec<Vec<BumpLeaf>>,
}

/// Errors building, parsing or reducing a [`Bump`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MerkleError {
    #[error("transaction index {index} out of range for {len} leaves")]
    IndexOutOfRange { index: u64, len: usize },
    #[error("bump string is not valid hex")]
    InvalidHex,
    #[error("bump string truncated")]
    Truncated,
    #[error("bump has no levels")]
    Empty,
    #[error("txid is not part of this merkle path")]
    TxidNotInPath,
    #[error("missing sibling at level {0}")]
    MissingSibling(usize),
}

impl Bump {
    /// Extracts the inclusion proof for the leaf at `index` from a tree
    /// built by [`build_merkle_tree`].
    pub fn from_tree(
        block_height: u64,
        levels: &[Vec<ChainHash>],
        index: u64,
    ) -> Result<Self, MerkleError> {
        let leaves = levels.first().ok_or(MerkleError::Empty)?;
        let Some(txid) = leaves.get(index as usize) else {
            return Err(MerkleError::IndexOutOfRange {
                index,
                len: leaves.len(),
            });
        };
        let txid_leaf = BumpLeaf {
            offset: index,
            hash: Some(*txid),
            txid: true,
            duplicate: false,
        };

        // A single-transaction block has no siblings; the path is just the
        // client txid.
        if leaves.len() == 1 {
            return Ok(Self {
                block_height,
                path: vec![vec![txid_leaf]],
            });
        }

        let mut path = Vec::with_capacity(levels.len() - 1);
        let mut offset = index;
        for level in &levels[..levels.len() - 1] {
            let sibling_offset = offset ^ 1;
            let sibling = match level.get(sibling_offset as usize) {
                Some(hash) => BumpLeaf {
                    offset: sibling_offset,
                    hash: Some(*hash),
                    txid: false,
                    duplicate: false,
                },
                None => BumpLeaf {
                    offset: sibling_offset,
                    hash: None,
                    txid: false,
                    duplicate: true,
                },
            };

            let mut entries = vec![sibling];
            if path.is_empty() {
                entries.push(txid_leaf);
                entries.sort_by_key(|leaf| leaf.offset);
            }
            path.push(entries);
            offset >>= 1;
        }

        Ok(Self { block_height, path })
    }

    /// Reduces the path with `txid`, yielding the Merkle root it proves.
    pub fn compute_root(&self, txid: &ChainHash) -> Result<ChainHash, MerkleError> {
        let client = self
            .path
            .first()
            .ok_or(MerkleError::Empty)?
            .iter()
            .find(|leaf| leaf.txid && leaf.hash == Some(*txid))
            .ok_or(MerkleError::TxidNotInPath)?;

        let mut offset = client.offset;
        let mut working = *txid;

        for (height, level) in self.path.iter().enumerate() {
            let sibling_offset = offset ^ 1;
            match level
                .iter()
                .find(|leaf| !leaf.txid && leaf.offset == sibling_offset)
            {
                Some(leaf) if leaf.duplicate => working = hash_pair(&working, &working),
                Some(leaf) => {
                    let sibling = leaf.hash.ok_or(MerkleError::MissingSibling(height))?;
                    working = if offset & 1 == 0 {
                        hash_pair(&working, &sibling)
                    } else {
                        hash_pair(&sibling, &working)
                    };
                }
                // A coinbase-only proof: the txid is the root.
                None if self.path.len() == 1 && level.len() == 1 => {}
                None => return Err(MerkleError::MissingSibling(height)),
            }
            offset >>= 1;
        }

        Ok(working)
    }
}

impl fmt::Display for Bump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = BytesMut::new();
        varint::write_varint(&mut buf, self.block_height);
        buf.put_u8(self.path.len() as u8);
        for level in &self.path {
            varint::write_varint(&mut buf, level.len() as u64);
            for leaf in level {
                varint::write_varint(&mut buf, leaf.offset);
                let mut flags = 0u8;
                if leaf.duplicate {
                    flags |= FLAG_DUPLICATE;
                }
                if leaf.txid {
                    flags |= FLAG_TXID;
                }
                buf.put_u8(flags);
                if !leaf.duplicate {
                    // Encoders always carry the hash outside the duplicate
                    // case; a missing one would make the proof unusable.
                    let hash = leaf.hash.unwrap_or(ChainHash::ZERO);
                    buf.put_slice(hash.as_bytes());
                }
            }
        }
        f.write_str(&hex::encode(&buf))
    }
}

impl FromStr for Bump {
    type Err = MerkleError;

    fn from_str(s: &str) -> Result<Self, MerkleError> {
        let bytes = hex::decode(s).map_err(|_| MerkleError::InvalidHex)?;
        let mut buf = &bytes[..];

        let block_height = varint::read_varint(&mut buf).map_err(|_| MerkleError::Truncated)?;
        if buf.remaining() < 1 {
            return Err(MerkleError::Truncated);
        }
        let tree_height = buf.get_u8();
        if tree_height == 0 {
            return Err(MerkleError::Empty);
        }

        let mut path = Vec::with_capacity(usize::from(tree_height));
        for _ in 0..tree_height {
            let leaf_count = varint::read_varint(&mut buf).map_err(|_| MerkleError::Truncated)?;
            let mut level = Vec::with_capacity(leaf_count as usize);
            for _ in 0..leaf_count {
                let offset = varint::read_varint(&mut buf).map_err(|_| MerkleError::Truncated)?;
                if buf.remaining() < 1 {
                    return Err(MerkleError::Truncated);
                }
                let flags = buf.get_u8();
                let duplicate = flags & FLAG_DUPLICATE != 0;
                let hash = if duplicate {
                    None
                } else {
                    if buf.remaining() < 32 {
                        return Err(MerkleError::Truncated);
                    }
                    let mut hash = [0u8; 32];
                    buf.copy_to_slice(&mut hash);
                    Some(ChainHash::from(hash))
                };
                level.push(BumpLeaf {
                    offset,
                    hash,
                    txid: flags & FLAG_TXID != 0,
                    duplicate,
                });
            }
            path.push(level);
        }

        Ok(Self { block_height, path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hashes(strs: &[&str]) -> Vec<ChainHash> {
        strs.iter()
            .map(|s| ChainHash::from_display_str(s).unwrap())
            .collect()
    }

    // Transactions of testnet block 1584899, merkle root
    // de877b5f2ef9f3e294ce44141c832b84efabea0d825fd3aa7024f23c38feb696.
    const BLOCK_1584899_TXS: [&str; 14] = [
        "30f00edf09d7c4483509a52962e2e6ddfd16a0a146b9068288b1a5a2242e5c7b",
        "63dc4a8c11ec26e141f501e5c0dfa19b463eb5660e483ca5e0c8520979bb37bb",
        "fe220040445774788309ef0399939b70b90f7182dbf3ff24b2eaf6eeac04d395",
        "dcd51904bc0e58199b0c6fa37b8fe3b6f8ba696e6af8ecff27fe181f173346f4",
        "192ec6b58f1087f68728aabac2ce37ebe66e9bfc6f3af51cd39a2535e1100353",
        "e45955e1b4b7d184ffa3f2469f18b4f9b604dce1ba2265523ec2f407ed99ee14",
        "1d03c4f081a9c41b6ec1e45c1edb411de2765f0df3c7dfd5c91f49509af18960",
        "7607fabbd665e1b540647d0df197ec272751257a83265fe6d312909909c25827",
        "4c870f373eac5fb6f0a9e98dce2970047ad9c9f5b0479ae78bab86432439718a",
        "0e28a91a0ff248ef33dba449299a6663b5401f32695b22cb5ee21e0cd2a822d9",
        "d7f5f4ba7d1ae16cc6ff320693bc4299b4117e64afb0e2cc0634950d5a4d054f",
        "c4cebb360bc82d1a6bd1aad631a825ec0dd57eea6964b29551616486255399e1",
        "6346a7249eb0c40efcd5674f0f022e17b720d6f263be2cd2637326f3ee80d16f",
        "d0d4eaaf40a4414f11f895b66ee0ecbe2f71033b45e2faeea2805c9c1da976ef",
    ];

    #[test]
    fn tree_of_real_block_reproduces_header_root() {
        let levels = build_merkle_tree(&hashes(&BLOCK_1584899_TXS));
        let root =
            ChainHash::from_display_str(
                "de877b5f2ef9f3e294ce44141c832b84efabea0d825fd3aa7024f23c38feb696",
            )
            .unwrap();
        assert_eq!(merkle_root(&levels), root);
    }

    #[test]
    fn coinbase_only_bump_matches_reference_string() {
        let txid = ChainHash::from_display_str(
            "3d64b2bb6bd4e85aacb6d1965a2407fa21846c08dd9a8616866ad2f5c80fda7f",
        )
        .unwrap();
        let levels = build_merkle_tree(&[txid]);
        let bump = Bump::from_tree(1_573_650, &levels, 0).unwrap();

        assert_eq!(
            bump.to_string(),
            "fe12031800010100027fda0fc8f5d26a8616869add086c8421fa07245a96d1b6ac5ae8d46bbbb2643d",
        );
        // The proof of a coinbase-only block reduces to the txid itself.
        assert_eq!(bump.compute_root(&txid).unwrap(), txid);
        assert_eq!(merkle_root(&levels), txid);
    }

    #[test]
    fn every_leaf_of_a_real_block_verifies() {
        let txids = hashes(&BLOCK_1584899_TXS);
        let levels = build_merkle_tree(&txids);
        let root = merkle_root(&levels);

        for (index, txid) in txids.iter().enumerate() {
            let bump = Bump::from_tree(1_584_899, &levels, index as u64).unwrap();
            assert_eq!(bump.compute_root(txid).unwrap(), root, "leaf {index}");

            // And the string form round-trips into the same proof.
            let reparsed: Bump = bump.to_string().parse().unwrap();
            assert_eq!(reparsed, bump);
            assert_eq!(reparsed.block_height, 1_584_899);
            assert_eq!(reparsed.compute_root(txid).unwrap(), root);
        }
    }

    #[test]
    fn odd_leaf_counts_use_duplicate_flags() {
        let txids = vec![
            ChainHash::double_sha256(b"a"),
            ChainHash::double_sha256(b"b"),
            ChainHash::double_sha256(b"c"),
        ];
        let levels = build_merkle_tree(&txids);
        let root = merkle_root(&levels);

        // Leaf 2 has no right sibling; its proof starts with a duplicate.
        let bump = Bump::from_tree(100, &levels, 2).unwrap();
        assert!(bump.path[0].iter().any(|leaf| leaf.duplicate));
        assert_eq!(bump.compute_root(&txids[2]).unwrap(), root);

        for (index, txid) in txids.iter().enumerate() {
            let bump = Bump::from_tree(100, &levels, index as u64).unwrap();
            assert_eq!(bump.compute_root(txid).unwrap(), root);

            let reparsed: Bump = bump.to_string().parse().unwrap();
            assert_eq!(reparsed.compute_root(txid).unwrap(), root);
        }
    }

    #[test]
    fn wrong_txid_is_rejected() {
        let txids = vec![ChainHash::double_sha256(b"a"), ChainHash::double_sha256(b"b")];
        let levels = build_merkle_tree(&txids);
        let bump = Bump::from_tree(1, &levels, 0).unwrap();

        assert_eq!(
            bump.compute_root(&ChainHash::double_sha256(b"other")),
            Err(MerkleError::TxidNotInPath),
        );
    }

    #[test]
    fn malformed_strings_error() {
        assert_eq!("zz".parse::<Bump>(), Err(MerkleError::InvalidHex));
        assert_eq!("fe".parse::<Bump>(), Err(MerkleError::Truncated));
        // Height 1, tree height 1, but no leaves follow.
        assert_eq!("0101".parse::<Bump>(), Err(MerkleError::Truncated));
    }

    #[test]
    fn index_out_of_range() {
        let levels = build_merkle_tree(&[ChainHash::double_sha256(b"a")]);
        assert_eq!(
            Bump::from_tree(1, &levels, 5),
            Err(MerkleError::IndexOutOfRange { index: 5, len: 1 }),
        );
    }
}
