//! Canonical file chunking.
//!
//! The content address of a file is defined by this module alone: a file
//! hash is the SHA-256 of the concatenation of its chunks in index order,
//! and [`split`] / [`verify_and_assemble`] are the only sanctioned way to
//! produce and consume that representation.

use crate::event::sha256_hex;
use crate::CHUNK_SIZE;

/// A contiguous slice of file bytes plus its integrity metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 0-based position within the file.
    pub index: u32,
    /// Total number of chunks in the file, identical on every chunk.
    pub total: u32,
    /// Raw payload bytes.
    pub bytes: Vec<u8>,
    /// Hex SHA-256 of `bytes`.
    pub hash: String,
}

impl Chunk {
    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Recompute the payload digest and compare it to the advertised hash.
    pub fn verify(&self) -> bool {
        sha256_hex(&self.bytes) == self.hash
    }
}

/// Failures detected while verifying and reassembling chunks.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChunkerError {
    #[error("duplicate chunk index {0}")]
    DuplicateIndex(u32),

    #[error("chunk {index} hash mismatch")]
    ChunkHashMismatch { index: u32 },

    #[error("file hash mismatch: expected {expected}, got {actual}")]
    FileHashMismatch { expected: String, actual: String },
}

/// Partition `data` into consecutive [`CHUNK_SIZE`] slices, index 0 first.
///
/// Every chunk except possibly the last has size exactly [`CHUNK_SIZE`];
/// the last has size in `[1, CHUNK_SIZE]`. Empty input yields an empty
/// list, which the protocol refuses to store.
pub fn split(data: &[u8]) -> Vec<Chunk> {
    let total = data.len().div_ceil(CHUNK_SIZE) as u32;
    data.chunks(CHUNK_SIZE)
        .enumerate()
        .map(|(index, slice)| Chunk {
            index: index as u32,
            total,
            bytes: slice.to_vec(),
            hash: sha256_hex(slice),
        })
        .collect()
}

/// Verify every chunk, concatenate in index order, and check the result
/// against `expected_file_hash`.
///
/// Chunks may arrive in any order. A repeated index, a chunk whose payload
/// disagrees with its advertised hash, or a concatenation whose digest is
/// not `expected_file_hash` all fail the assembly.
pub fn verify_and_assemble(
    chunks: &[Chunk],
    expected_file_hash: &str,
) -> Result<Vec<u8>, ChunkerError> {
    let mut ordered: Vec<&Chunk> = chunks.iter().collect();
    ordered.sort_by_key(|chunk| chunk.index);

    for pair in ordered.windows(2) {
        if pair[0].index == pair[1].index {
            return Err(ChunkerError::DuplicateIndex(pair[0].index));
        }
    }

    let mut data = Vec::with_capacity(chunks.iter().map(Chunk::size).sum());
    for chunk in &ordered {
        if !chunk.verify() {
            return Err(ChunkerError::ChunkHashMismatch { index: chunk.index });
        }
        data.extend_from_slice(&chunk.bytes);
    }

    let actual = sha256_hex(&data);
    if actual != expected_file_hash {
        return Err(ChunkerError::FileHashMismatch {
            expected: expected_file_hash.to_string(),
            actual,
        });
    }

    Ok(data)
}

/// True when `s` is a well-formed content address: 64 lowercase hex chars.
pub fn is_valid_file_hash(s: &str) -> bool {
    s.len() == 64
        && s.bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{RngCore, SeedableRng};

    #[test]
    fn split_small_input_yields_single_chunk() {
        let data = b"Hello, World!";
        let chunks = split(data);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].total, 1);
        assert_eq!(chunks[0].size(), data.len());
        assert_eq!(chunks[0].hash, sha256_hex(data));
    }

    #[test]
    fn split_respects_chunk_size_bounds() {
        // Two full chunks plus a 5-byte tail.
        let data = vec![0x41u8; CHUNK_SIZE * 2 + 5];
        let chunks = split(&data);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].size(), CHUNK_SIZE);
        assert_eq!(chunks[1].size(), CHUNK_SIZE);
        assert_eq!(chunks[2].size(), 5);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i as u32);
            assert_eq!(chunk.total, 3);
        }
    }

    #[test]
    fn split_exact_multiple_has_full_last_chunk() {
        let data = vec![0u8; CHUNK_SIZE * 2];
        let chunks = split(&data);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].size(), CHUNK_SIZE);
    }

    #[test]
    fn split_empty_input_is_empty() {
        assert!(split(b"").is_empty());
    }

    #[test]
    fn assemble_out_of_order_chunks() {
        let data: Vec<u8> = (0..CHUNK_SIZE * 3 + 17).map(|i| i as u8).collect();
        let file_hash = sha256_hex(&data);

        let mut chunks = split(&data);
        chunks.reverse();

        let assembled = verify_and_assemble(&chunks, &file_hash).unwrap();
        assert_eq!(assembled, data);
    }

    #[test]
    fn assemble_rejects_wrong_file_hash() {
        let data = b"Test data for chunk verification";
        let chunks = split(data);
        let wrong = "0".repeat(64);

        let err = verify_and_assemble(&chunks, &wrong).unwrap_err();
        assert!(matches!(err, ChunkerError::FileHashMismatch { .. }));
    }

    #[test]
    fn assemble_rejects_corrupted_chunk() {
        let data = vec![0x5au8; CHUNK_SIZE + 100];
        let file_hash = sha256_hex(&data);

        let mut chunks = split(&data);
        chunks[0].bytes[0] ^= 0xff;

        let err = verify_and_assemble(&chunks, &file_hash).unwrap_err();
        assert_eq!(err, ChunkerError::ChunkHashMismatch { index: 0 });
    }

    #[test]
    fn assemble_rejects_duplicate_index() {
        let data = vec![0x11u8; CHUNK_SIZE * 2];
        let file_hash = sha256_hex(&data);

        let mut chunks = split(&data);
        chunks[1].index = 0;

        let err = verify_and_assemble(&chunks, &file_hash).unwrap_err();
        assert_eq!(err, ChunkerError::DuplicateIndex(0));
    }

    #[test]
    fn round_trip_random_lengths() {
        let mut rng = StdRng::seed_from_u64(7);
        let lengths = [
            0usize,
            1,
            CHUNK_SIZE - 1,
            CHUNK_SIZE,
            CHUNK_SIZE + 1,
            3 * CHUNK_SIZE + 4096,
            1024 * 1024,
        ];

        for len in lengths {
            let mut data = vec![0u8; len];
            rng.fill_bytes(&mut data);
            let file_hash = sha256_hex(&data);

            let chunks = split(&data);
            assert_eq!(chunks.len(), len.div_ceil(CHUNK_SIZE));

            if len == 0 {
                continue;
            }
            let assembled = verify_and_assemble(&chunks, &file_hash).unwrap();
            assert_eq!(assembled, data, "length {len} must round-trip");
        }
    }

    #[test]
    fn file_hash_validation() {
        assert!(is_valid_file_hash(&"a1".repeat(32)));
        assert!(!is_valid_file_hash(&"A1".repeat(32)), "uppercase rejected");
        assert!(!is_valid_file_hash(&"a1".repeat(31)));
        assert!(!is_valid_file_hash(&"zz".repeat(32)));
        assert!(!is_valid_file_hash(""));
    }
}
