use std::io::{self, Read};

use protocol::{BlockInfo, BLOCK_SIZE};

use crate::error::BlocksError;

/// Splits `reader` into fixed-size, SHA-256-addressed blocks.
///
/// Reads sequentially; every non-empty chunk of up to `BLOCK_SIZE` bytes
/// (the last chunk may be shorter) becomes one [`BlockInfo`]. A zero-length
/// stream yields an empty block list and size `0`. Returns the block list
/// together with the cumulative number of bytes read.
pub fn split_into_blocks(mut reader: impl Read) -> Result<(Vec<BlockInfo>, u64), BlocksError> {
    tracing::debug!(block_size = BLOCK_SIZE, "splitting stream into blocks");
    let mut blocks = Vec::new();
    let mut buffer = vec![0u8; BLOCK_SIZE as usize];
    let mut offset = 0u64;

    loop {
        let bytes_read = read_up_to(&mut reader, &mut buffer)?;
        if bytes_read == 0 {
            break;
        }

        let hash = checksums::Sha256::digest(&buffer[..bytes_read]);
        blocks.push(BlockInfo {
            offset,
            size: bytes_read as u32,
            hash,
        });
        offset += bytes_read as u64;

        if bytes_read < buffer.len() {
            // Short read: this was the final, possibly partial block.
            break;
        }
    }

    tracing::debug!(blocks = blocks.len(), total_size = offset, "split complete");
    Ok((blocks, offset))
}

/// Reads up to `buffer.len()` bytes, looping until the buffer fills or the
/// stream is exhausted. Unlike `read_exact`, a short final read is not an
/// error -- it signals end of stream.
fn read_up_to(reader: &mut impl Read, buffer: &mut [u8]) -> Result<usize, BlocksError> {
    let mut total = 0;
    while total < buffer.len() {
        match reader.read(&mut buffer[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(BlocksError::Io {
                    action: "read block",
                    path: "<stream>".into(),
                    source,
                })
            }
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate_block_layout;
    use std::io::Cursor;

    #[test]
    fn empty_stream_yields_no_blocks() {
        let (blocks, size) = split_into_blocks(Cursor::new(Vec::<u8>::new())).unwrap();
        assert!(blocks.is_empty());
        assert_eq!(size, 0);
    }

    #[test]
    fn single_block_under_limit() {
        let data = vec![0x41u8; 1024];
        let (blocks, size) = split_into_blocks(Cursor::new(data.clone())).unwrap();
        assert_eq!(size, 1024);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].offset, 0);
        assert_eq!(blocks[0].size, 1024);
        assert_eq!(blocks[0].hash, checksums::Sha256::digest(&data));
        validate_block_layout(&blocks, size);
    }

    #[test]
    fn multi_block_file_matches_expected_layout() {
        let data = vec![0u8; 300_000];
        let (blocks, size) = split_into_blocks(Cursor::new(data)).unwrap();
        assert_eq!(size, 300_000);
        let sizes: Vec<u32> = blocks.iter().map(|b| b.size).collect();
        assert_eq!(sizes, vec![131_072, 131_072, 37_856]);
        let offsets: Vec<u64> = blocks.iter().map(|b| b.offset).collect();
        assert_eq!(offsets, vec![0, 131_072, 262_144]);
        validate_block_layout(&blocks, size);
    }

    #[test]
    fn exact_multiple_of_block_size_has_no_trailing_short_block() {
        let data = vec![7u8; BLOCK_SIZE as usize * 2];
        let (blocks, size) = split_into_blocks(Cursor::new(data)).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].size, BLOCK_SIZE);
        validate_block_layout(&blocks, size);
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::validate_block_layout;
    use proptest::prelude::*;
    use std::io::Cursor;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn arbitrary_data_satisfies_block_layout_invariant(
            data in proptest::collection::vec(any::<u8>(), 0..400_000),
        ) {
            let (blocks, size) = split_into_blocks(Cursor::new(data.clone())).unwrap();
            prop_assert_eq!(size, data.len() as u64);
            validate_block_layout(&blocks, size);
        }

        #[test]
        fn blocks_reconstruct_original_bytes_in_order(
            data in proptest::collection::vec(any::<u8>(), 0..400_000),
        ) {
            let (blocks, _size) = split_into_blocks(Cursor::new(data.clone())).unwrap();
            let mut reconstructed = Vec::with_capacity(data.len());
            for block in &blocks {
                let start = block.offset as usize;
                let end = start + block.size as usize;
                reconstructed.extend_from_slice(&data[start..end]);
            }
            prop_assert_eq!(reconstructed, data);
        }
    }
}
