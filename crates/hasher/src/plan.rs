use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use chunkload_protocol::ChunkRange;

use crate::HashError;

// ---------------------------------------------------------------------------
// ChunkPlan
// ---------------------------------------------------------------------------

/// Lazily yields the byte ranges of a file in ascending index order.
///
/// Boundaries depend only on the file size and chunk size. The last range may
/// be shorter than `chunk_size`; an empty file yields nothing.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    file_size: u64,
    chunk_size: u64,
    next: u64,
}

impl ChunkPlan {
    pub fn new(file_size: u64, chunk_size: u64) -> Result<Self, HashError> {
        if chunk_size == 0 {
            return Err(HashError::InvalidChunkSize);
        }
        Ok(Self {
            file_size,
            chunk_size,
            next: 0,
        })
    }

    /// Total number of ranges in the plan.
    pub fn chunk_count(&self) -> u64 {
        self.file_size.div_ceil(self.chunk_size)
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }
}

impl Iterator for ChunkPlan {
    type Item = ChunkRange;

    fn next(&mut self) -> Option<ChunkRange> {
        let start = self.next.checked_mul(self.chunk_size)?;
        if start >= self.file_size {
            return None;
        }
        let end = start.saturating_add(self.chunk_size).min(self.file_size);
        let range = ChunkRange {
            index: self.next,
            start,
            end,
        };
        self.next += 1;
        Some(range)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.chunk_count().saturating_sub(self.next) as usize;
        (remaining, Some(remaining))
    }
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Reads individual ranges of a file.
pub struct ChunkReader {
    file: File,
    file_size: u64,
}

impl ChunkReader {
    pub fn open(path: &Path) -> Result<Self, HashError> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        Ok(Self { file, file_size })
    }

    /// Reads `range` into `buf`, replacing its contents.
    ///
    /// Fails with `UnexpectedEof` if the file shrank underneath the plan.
    pub fn read_range_into(&mut self, range: &ChunkRange, buf: &mut Vec<u8>) -> Result<(), HashError> {
        buf.clear();
        buf.resize(range.len() as usize, 0);
        self.file.seek(SeekFrom::Start(range.start))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    /// Reads `range` into a fresh buffer.
    pub fn read_range(&mut self, range: &ChunkRange) -> Result<Vec<u8>, HashError> {
        let mut buf = Vec::with_capacity(range.len() as usize);
        self.read_range_into(range, &mut buf)?;
        Ok(buf)
    }

    /// File size observed when the reader was opened.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(data).unwrap();
        path
    }

    #[test]
    fn plan_splits_with_short_tail() {
        let ranges: Vec<_> = ChunkPlan::new(10, 4).unwrap().collect();
        assert_eq!(ranges.len(), 3);
        assert_eq!((ranges[0].start, ranges[0].end), (0, 4));
        assert_eq!((ranges[1].start, ranges[1].end), (4, 8));
        assert_eq!((ranges[2].start, ranges[2].end), (8, 10));
        assert_eq!(ranges[2].index, 2);
    }

    #[test]
    fn plan_exact_multiple() {
        let plan = ChunkPlan::new(12, 4).unwrap();
        assert_eq!(plan.chunk_count(), 3);
        let last = plan.last().unwrap();
        assert_eq!(last.end, 12);
        assert_eq!(last.len(), 4);
    }

    #[test]
    fn plan_empty_file() {
        let mut plan = ChunkPlan::new(0, 4).unwrap();
        assert_eq!(plan.chunk_count(), 0);
        assert!(plan.next().is_none());
    }

    #[test]
    fn plan_rejects_zero_chunk_size() {
        assert!(matches!(
            ChunkPlan::new(10, 0),
            Err(HashError::InvalidChunkSize)
        ));
    }

    #[test]
    fn plan_is_not_restartable() {
        let mut plan = ChunkPlan::new(8, 4).unwrap();
        assert_eq!(plan.size_hint(), (2, Some(2)));
        plan.next();
        plan.next();
        assert!(plan.next().is_none());
        assert!(plan.next().is_none());
        assert_eq!(plan.size_hint(), (0, Some(0)));
    }

    #[test]
    fn reader_reads_ranges_out_of_order() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"AABBCCDDEE");

        let mut reader = ChunkReader::open(&path).unwrap();
        assert_eq!(reader.file_size(), 10);

        let ranges: Vec<_> = ChunkPlan::new(reader.file_size(), 4).unwrap().collect();
        assert_eq!(reader.read_range(&ranges[2]).unwrap(), b"EE");
        assert_eq!(reader.read_range(&ranges[0]).unwrap(), b"AABB");
        assert_eq!(reader.read_range(&ranges[1]).unwrap(), b"CCDD");
    }

    #[test]
    fn reader_fails_when_file_shrinks() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"0123456789");
        let mut reader = ChunkReader::open(&path).unwrap();

        std::fs::write(&path, b"0123").unwrap();

        let range = ChunkRange {
            index: 1,
            start: 4,
            end: 8,
        };
        let err = reader.read_range(&range).unwrap_err();
        match err {
            HashError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected error: {other}"),
        }
    }
}
