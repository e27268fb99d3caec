//! File chunking with explicit end-of-stream detection.
//!
//! [`ChunkReader`] reads one chunk ahead of what it hands out, so it knows
//! whether a full-sized chunk is also the last one.  A source whose length is
//! an exact multiple of the chunk size therefore still ends with a FIN chunk,
//! and an empty source yields a single empty FIN chunk.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::packet::MAX_PAYLOAD;

/// One unit of file payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub data: Vec<u8>,
    /// No bytes follow this chunk.
    pub fin: bool,
}

/// Splits an async byte stream into FIN-terminated chunks.
#[derive(Debug)]
pub struct ChunkReader<R> {
    inner: R,
    chunk_size: usize,
    lookahead: Option<Vec<u8>>,
    finished: bool,
}

impl<R: AsyncRead + Unpin> ChunkReader<R> {
    /// Create a reader producing chunks of [`MAX_PAYLOAD`] bytes.
    pub fn new(inner: R) -> Self {
        Self::with_chunk_size(inner, MAX_PAYLOAD)
    }

    /// Create a reader with a custom chunk size.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_size` is zero or larger than [`MAX_PAYLOAD`].
    pub fn with_chunk_size(inner: R, chunk_size: usize) -> Self {
        assert!(
            (1..=MAX_PAYLOAD).contains(&chunk_size),
            "chunk_size must be within 1..={MAX_PAYLOAD}"
        );
        Self {
            inner,
            chunk_size,
            lookahead: None,
            finished: false,
        }
    }

    /// Next chunk, or `None` once the FIN chunk has been handed out.
    pub async fn next_chunk(&mut self) -> std::io::Result<Option<Chunk>> {
        if self.finished {
            return Ok(None);
        }

        let data = match self.lookahead.take() {
            Some(data) => data,
            None => self.fill().await?,
        };

        // A short read is the end of the stream.
        if data.len() < self.chunk_size {
            self.finished = true;
            return Ok(Some(Chunk { data, fin: true }));
        }

        let next = self.fill().await?;
        if next.is_empty() {
            self.finished = true;
            return Ok(Some(Chunk { data, fin: true }));
        }
        self.lookahead = Some(next);
        Ok(Some(Chunk { data, fin: false }))
    }

    /// Read until a chunk is full or the stream ends.
    async fn fill(&mut self) -> std::io::Result<Vec<u8>> {
        let mut buf = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.inner.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(buf)
    }
}

/// Number of data chunks a source of `len` bytes produces.
pub fn chunk_count(len: u64, chunk_size: usize) -> u64 {
    len.div_ceil(chunk_size as u64).max(1)
}
