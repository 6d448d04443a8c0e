//! Data section: the package payload, tarred with per-file SHA-1 checksums
//! and compressed through a hand-rolled parallel gzip writer.
//!
//! `apk`'s package format relies on gzip's native support for concatenated
//! independent members — a gzip stream is simply the back-to-back
//! concatenation of any number of complete gzip members. That property lets
//! this writer split its input into fixed-size blocks, compress each block
//! as its own member on a separate thread, and write the finished members
//! back out in order: the result decompresses identically to a single-member
//! stream, just produced with however many cores are available.

use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::{Compression, GzBuilder};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::fsview::{EntryKind, FsView};
use crate::tarwriter::{Mode, TarWriter};

#[derive(Error, Debug)]
pub enum DataError {
    #[error("data section I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One gzip member's worth of uncompressed input.
const BLOCK_SIZE: usize = 1024 * 1024;

/// Hard cap on the parallel gzip worker pool, independent of how many cores
/// the host actually has; a process building many packages concurrently
/// should not let one data section claim every core.
const MAX_WORKERS: usize = 8;

/// `min(logical-cpu-count, 8)`.
pub fn worker_count() -> usize {
    num_cpus::get().min(MAX_WORKERS).max(1)
}

/// Compresses fixed-size blocks of input as independent gzip members,
/// spreading compression work across a bounded thread pool, and writes the
/// finished members to the inner writer in input order.
pub struct ParallelGzipWriter<W: Write> {
    inner: W,
    buffer: Vec<u8>,
    workers: usize,
}

impl<W: Write> ParallelGzipWriter<W> {
    pub fn new(inner: W, workers: usize) -> Self {
        Self {
            inner,
            buffer: Vec::with_capacity(BLOCK_SIZE),
            workers: workers.max(1),
        }
    }

    /// Drain full `BLOCK_SIZE` chunks from the buffer, compressing up to
    /// `self.workers` of them in parallel per round. The batch size only
    /// controls how much parallelism a round uses — member boundaries are
    /// always exactly `BLOCK_SIZE`, so the emitted bytes never depend on
    /// `self.workers`, only on the input.
    fn drain_complete_blocks(&mut self) -> io::Result<()> {
        while self.buffer.len() >= BLOCK_SIZE {
            let full_blocks = self.buffer.len() / BLOCK_SIZE;
            let take = full_blocks.min(self.workers) * BLOCK_SIZE;
            let batch: Vec<u8> = self.buffer.drain(..take).collect();
            self.compress_and_write_batch(&batch)?;
        }
        Ok(())
    }

    /// Compress `batch` (a whole number of `BLOCK_SIZE` chunks) as
    /// independent gzip members in parallel, then write them in input order.
    fn compress_and_write_batch(&mut self, batch: &[u8]) -> io::Result<()> {
        let chunks: Vec<&[u8]> = batch.chunks(BLOCK_SIZE).collect();
        let compressed: Vec<io::Result<Vec<u8>>> = std::thread::scope(|scope| {
            let handles: Vec<_> = chunks
                .iter()
                .map(|chunk| scope.spawn(|| compress_member(chunk)))
                .collect();
            handles.into_iter().map(|h| h.join().expect("gzip worker thread panicked")).collect()
        });

        for member in compressed {
            self.inner.write_all(&member?)?;
        }
        Ok(())
    }

    /// Flush any buffered input as gzip members and return the inner writer.
    /// By the time this runs, `drain_complete_blocks` has already removed
    /// every full `BLOCK_SIZE` chunk, so at most one short final member
    /// remains to compress — its size depends only on the total input
    /// length, never on `self.workers`.
    pub fn finish(mut self) -> io::Result<W> {
        self.drain_complete_blocks()?;
        debug_assert!(self.buffer.len() < BLOCK_SIZE);
        if !self.buffer.is_empty() {
            let member = compress_member(&self.buffer)?;
            self.inner.write_all(&member)?;
        }
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for ParallelGzipWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        self.drain_complete_blocks()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn compress_member(block: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzBuilder::new().mtime(0).write(Vec::new(), Compression::default());
    encoder.write_all(block)?;
    encoder.finish()
}

/// Forwards written bytes to an inner writer while feeding them into a
/// running SHA-256 digest, so the hash of exactly what hit disk is available
/// once writing is done.
pub struct TeeHasher<W: Write> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> TeeHasher<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    pub fn finish(self) -> (W, String) {
        (self.inner, hex::encode(self.hasher.finalize()))
    }
}

impl<W: Write> Write for TeeHasher<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hasher.update(buf);
        self.inner.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Tar the staged tree with per-file SHA-1 checksums, gzip it through the
/// parallel writer, and write the result to `out`, which is rewound to the
/// start before returning so it can be concatenated into the final `.apk`.
/// Returns the hex SHA-256 digest of the gzip bytes written.
pub fn build(
    view: &FsView,
    out: &mut File,
    source_date_epoch: u64,
    workers: usize,
) -> Result<String, DataError> {
    let tee = TeeHasher::new(&mut *out);
    let gzip = ParallelGzipWriter::new(tee, workers);
    let mut tar = TarWriter::new(gzip, Mode::Data, source_date_epoch);

    for entry in view.walk()? {
        let relative = entry.path.as_str();
        match entry.kind {
            EntryKind::Directory => tar.add_directory(relative, entry.mode)?,
            EntryKind::Symlink => {
                let target = view.readlink(relative)?;
                tar.add_symlink(relative, &target.to_string_lossy(), entry.mode)?;
            }
            EntryKind::Regular => {
                let file = view.open(relative)?;
                tar.add_file(relative, entry.mode, file)?;
            }
            EntryKind::Fifo | EntryKind::CharDevice | EntryKind::BlockDevice => {
                // Device nodes and FIFOs carry no content; record them as
                // zero-length entries of their kind.
                tar.add_directory(relative, entry.mode)?;
            }
        }
    }

    let gzip = tar.into_inner_without_trailer()?;
    let tee = gzip.finish()?;
    let (_, hash) = tee.finish();

    out.seek(SeekFrom::Start(0))?;
    Ok(hash)
}

/// Probe whether a path looks like a staged data section output path; used
/// by the Assembler when choosing a temp file location.
pub fn temp_path_hint(workspace_subdir: &Path) -> String {
    format!("{}-data", workspace_subdir.display())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::MultiGzDecoder;
    use std::io::Read;

    #[test]
    fn parallel_gzip_roundtrips_through_multi_member_decoder() {
        let mut buf = Vec::new();
        {
            let writer = ParallelGzipWriter::new(&mut buf, 2);
            let mut writer = writer;
            let payload = vec![b'x'; BLOCK_SIZE * 3 + 17];
            writer.write_all(&payload).unwrap();
            writer.finish().unwrap();
        }

        let mut decoder = MultiGzDecoder::new(buf.as_slice());
        let mut decoded = Vec::new();
        decoder.read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded.len(), BLOCK_SIZE * 3 + 17);
        assert!(decoded.iter().all(|&b| b == b'x'));
    }

    #[test]
    fn member_boundaries_are_independent_of_worker_count() {
        // A payload just over 1.5x BLOCK_SIZE: with the old worker-scaled
        // drain threshold this would split into `[1 MiB][0.5 MiB]` members
        // at workers=1 but a single `[1.5 MiB]` member at workers=2,
        // producing different gzip bytes for the same input.
        let payload = vec![b'y'; BLOCK_SIZE + BLOCK_SIZE / 2];

        let compress_with = |workers: usize| {
            let mut buf = Vec::new();
            let writer = ParallelGzipWriter::new(&mut buf, workers);
            let mut writer = writer;
            writer.write_all(&payload).unwrap();
            writer.finish().unwrap();
            buf
        };

        let one_worker = compress_with(1);
        let many_workers = compress_with(8);
        assert_eq!(one_worker, many_workers);
    }

    #[test]
    fn tee_hasher_produces_sha256_of_bytes_written() {
        let mut out = Vec::new();
        let hash = {
            let mut tee = TeeHasher::new(&mut out);
            tee.write_all(b"hello world").unwrap();
            tee.finish().1
        };
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn build_on_empty_view_produces_decodable_empty_tar() {
        let dir = tempfile::tempdir().unwrap();
        let view = FsView::new(dir.path());
        let mut out = tempfile::tempfile().unwrap();

        let hash = build(&view, &mut out, 0, 1).unwrap();
        assert_eq!(hash.len(), 64);

        let mut decoder = MultiGzDecoder::new(&out);
        let mut decoded = Vec::new();
        decoder.read_to_end(&mut decoded).unwrap();
        // An empty tar archive from a writer with no trailer is zero bytes.
        assert!(decoded.is_empty());
    }
}
