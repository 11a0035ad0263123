//! Streaming Zstd compression.

use std::time::Instant;

use vepar_core::{
    Algorithm, CompressionStats, Error, Flush, Result, StreamState, StreamingCompressor,
};

use super::{EncoderConfig, FrameEncoder};
use crate::frame::{ContentHasher, FrameHeader};

/// Incremental Zstd encoder producing one frame per stream.
///
/// Input is buffered until a full block is available or a flush asks for
/// it. The frame header carries no content size, since it is written
/// before the size is known.
#[derive(Debug)]
pub struct ZstdStreamEncoder {
    frame: FrameEncoder,
    state: StreamState,
    buffered: Vec<u8>,
    queued: Vec<u8>,
    drained: usize,
    hasher: ContentHasher,
    started: Option<Instant>,
    total_in: usize,
    total_out: usize,
    finishing: bool,
}

impl Default for ZstdStreamEncoder {
    fn default() -> Self {
        Self::new(EncoderConfig::default())
    }
}

impl ZstdStreamEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self {
            frame: FrameEncoder::new(config),
            state: StreamState::Initial,
            buffered: Vec::new(),
            queued: Vec::new(),
            drained: 0,
            hasher: ContentHasher::new(),
            started: None,
            total_in: 0,
            total_out: 0,
            finishing: false,
        }
    }

    pub fn config(&self) -> &EncoderConfig {
        self.frame.config()
    }

    /// Lifecycle state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Compressed bytes waiting for output space.
    pub fn pending(&self) -> usize {
        self.queued.len() - self.drained
    }

    fn block_size(&self) -> usize {
        self.frame.config().block_size
    }

    fn ensure_started(&mut self) {
        if self.started.is_some() {
            return;
        }
        self.started = Some(Instant::now());
        let config = self.frame.config();
        let header = FrameHeader::unknown_size(config.window_size as u64, config.checksum);
        self.frame.begin_frame(header, &mut self.queued);
    }

    fn emit_block(&mut self, len: usize, last: bool) -> Result<()> {
        let block: Vec<u8> = self.buffered.drain(..len).collect();
        self.frame.encode_block(&block, last, &mut self.queued)?;
        Ok(())
    }

    fn drain_into(&mut self, output: &mut [u8]) -> usize {
        let n = self.pending().min(output.len());
        output[..n].copy_from_slice(&self.queued[self.drained..self.drained + n]);
        self.drained += n;
        self.total_out += n;
        if self.drained == self.queued.len() {
            self.queued.clear();
            self.drained = 0;
        }
        n
    }

    fn fail(&mut self, e: Error) -> Error {
        self.state = StreamState::Error;
        e
    }

    fn check_writable(&self) -> Result<()> {
        if self.finishing {
            return Err(Error::InvalidState {
                expected: "active stream",
                actual: "finishing",
            });
        }
        match self.state {
            StreamState::Error => Err(Error::InvalidState {
                expected: "active stream",
                actual: "stream failed; reset first",
            }),
            s if !s.can_write() => Err(Error::InvalidState {
                expected: "active stream",
                actual: s.name(),
            }),
            _ => Ok(()),
        }
    }

    fn close_frame(&mut self) -> Result<()> {
        let len = self.buffered.len();
        if len == 0 {
            self.frame.write_empty_block(&mut self.queued);
        } else {
            let block_size = self.block_size();
            while self.buffered.len() > block_size {
                self.emit_block(block_size, false)?;
            }
            let rest = self.buffered.len();
            self.emit_block(rest, true)?;
        }
        if self.frame.config().checksum {
            let sum = self.hasher.checksum();
            self.frame.write_checksum(sum, &mut self.queued);
        }
        self.finishing = true;
        Ok(())
    }
}

impl StreamingCompressor for ZstdStreamEncoder {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Zstd
    }

    fn begin(&mut self) -> Result<()> {
        self.reset();
        self.state = StreamState::Active;
        Ok(())
    }

    fn compress_chunk(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        flush: Flush,
    ) -> Result<(usize, usize)> {
        self.check_writable()?;
        self.state = StreamState::Active;
        self.ensure_started();

        self.buffered.extend_from_slice(input);
        self.hasher.update(input);
        self.total_in += input.len();

        let block_size = self.block_size();
        while self.buffered.len() > block_size {
            if let Err(e) = self.emit_block(block_size, false) {
                return Err(self.fail(e));
            }
        }

        match flush {
            Flush::Finish => {
                if let Err(e) = self.close_frame() {
                    return Err(self.fail(e));
                }
            }
            f if f.emits_block() && !self.buffered.is_empty() => {
                let len = self.buffered.len();
                if let Err(e) = self.emit_block(len, false) {
                    return Err(self.fail(e));
                }
                if f == Flush::Full {
                    self.frame.forget_history();
                }
            }
            Flush::Full => self.frame.forget_history(),
            _ => {}
        }

        let written = self.drain_into(output);
        Ok((input.len(), written))
    }

    fn finish(&mut self, output: &mut [u8]) -> Result<usize> {
        if self.state == StreamState::Finished {
            return Ok(0);
        }
        if !self.finishing {
            self.check_writable()?;
            self.ensure_started();
            if let Err(e) = self.close_frame() {
                return Err(self.fail(e));
            }
        }
        let written = self.drain_into(output);
        if self.pending() == 0 {
            let started = self.started.unwrap_or_else(Instant::now);
            self.frame.end_frame(self.total_in, self.total_out, started);
            self.state = StreamState::Finished;
        }
        Ok(written)
    }

    fn reset(&mut self) {
        self.state = StreamState::Initial;
        self.buffered.clear();
        self.queued.clear();
        self.drained = 0;
        self.hasher.reset();
        self.started = None;
        self.total_in = 0;
        self.total_out = 0;
        self.finishing = false;
    }

    fn stats(&self) -> CompressionStats {
        let mut stats = self.frame.stats().clone();
        stats.original_size = self.total_in;
        stats.compressed_size = self.total_out;
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::ZstdLevel;
    use crate::decompress::decompress;
    use vepar_core::BlockKind;

    fn corpus(len: usize) -> Vec<u8> {
        crate::compress::finder::tests::corpus(len, 5)
    }

    /// Feed `data` in `chunk`-byte pieces through `out_cap`-byte buffers.
    fn stream(enc: &mut ZstdStreamEncoder, data: &[u8], chunk: usize, out_cap: usize) -> Vec<u8> {
        let mut frame = Vec::new();
        let mut buf = vec![0u8; out_cap];
        enc.begin().unwrap();
        for piece in data.chunks(chunk) {
            let (read, written) = enc.compress_chunk(piece, &mut buf, Flush::None).unwrap();
            assert_eq!(read, piece.len());
            frame.extend_from_slice(&buf[..written]);
        }
        loop {
            let n = enc.finish(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            frame.extend_from_slice(&buf[..n]);
        }
        frame
    }

    #[test]
    fn test_stream_roundtrip_small_buffers() {
        let data = corpus(400_000);
        let mut enc = ZstdStreamEncoder::default();
        let frame = stream(&mut enc, &data, 7_000, 1000);
        assert_eq!(decompress(&frame).unwrap(), data);
        assert_eq!(enc.state(), StreamState::Finished);
        let stats = enc.stats();
        assert_eq!(stats.original_size, data.len());
        assert_eq!(stats.compressed_size, frame.len());
        assert!(stats.checksum.is_some());
    }

    #[test]
    fn test_empty_stream() {
        let mut enc = ZstdStreamEncoder::new(EncoderConfig::default().with_checksum(false));
        let frame = stream(&mut enc, b"", 1, 64);
        assert_eq!(decompress(&frame).unwrap(), b"");
        assert_eq!(&frame[frame.len() - 3..], &[1, 0, 0]);
    }

    #[test]
    fn test_sync_flush_emits_pending_input() {
        let mut enc = ZstdStreamEncoder::default();
        let mut buf = vec![0u8; 4096];
        enc.begin().unwrap();
        let (_, quiet) = enc.compress_chunk(b"held back", &mut buf, Flush::None).unwrap();
        let (_, flushed) = enc.compress_chunk(b"", &mut buf, Flush::Sync).unwrap();
        assert!(flushed > quiet);
        assert_eq!(enc.stats().blocks_processed, 1);
    }

    #[test]
    fn test_full_flush_stays_decodable() {
        let text = b"the same sentence over and over again. ".repeat(100);
        let mut enc = ZstdStreamEncoder::new(EncoderConfig::new(ZstdLevel::Fast));
        let mut buf = vec![0u8; 1 << 16];
        let mut frame = Vec::new();
        enc.begin().unwrap();
        for _ in 0..3 {
            let (_, n) = enc.compress_chunk(&text, &mut buf, Flush::Full).unwrap();
            frame.extend_from_slice(&buf[..n]);
        }
        let n = enc.finish(&mut buf).unwrap();
        frame.extend_from_slice(&buf[..n]);
        assert_eq!(enc.finish(&mut buf).unwrap(), 0);
        assert_eq!(decompress(&frame).unwrap(), text.repeat(3));
        assert_eq!(enc.stats().blocks_of(BlockKind::Raw), 1);
    }

    #[test]
    fn test_finish_in_chunk_then_drain() {
        let data = corpus(50_000);
        let mut enc = ZstdStreamEncoder::default();
        let mut frame = Vec::new();
        let mut buf = vec![0u8; 100];
        enc.begin().unwrap();
        let (_, n) = enc.compress_chunk(&data, &mut buf, Flush::Finish).unwrap();
        frame.extend_from_slice(&buf[..n]);
        loop {
            let n = enc.finish(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            frame.extend_from_slice(&buf[..n]);
        }
        assert_eq!(decompress(&frame).unwrap(), data);
    }

    #[test]
    fn test_write_after_finish_fails() {
        let mut enc = ZstdStreamEncoder::default();
        let mut buf = vec![0u8; 1024];
        enc.begin().unwrap();
        enc.compress_chunk(b"abc", &mut buf, Flush::None).unwrap();
        enc.finish(&mut buf).unwrap();
        assert!(matches!(
            enc.compress_chunk(b"more", &mut buf, Flush::None),
            Err(Error::InvalidState { .. })
        ));
        enc.reset();
        assert!(enc.compress_chunk(b"more", &mut buf, Flush::None).is_ok());
    }
}
