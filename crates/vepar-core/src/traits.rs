//! Codec traits.
//!
//! ```text
//! Compressor + Decompressor     whole buffers in, whole buffers out
//!          |
//!        Codec                  both directions, constructible from a level
//!
//! StreamingCompressor           chunks in, chunks out, explicit flushes
//! StreamingDecompressor
//! ```

use crate::error::{Error, Result};
use crate::stats::CompressionStats;
use crate::stream::Flush;
use crate::types::{Algorithm, CompressionLevel, CompressionRatio};

fn copy_out(data: &[u8], output: &mut [u8]) -> Result<usize> {
    let Some(dst) = output.get_mut(..data.len()) else {
        return Err(Error::buffer_too_small(data.len(), output.len()));
    };
    dst.copy_from_slice(data);
    Ok(data.len())
}

/// Whole-buffer encoder.
pub trait Compressor {
    fn algorithm(&self) -> Algorithm;

    /// Level the encoder was built with.
    fn level(&self) -> CompressionLevel;

    /// Encode `input` as one self-contained stream.
    fn compress(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Encode into `output`, returning the bytes written.
    ///
    /// Fails with [`Error::BufferTooSmall`] if the encoded form does not
    /// fit; size `output` with [`Compressor::max_compressed_size`].
    fn compress_to(&self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        copy_out(&self.compress(input)?, output)
    }

    /// Upper bound on the encoded size of `input_len` bytes.
    fn max_compressed_size(&self, input_len: usize) -> usize;

    /// Counters from the most recent call, if the encoder keeps them.
    fn stats(&self) -> Option<CompressionStats> {
        None
    }
}

/// Whole-buffer decoder.
pub trait Decompressor {
    fn algorithm(&self) -> Algorithm;

    /// Decode a complete stream.
    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Decode into `output`, returning the bytes written.
    fn decompress_to(&self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        copy_out(&self.decompress(input)?, output)
    }

    fn stats(&self) -> Option<CompressionStats> {
        None
    }
}

/// Incremental encoder.
///
/// Output that does not fit in the caller's buffer is queued and handed
/// out by later calls, so a zero-length `output` is valid.
pub trait StreamingCompressor {
    fn algorithm(&self) -> Algorithm;

    /// Start a stream. Only valid before any input.
    fn begin(&mut self) -> Result<()>;

    /// Consume `input` and apply `flush`.
    ///
    /// Returns `(bytes_read, bytes_written)`. All of `input` is always
    /// consumed.
    fn compress_chunk(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        flush: Flush,
    ) -> Result<(usize, usize)>;

    /// Close the stream and drain queued output.
    ///
    /// Call until it returns 0.
    fn finish(&mut self, output: &mut [u8]) -> Result<usize>;

    /// Forget the stream and return to the initial state.
    fn reset(&mut self);

    fn stats(&self) -> CompressionStats;
}

/// Incremental decoder.
pub trait StreamingDecompressor {
    fn algorithm(&self) -> Algorithm;

    fn begin(&mut self) -> Result<()>;

    /// Feed `input` and drain decoded bytes into `output`.
    ///
    /// Returns `(bytes_read, bytes_written, finished)`. Input is buffered
    /// until whole blocks are available; an empty `input` forces a retry
    /// of whatever is buffered.
    fn decompress_chunk(&mut self, input: &[u8], output: &mut [u8])
        -> Result<(usize, usize, bool)>;

    /// Whether the end of the stream was decoded and drained.
    fn is_finished(&self) -> bool;

    fn reset(&mut self);
}

/// Encoder and decoder of one format.
pub trait Codec: Compressor + Decompressor {
    fn new() -> Self
    where
        Self: Sized;

    fn with_level(level: CompressionLevel) -> Self
    where
        Self: Sized;

    /// Whether `data` survives a compress/decompress round trip.
    fn verify_roundtrip(&self, data: &[u8]) -> Result<bool> {
        let compressed = self.compress(data)?;
        Ok(self.decompress(&compressed)? == data)
    }

    fn measure_ratio(&self, data: &[u8]) -> Result<CompressionRatio> {
        let compressed = self.compress(data)?;
        Ok(CompressionRatio::new(data.len(), compressed.len()))
    }
}

/// Encoder that overlaps block splitting with encoding.
///
/// Output is byte-identical to [`Compressor::compress`].
pub trait ParallelCompressor: Compressor {
    /// Encode with at most `depth` blocks in flight; 0 uses the configured
    /// depth.
    fn compress_parallel(&self, input: &[u8], depth: usize) -> Result<Vec<u8>>;

    /// Set the configured depth.
    fn set_threads(&mut self, depth: usize);
}
