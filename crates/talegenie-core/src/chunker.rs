use bytes::BytesMut;

use crate::stream::AudioChunk;

/// Default chunk size released to progressive audio consumers.
pub const AUDIO_CHUNK_THRESHOLD: usize = 32 * 1024;

/// Regroups arbitrary body reads into fixed-size audio chunks.
///
/// Output is identical to appending the input one byte at a time and
/// releasing the buffer whenever it reaches the threshold.
pub struct AudioChunker {
    threshold: usize,
    buf: BytesMut,
}

impl Default for AudioChunker {
    fn default() -> Self {
        Self::new(AUDIO_CHUNK_THRESHOLD)
    }
}

impl AudioChunker {
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            threshold,
            buf: BytesMut::with_capacity(threshold),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Bytes held back waiting for the threshold.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Appends a read and returns every chunk that became full.
    pub fn push(&mut self, mut bytes: &[u8]) -> Vec<AudioChunk> {
        let mut chunks = Vec::new();
        loop {
            let missing = self.threshold - self.buf.len();
            if bytes.len() < missing {
                self.buf.extend_from_slice(bytes);
                return chunks;
            }
            self.buf.extend_from_slice(&bytes[..missing]);
            bytes = &bytes[missing..];
            chunks.push(AudioChunk::new(self.buf.split().freeze()));
            self.buf.reserve(self.threshold);
        }
    }

    /// Releases the undersized remainder at end of stream.
    pub fn finish(&mut self) -> Option<AudioChunk> {
        if self.buf.is_empty() {
            return None;
        }
        Some(AudioChunk::new(self.buf.split().freeze()))
    }
}
