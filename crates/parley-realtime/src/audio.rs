use crate::RealtimeError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Sample rate of PCM16 audio on the realtime wire.
pub const SAMPLE_RATE: u32 = 24_000;
pub const CHANNELS: u16 = 1;
pub const BITS_PER_SAMPLE: u16 = 16;

pub fn encode_audio(pcm: &[u8]) -> String {
    STANDARD.encode(pcm)
}

pub fn decode_audio(encoded: &str) -> Result<Vec<u8>, RealtimeError> {
    STANDARD
        .decode(encoded)
        .map_err(|error| RealtimeError::Protocol(format!("invalid base64 audio: {error}")))
}

/// Mono little-endian PCM16 audio.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AudioClip {
    pub pcm: Vec<u8>,
    pub sample_rate: u32,
}

impl AudioClip {
    pub fn new(pcm: Vec<u8>) -> Self {
        Self {
            pcm,
            sample_rate: SAMPLE_RATE,
        }
    }

    pub fn from_samples(samples: &[i16]) -> Self {
        let mut pcm = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            pcm.extend_from_slice(&sample.to_le_bytes());
        }
        Self::new(pcm)
    }

    /// Trailing odd bytes are dropped.
    pub fn samples(&self) -> Vec<i16> {
        self.pcm
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pcm.is_empty()
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        let samples = (self.pcm.len() / 2) as u64;
        samples * 1_000 / u64::from(self.sample_rate)
    }
}

/// Collects decoded audio deltas in arrival order.
#[derive(Debug, Default)]
pub struct AudioAccumulator {
    chunks: Vec<Vec<u8>>,
}

impl AudioAccumulator {
    pub fn push_encoded(&mut self, delta: &str) -> Result<(), RealtimeError> {
        self.chunks.push(decode_audio(delta)?);
        Ok(())
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn finish(self) -> AudioClip {
        AudioClip::new(self.chunks.concat())
    }
}
