//! PCM frame and format types shared across the capture pipeline

use std::io::Cursor;

use crate::Result;

/// Duration of one capture frame in milliseconds
pub const FRAME_MS: u32 = 30;

/// Capture sample rates probed in preference order
pub const PREFERRED_RATES: &[u32] = &[48_000, 32_000, 16_000, 8_000];

/// Negotiated PCM format, fixed at stream construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Samples per second
    pub sample_rate: u32,
    /// Bytes per sample
    pub sample_width: u16,
    /// Channel count
    pub channels: u16,
}

impl AudioFormat {
    /// Mono 16-bit format at the given rate
    #[must_use]
    pub const fn mono16(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            sample_width: 2,
            channels: 1,
        }
    }

    /// Samples in one capture frame
    #[must_use]
    pub const fn frame_len(&self) -> usize {
        (self.sample_rate * FRAME_MS / 1000) as usize
    }
}

/// One fixed-duration block of mono i16 PCM samples
///
/// Frames are moved through the pipeline, never shared; whichever component
/// holds a frame consumes it exactly once.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Vec<i16>,
    pub format: AudioFormat,
}

impl AudioFrame {
    #[must_use]
    pub fn new(samples: Vec<i16>, format: AudioFormat) -> Self {
        Self { samples, format }
    }
}

/// Concatenate frames into a little-endian PCM byte buffer
#[must_use]
pub fn frames_to_bytes(frames: &[AudioFrame]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(frames.iter().map(|f| f.samples.len() * 2).sum());
    for frame in frames {
        for sample in &frame.samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
    }
    bytes
}

/// Wrap raw little-endian i16 PCM bytes in a WAV container
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn pcm_to_wav(pcm: &[u8], format: AudioFormat) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: format.sample_width * 8,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for pair in pcm.chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

/// Decode raw PCM response bytes into i16 samples
///
/// 16-bit little-endian is passed through; 8-bit unsigned is widened. Other
/// widths are not produced by the hub.
#[must_use]
pub fn pcm_to_samples(pcm: &[u8], sample_width: u16) -> Option<Vec<i16>> {
    match sample_width {
        2 => Some(
            pcm.chunks_exact(2)
                .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
                .collect(),
        ),
        1 => Some(
            pcm.iter()
                .map(|&b| (i16::from(b) - 128) << 8)
                .collect(),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_len_matches_interval() {
        assert_eq!(AudioFormat::mono16(16_000).frame_len(), 480);
        assert_eq!(AudioFormat::mono16(48_000).frame_len(), 1440);
        assert_eq!(AudioFormat::mono16(8_000).frame_len(), 240);
    }

    #[test]
    fn frames_concatenate_in_order() {
        let format = AudioFormat::mono16(16_000);
        let a = AudioFrame::new(vec![1, 2], format);
        let b = AudioFrame::new(vec![3], format);

        let bytes = frames_to_bytes(&[a, b]);
        assert_eq!(bytes, vec![1, 0, 2, 0, 3, 0]);
    }

    #[test]
    fn wav_roundtrip_preserves_samples() {
        let format = AudioFormat::mono16(16_000);
        let frame = AudioFrame::new(vec![0, 100, -100, i16::MAX, i16::MIN], format);
        let pcm = frames_to_bytes(std::slice::from_ref(&frame));

        let wav = pcm_to_wav(&pcm, format).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");

        let mut reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert_eq!(reader.spec().channels, 1);

        let read: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(read, frame.samples);
    }

    #[test]
    fn eight_bit_pcm_is_widened() {
        let samples = pcm_to_samples(&[128, 255, 0], 1).unwrap();
        assert_eq!(samples[0], 0);
        assert!(samples[1] > 0);
        assert!(samples[2] < 0);
    }

    #[test]
    fn unknown_width_is_rejected() {
        assert!(pcm_to_samples(&[0; 12], 3).is_none());
    }
}
