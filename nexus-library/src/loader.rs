//! Audio file loading and decoding

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use nexus_audio::{AudioBuffer, BufferError};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::{MetadataOptions, StandardTagKey};
use symphonia::core::probe::Hint;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur during track loading
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No audio track found in file")]
    NoAudioTrack,
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Resample error: {0}")]
    Resample(String),
    #[error("Invalid audio data: {0}")]
    Buffer(#[from] BufferError),
}

/// Track metadata
#[derive(Debug, Clone, Default)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration_secs: f64,
    /// Rate of the file before resampling
    pub source_sample_rate: u32,
    pub channels: u16,
}

/// A loaded and decoded audio track, ready for a deck
pub struct LoadedTrack {
    /// Stereo PCM at the loader's target rate; Arc to share with the engine
    pub buffer: Arc<AudioBuffer>,
    /// Track metadata
    pub metadata: TrackMetadata,
}

/// Audio file loader using Symphonia
pub struct TrackLoader {
    target_sample_rate: u32,
}

impl Default for TrackLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackLoader {
    /// Create a new track loader with default 48kHz sample rate
    pub fn new() -> Self {
        Self::with_sample_rate(48000)
    }

    /// Create a new track loader with specific sample rate
    pub fn with_sample_rate(target_sample_rate: u32) -> Self {
        Self {
            target_sample_rate: target_sample_rate.max(1),
        }
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    /// Load and decode an audio file
    pub fn load(&self, path: &Path) -> Result<LoadedTrack, LoadError> {
        let file = std::fs::File::open(path)?;
        let extension = path.extension().and_then(|e| e.to_str());
        let title = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Unknown");
        let track = self.decode(Box::new(file), extension, title)?;
        info!(
            path = %path.display(),
            duration = track.metadata.duration_secs,
            "Decoded track"
        );
        Ok(track)
    }

    /// Decode an in-memory file (e.g. a dropped sample)
    pub fn decode_bytes(
        &self,
        bytes: Vec<u8>,
        extension: Option<&str>,
        title: &str,
    ) -> Result<LoadedTrack, LoadError> {
        self.decode(Box::new(Cursor::new(bytes)), extension, title)
    }

    fn decode(
        &self,
        source: Box<dyn MediaSource>,
        extension: Option<&str>,
        title: &str,
    ) -> Result<LoadedTrack, LoadError> {
        let mss = MediaSourceStream::new(source, Default::default());

        // Create hint from file extension
        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        // Probe the format
        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| LoadError::UnsupportedFormat(e.to_string()))?;

        let mut format = probed.format;

        // Find first audio track
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(LoadError::NoAudioTrack)?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();
        let mut source_sample_rate = codec_params.sample_rate.unwrap_or(44100);
        let mut channels = codec_params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(2);

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| LoadError::UnsupportedFormat(e.to_string()))?;

        let mut metadata = extract_metadata(&mut format, title);

        // Decode all samples
        let mut samples: Vec<f32> = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(p) => p,
                // End of stream, or a stream we can no longer read
                Err(_) => break,
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(d) => d,
                Err(symphonia::core::errors::Error::DecodeError(e)) => {
                    debug!(error = e, "Skipping undecodable packet");
                    continue;
                }
                Err(e) => return Err(LoadError::Decode(e.to_string())),
            };

            // The decoded spec is authoritative over the container's
            let spec = *decoded.spec();
            source_sample_rate = spec.rate;
            channels = spec.channels.count() as u16;

            let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(sample_buf.samples());
        }

        if samples.is_empty() {
            return Err(LoadError::Decode("stream contained no audio".to_string()));
        }

        let total_frames = samples.len() / channels.max(1) as usize;
        metadata.duration_secs = total_frames as f64 / source_sample_rate as f64;
        metadata.source_sample_rate = source_sample_rate;
        metadata.channels = channels;

        // Resample if needed
        let samples = if source_sample_rate != self.target_sample_rate {
            debug!(
                from = source_sample_rate,
                to = self.target_sample_rate,
                "Resampling"
            );
            resample(&samples, source_sample_rate, self.target_sample_rate, channels)?
        } else {
            samples
        };

        let buffer =
            AudioBuffer::from_interleaved(samples, channels as usize, self.target_sample_rate)?;
        Ok(LoadedTrack {
            buffer: Arc::new(buffer),
            metadata,
        })
    }
}

/// Resample interleaved audio between two rates
fn resample(
    samples: &[f32],
    source_rate: u32,
    target_rate: u32,
    channels: u16,
) -> Result<Vec<f32>, LoadError> {
    use rubato::{FftFixedInOut, Resampler};

    let channels_usize = channels.max(1) as usize;
    let frames = samples.len() / channels_usize;

    let mut resampler = FftFixedInOut::<f32>::new(
        source_rate as usize,
        target_rate as usize,
        1024,
        channels_usize,
    )
    .map_err(|e| LoadError::Resample(e.to_string()))?;

    // Deinterleave
    let deinterleaved: Vec<Vec<f32>> = (0..channels_usize)
        .map(|ch| {
            (0..frames)
                .map(|f| samples[f * channels_usize + ch])
                .collect()
        })
        .collect();

    // Process in chunks
    let chunk_size = resampler.input_frames_next();
    let mut output: Vec<Vec<f32>> = vec![Vec::new(); channels_usize];

    let mut pos = 0;
    while pos + chunk_size <= frames {
        let input_refs: Vec<&[f32]> = deinterleaved
            .iter()
            .map(|ch| &ch[pos..pos + chunk_size])
            .collect();

        let resampled = resampler
            .process(&input_refs, None)
            .map_err(|e| LoadError::Resample(e.to_string()))?;

        for (ch, data) in resampled.into_iter().enumerate() {
            output[ch].extend(data);
        }

        pos += chunk_size;
    }

    // Pad the tail with zeros and keep only its proportional share
    if pos < frames {
        let remaining = frames - pos;
        let padded: Vec<Vec<f32>> = deinterleaved
            .iter()
            .map(|ch| {
                let mut v = ch[pos..].to_vec();
                v.resize(chunk_size, 0.0);
                v
            })
            .collect();

        let input_refs: Vec<&[f32]> = padded.iter().map(|v| v.as_slice()).collect();
        let resampled = resampler
            .process(&input_refs, None)
            .map_err(|e| LoadError::Resample(e.to_string()))?;
        let tail_frames = (remaining * target_rate as usize) / source_rate as usize;
        for (ch, data) in resampled.into_iter().enumerate() {
            output[ch].extend(&data[..tail_frames.min(data.len())]);
        }
    }

    // Reinterleave
    let output_frames = output[0].len();
    let mut interleaved = Vec::with_capacity(output_frames * channels_usize);
    for frame_idx in 0..output_frames {
        for channel in &output {
            interleaved.push(channel[frame_idx]);
        }
    }

    Ok(interleaved)
}

/// Extract metadata from format reader
fn extract_metadata(format: &mut Box<dyn FormatReader>, title: &str) -> TrackMetadata {
    let mut metadata = TrackMetadata {
        title: title.to_string(),
        artist: "Unknown".to_string(),
        album: "Unknown".to_string(),
        ..Default::default()
    };

    if let Some(meta) = format.metadata().current() {
        for tag in meta.tags() {
            match tag.std_key {
                Some(StandardTagKey::TrackTitle) => metadata.title = tag.value.to_string(),
                Some(StandardTagKey::Artist) => metadata.artist = tag.value.to_string(),
                Some(StandardTagKey::Album) => metadata.album = tag.value.to_string(),
                _ => {}
            }
        }
    }

    metadata
}
