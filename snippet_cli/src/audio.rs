use std::path::Path;

use anyhow::{bail, Context};
use snippet::TimeWindow;
use symphonia::core::{
    audio::{AudioBuffer, Signal},
    codecs::DecoderOptions,
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::{MediaSourceStream, MediaSourceStreamOptions},
    meta::MetadataOptions,
    probe::Hint,
};
use tracing::{debug, info, instrument, trace, warn};

/// Decoded audio, one plane per channel, at the file's own sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

impl AudioClip {
    /// Number of frames.
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn slice(&self, window: &TimeWindow) -> AudioClip {
        let channels = self
            .channels
            .iter()
            .map(|channel| {
                let end = window.end.min(channel.len());
                channel[window.start.min(end)..end].to_vec()
            })
            .collect();

        AudioClip {
            sample_rate: self.sample_rate,
            channels,
        }
    }

    /// Writes interleaved 32-bit float PCM.
    #[instrument(skip(self), level = "trace")]
    pub fn write_wav(&self, path: &Path) -> anyhow::Result<()> {
        if self.channels.is_empty() {
            bail!("cannot write audio without channels");
        }
        let spec = hound::WavSpec {
            channels: u16::try_from(self.channels.len()).context("too many channels")?,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };

        let mut writer = hound::WavWriter::create(path, spec)
            .with_context(|| format!("failed to create {}", path.display()))?;
        for frame in 0..self.len() {
            for channel in &self.channels {
                writer.write_sample(channel[frame])?;
            }
        }
        writer.finalize()?;
        Ok(())
    }
}

#[instrument(level = "debug")]
pub fn load(path: &Path) -> anyhow::Result<AudioClip> {
    debug!("opening file");
    let registry = symphonia::default::get_codecs();
    let formats = symphonia::default::get_probe();
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let stream = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|extension| extension.to_str()) {
        hint.with_extension(extension);
    }
    let mut format = formats.format(
        &hint,
        stream,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let tracks = format.format.tracks();
    if tracks.len() != 1 {
        warn!(n_tracks = tracks.len(), "file has multiple tracks, using only default");
    }
    let track = format
        .format
        .default_track()
        .context("file has no audio track")?;
    let sample_rate = track
        .codec_params
        .sample_rate
        .context("track does not declare a sample rate")?;
    let mut decoder = registry.make(&track.codec_params, &DecoderOptions::default())?;
    info!(params=?track.codec_params, "read codec params");
    let track_id = track.id;

    let mut channels: Vec<Vec<f32>> = Vec::new();

    loop {
        let packet = match format.format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(reason)) => {
                warn!(reason, "skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let mut converted: AudioBuffer<f32> =
            AudioBuffer::new(decoded.frames() as u64, decoded.spec().to_owned());
        decoded.convert(&mut converted);
        let planes = converted.planes();
        let planes_slice = planes.planes();
        if channels.len() != planes_slice.len() {
            trace!("resizing channels due to size mismatch");
            channels.resize_with(planes_slice.len(), Vec::new);
        }
        channels
            .iter_mut()
            .zip(planes_slice)
            .for_each(|(d, v)| d.extend(*v));
    }

    let clip = AudioClip {
        sample_rate,
        channels,
    };
    debug!(
        n_frames = clip.len(),
        n_channels = clip.channels.len(),
        sample_rate,
        "decoded audio"
    );
    Ok(clip)
}
