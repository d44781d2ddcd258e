//! Reference clip loading: decode, downmix to mono, resample to the
//! pipeline rate. Done once at listener start.

use std::path::{Path, PathBuf};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

/// Container extensions tried per label, in priority order.
const SUPPORTED_EXTS: [&str; 3] = ["wav", "ogg", "flac"];

#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("decode error in {path}: {source}")]
    Decode {
        path: PathBuf,
        source: SymphoniaError,
    },

    #[error("{path} has no decodable audio track")]
    NoTrack { path: PathBuf },

    #[error("{path} is empty after decoding")]
    Empty { path: PathBuf },
}

/// A labeled mono waveform stored at the pipeline sample rate.
#[derive(Debug, Clone)]
pub struct ReferenceClip {
    pub label: String,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// All reference clips that loaded successfully. Labels whose file was
/// missing or undecodable are simply absent; an empty library means the
/// listener must refuse to start.
#[derive(Debug, Default)]
pub struct ReferenceLibrary {
    clips: Vec<ReferenceClip>,
}

impl ReferenceLibrary {
    /// Loads one clip per `(label, filename stem)` pair from `dir`,
    /// trying extensions in priority order. Failures degrade to a warning
    /// and an absent label.
    pub fn load(dir: &Path, labels: &[(String, String)], target_rate: u32) -> Self {
        let mut clips = Vec::new();
        for (label, stem) in labels {
            let Some(path) = SUPPORTED_EXTS
                .iter()
                .map(|ext| dir.join(format!("{stem}.{ext}")))
                .find(|candidate| candidate.exists())
            else {
                tracing::warn!(%label, %stem, dir = %dir.display(), "reference clip not found");
                continue;
            };

            match decode_mono(&path, target_rate) {
                Ok(samples) => {
                    tracing::info!(
                        %label,
                        file = %path.display(),
                        duration_secs = samples.len() as f32 / target_rate as f32,
                        "loaded reference clip"
                    );
                    clips.push(ReferenceClip {
                        label: label.clone(),
                        samples,
                        sample_rate: target_rate,
                    });
                }
                Err(err) => {
                    tracing::error!(%label, %err, "failed to load reference clip");
                }
            }
        }
        Self { clips }
    }

    /// Builds a library from already-decoded clips. Used by hosts and
    /// tests that synthesize references instead of reading files.
    pub fn from_clips(clips: Vec<ReferenceClip>) -> Self {
        Self { clips }
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f32])> {
        self.clips
            .iter()
            .map(|clip| (clip.label.as_str(), clip.samples.as_slice()))
    }

    pub fn get(&self, label: &str) -> Option<&ReferenceClip> {
        self.clips.iter().find(|clip| clip.label == label)
    }
}

/// Decodes an audio file to mono f32 at `target_rate`. Multi-channel
/// sources are downmixed by per-sample channel averaging.
fn decode_mono(path: &Path, target_rate: u32) -> Result<Vec<f32>, ReferenceError> {
    let file = std::fs::File::open(path).map_err(|source| ReferenceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let stream = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|source| ReferenceError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| ReferenceError::NoTrack {
            path: path.to_path_buf(),
        })?;
    let track_id = track.id;
    let source_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| ReferenceError::NoTrack {
            path: path.to_path_buf(),
        })?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|source| ReferenceError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

    let mut mono: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(source) => {
                return Err(ReferenceError::Decode {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // Skip over corrupt packets, keep whatever decodes.
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(source) => {
                return Err(ReferenceError::Decode {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        let buf = sample_buf.get_or_insert_with(|| {
            SampleBuffer::<f32>::new(decoded.capacity() as u64, spec)
        });
        buf.copy_interleaved_ref(decoded);
        mono.extend(
            buf.samples()
                .chunks_exact(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32),
        );
    }

    if mono.is_empty() {
        return Err(ReferenceError::Empty {
            path: path.to_path_buf(),
        });
    }

    if source_rate != target_rate {
        tracing::info!(
            file = %path.display(),
            from = source_rate,
            to = target_rate,
            "resampling reference clip"
        );
        mono = resample_linear(&mono, source_rate, target_rate);
    }

    Ok(mono)
}

/// Linear-interpolation resample over evenly spaced output indices. Not
/// band-limited; fidelity is acceptable for waveform matching.
fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    let n_out = ((samples.len() as f64 / from_rate as f64) * to_rate as f64) as usize;
    if n_out == 0 || samples.len() < 2 {
        return samples.iter().copied().take(n_out).collect();
    }

    let step = (samples.len() - 1) as f64 / (n_out - 1).max(1) as f64;
    (0..n_out)
        .map(|i| {
            let pos = i as f64 * step;
            let lo = pos.floor() as usize;
            let hi = (lo + 1).min(samples.len() - 1);
            let frac = (pos - lo as f64) as f32;
            samples[lo] + (samples[hi] - samples[lo]) * frac
        })
        .collect()
}

/// Convenience used by config defaults: VICTORY/DEFEAT stems.
pub fn default_labels() -> Vec<(String, String)> {
    vec![
        ("VICTORY".to_string(), "victory".to_string()),
        ("DEFEAT".to_string(), "defeat".to_string()),
    ]
}
