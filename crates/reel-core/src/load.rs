//! Audio file loading: decode, resample, overview
//!
//! [`load_sequence`] turns any file symphonia can decode into a
//! [`Sequence`] at the session rate, resampling with rubato when the rates
//! differ and computing the waveform overview as part of segment
//! construction. Long stages report progress through a cancellation-aware
//! callback; [`LoadService`] wraps the whole thing in a background thread
//! that reports over a channel instead.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{unbounded, Receiver};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{EngineError, EngineResult};
use crate::piece_table::PieceTable;
use crate::segment::AudioSegment;
use crate::sequence::Sequence;
use crate::types::Sample;

/// Stages reported by the loading progress callback, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    /// Decoding packets from the file
    Read,
    /// Sample-rate conversion to the session rate
    Resample,
    /// Building the waveform overview
    ComputeOverview,
    /// Terminal tick; also sent when decoding fails so UIs close cleanly
    Complete,
}

/// Progress ticks per stage that callers can expect
pub const STEPS_PER_STAGE: usize = 5;

/// Widest rate conversion the loader accepts
const MAX_RESAMPLE_RATIO: f64 = 16.0;

/// Decode `path` into a sequence at `target_rate`
///
/// The callback receives `(stage, fraction_in_stage)` and cancels the load
/// by returning false, which frees all partial buffers and leaves nothing
/// behind. Decoder failures are reported after a synthetic `Complete` tick.
pub fn load_sequence(
    path: &Path,
    target_rate: u32,
    progress: &mut dyn FnMut(LoadStage, f32) -> bool,
) -> EngineResult<Arc<Sequence>> {
    let (samples, file_rate, channels) = match decode_file(path, progress) {
        Ok(decoded) => decoded,
        Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
        Err(e) => {
            let _ = progress(LoadStage::Complete, 1.0);
            return Err(e);
        }
    };

    let samples = if file_rate != target_rate {
        resample(&samples, file_rate, target_rate, channels, progress)?
    } else {
        samples
    };

    if !progress(LoadStage::ComputeOverview, 0.0) {
        return Err(EngineError::Cancelled);
    }
    let segment = AudioSegment::new(samples, channels)?;
    if !progress(LoadStage::ComputeOverview, 1.0) {
        return Err(EngineError::Cancelled);
    }

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("untitled")
        .to_string();
    let sequence = Arc::new(Sequence::from_table(
        name,
        PieceTable::from_segment(segment),
        target_rate,
    ));

    log::info!(
        "Loaded {:?}: {} frames, {} channel(s) at {}Hz",
        path,
        sequence.nframes(),
        sequence.channels(),
        target_rate
    );
    let _ = progress(LoadStage::Complete, 1.0);
    Ok(sequence)
}

/// Decode a file to interleaved f32 using symphonia
fn decode_file(
    path: &Path,
    progress: &mut dyn FnMut(LoadStage, f32) -> bool,
) -> EngineResult<(Vec<Sample>, u32, usize)> {
    let fail = |reason: String| EngineError::DecoderFailure {
        path: path.to_path_buf(),
        reason,
    };

    let file = std::fs::File::open(path).map_err(|e| fail(e.to_string()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| fail(e.to_string()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| fail("no audio track found".into()))?;
    let track_id = track.id;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| fail("unknown sample rate".into()))?;
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(2);
    if channels == 0 {
        return Err(fail("stream reports zero channels".into()));
    }
    let total_frames = track.codec_params.n_frames;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| fail(e.to_string()))?;

    let mut samples: Vec<Sample> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut next_tick = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                log::warn!("Error reading packet from {:?}: {}", path, e);
                break;
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(e) => {
                log::warn!("Error decoding packet from {:?}: {}", path, e);
                continue;
            }
        };

        if sample_buf.is_none() {
            let spec = *decoded.spec();
            let duration = decoded.capacity() as u64;
            sample_buf = Some(SampleBuffer::new(duration, spec));
        }
        if let Some(ref mut buf) = sample_buf {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }

        // Tick roughly STEPS_PER_STAGE times over the whole read
        if let Some(total) = total_frames {
            let frac = (samples.len() / channels) as f32 / total.max(1) as f32;
            let step = (frac * STEPS_PER_STAGE as f32) as usize;
            if step > next_tick {
                next_tick = step;
                if !progress(LoadStage::Read, frac.min(1.0)) {
                    return Err(EngineError::Cancelled);
                }
            }
        }
    }

    if samples.is_empty() {
        return Err(fail("no audio data decoded".into()));
    }
    if !progress(LoadStage::Read, 1.0) {
        return Err(EngineError::Cancelled);
    }
    Ok((samples, sample_rate, channels))
}

/// Sinc resampling from `from` Hz to `to` Hz
fn resample(
    samples: &[Sample],
    from: u32,
    to: u32,
    channels: usize,
    progress: &mut dyn FnMut(LoadStage, f32) -> bool,
) -> EngineResult<Vec<Sample>> {
    let ratio = to as f64 / from as f64;
    if !(ratio >= 1.0 / MAX_RESAMPLE_RATIO && ratio <= MAX_RESAMPLE_RATIO) {
        return Err(EngineError::InvalidSampleRate { from, to });
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    const CHUNK: usize = 1024;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, CHUNK, channels)
        .map_err(|_| EngineError::InvalidSampleRate { from, to })?;

    let nframes = samples.len() / channels;
    let mut planes: Vec<Vec<Sample>> = vec![Vec::with_capacity(nframes); channels];
    for frame in samples.chunks_exact(channels) {
        for (ch, &s) in frame.iter().enumerate() {
            planes[ch].push(s);
        }
    }

    let mut out_planes: Vec<Vec<Sample>> = vec![Vec::new(); channels];
    let mut pos = 0;
    let mut next_tick = 0usize;
    while pos + CHUNK <= nframes {
        let input: Vec<&[Sample]> = planes.iter().map(|p| &p[pos..pos + CHUNK]).collect();
        let chunk_out = resampler
            .process(&input, None)
            .map_err(|_| EngineError::InvalidSampleRate { from, to })?;
        for (ch, plane) in chunk_out.into_iter().enumerate() {
            out_planes[ch].extend(plane);
        }
        pos += CHUNK;

        let frac = pos as f32 / nframes as f32;
        let step = (frac * STEPS_PER_STAGE as f32) as usize;
        if step > next_tick {
            next_tick = step;
            if !progress(LoadStage::Resample, frac) {
                return Err(EngineError::Cancelled);
            }
        }
    }
    if pos < nframes {
        let input: Vec<&[Sample]> = planes.iter().map(|p| &p[pos..]).collect();
        let chunk_out = resampler
            .process_partial(Some(&input), None)
            .map_err(|_| EngineError::InvalidSampleRate { from, to })?;
        for (ch, plane) in chunk_out.into_iter().enumerate() {
            out_planes[ch].extend(plane);
        }
    }
    if !progress(LoadStage::Resample, 1.0) {
        return Err(EngineError::Cancelled);
    }

    let out_frames = out_planes.iter().map(|p| p.len()).min().unwrap_or(0);
    let mut out = Vec::with_capacity(out_frames * channels);
    for f in 0..out_frames {
        for plane in &out_planes {
            out.push(plane[f]);
        }
    }
    Ok(out)
}

/// Messages emitted by a background load
pub enum LoadProgress {
    /// A progress tick from the loading pipeline
    Stage { stage: LoadStage, fraction: f32 },
    /// The load finished; here is the sequence
    Complete { sequence: Arc<Sequence> },
    /// The load failed
    Failed { error: String },
    /// The load was cancelled via [`LoadService::cancel`]
    Cancelled,
}

/// Background loader reporting over a channel
///
/// One load at a time; progress arrives as messages so UIs subscribe
/// instead of polling.
pub struct LoadService {
    cancel_flag: Arc<AtomicBool>,
}

impl LoadService {
    pub fn new() -> Self {
        Self {
            cancel_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start loading `path` on a worker thread
    pub fn start_load(&self, path: PathBuf, target_rate: u32) -> Receiver<LoadProgress> {
        self.cancel_flag.store(false, Ordering::SeqCst);
        let cancel = Arc::clone(&self.cancel_flag);
        let (tx, rx) = unbounded();

        thread::Builder::new()
            .name("reel-load".to_string())
            .spawn(move || {
                let mut callback = |stage: LoadStage, fraction: f32| {
                    let _ = tx.send(LoadProgress::Stage { stage, fraction });
                    !cancel.load(Ordering::Relaxed)
                };
                let message = match load_sequence(&path, target_rate, &mut callback) {
                    Ok(sequence) => LoadProgress::Complete { sequence },
                    Err(EngineError::Cancelled) => LoadProgress::Cancelled,
                    Err(e) => {
                        log::warn!("Load of {:?} failed: {}", path, e);
                        LoadProgress::Failed {
                            error: e.to_string(),
                        }
                    }
                };
                let _ = tx.send(message);
            })
            .expect("Failed to spawn load thread");

        rx
    }

    /// Ask the running load to stop at its next progress point
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
    }
}

impl Default for LoadService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, samples: &[f32], rate: u32, channels: u16) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer
                .write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_load_wav_no_resample() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<f32> = (0..4410)
            .map(|i| 0.5 * (i as f32 * 440.0 * 2.0 * std::f32::consts::PI / 44100.0).sin())
            .collect();
        write_wav(&path, &samples, 44100, 1);

        let mut stages = Vec::new();
        let seq = load_sequence(&path, 44100, &mut |stage, frac| {
            stages.push((stage, frac));
            true
        })
        .unwrap();

        assert_eq!(seq.channels(), 1);
        assert_eq!(seq.nframes(), 4410);
        assert_eq!(seq.name(), "tone");
        // 16-bit quantization leaves the peak near 0.5
        let peak = seq.current().to_vec().iter().fold(0.0f32, |a, s| a.max(s.abs()));
        assert!((peak - 0.5).abs() < 0.01);
        assert_eq!(stages.last().map(|s| s.0), Some(LoadStage::Complete));
    }

    #[test]
    fn test_load_resamples_to_session_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone48.wav");
        let samples: Vec<f32> = (0..4800).map(|i| (i as f32 * 0.02).sin() * 0.4).collect();
        write_wav(&path, &samples, 48000, 1);

        let seq = load_sequence(&path, 44100, &mut |_, _| true).unwrap();
        // 100ms of audio stays 100ms at the new rate
        let expected = 4410;
        assert!((seq.nframes() as i64 - expected).abs() < 32, "{}", seq.nframes());
    }

    #[test]
    fn test_cancel_during_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.wav");
        write_wav(&path, &vec![0.1; 441000], 44100, 1);

        let result = load_sequence(&path, 44100, &mut |_, _| false);
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }

    #[test]
    fn test_decoder_failure_sends_complete_tick() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.wav");
        std::fs::write(&path, b"not a wav file at all").unwrap();

        let mut got_complete = false;
        let result = load_sequence(&path, 44100, &mut |stage, _| {
            if stage == LoadStage::Complete {
                got_complete = true;
            }
            true
        });
        assert!(matches!(result, Err(EngineError::DecoderFailure { .. })));
        assert!(got_complete, "UIs need the terminal tick to close progress");
    }

    #[test]
    fn test_absurd_rate_conversion_rejected() {
        let samples = vec![0.0f32; 1024];
        let result = resample(&samples, 1000, 96000, 1, &mut |_, _| true);
        assert!(matches!(
            result,
            Err(EngineError::InvalidSampleRate { .. })
        ));
    }

    #[test]
    fn test_load_service_reports_over_channel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svc.wav");
        write_wav(&path, &vec![0.2; 8820], 44100, 2);

        let service = LoadService::new();
        let rx = service.start_load(path, 44100);

        let mut sequence = None;
        for message in rx.iter() {
            match message {
                LoadProgress::Complete { sequence: s } => {
                    sequence = Some(s);
                    break;
                }
                LoadProgress::Failed { error } => panic!("load failed: {}", error),
                LoadProgress::Cancelled => panic!("unexpected cancel"),
                LoadProgress::Stage { .. } => {}
            }
        }
        let sequence = sequence.expect("no completion message");
        assert_eq!(sequence.channels(), 2);
        assert_eq!(sequence.nframes(), 4410);
    }
}
