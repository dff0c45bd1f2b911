//! File-level orchestration: load, chunk, separate, reassemble, encode

use crate::audio::{load_audio_file, postprocess_tracks, write_wav_pcm16};
use crate::engine::config::{AccompanimentSource, SeparationConfig};
use crate::engine::merger::StemAssembler;
use crate::engine::Separator;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Suffix of the vocal output file
pub const VOICE_SUFFIX: &str = "_voice";
/// Suffix of the accompaniment output file
pub const MUSIC_SUFFIX: &str = "_music";

/// Output files of one successful separation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeparatedPaths {
    pub voice: PathBuf,
    pub music: PathBuf,
}

impl SeparatedPaths {
    /// Deterministic output paths for `input` inside `output_dir`
    pub fn for_input(input: &Path, output_dir: &Path) -> Self {
        let base = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());

        Self {
            voice: output_dir.join(format!("{}{}.wav", base, VOICE_SUFFIX)),
            music: output_dir.join(format!("{}{}.wav", base, MUSIC_SUFFIX)),
        }
    }

    /// Scratch names next to the final files, unique to one call
    fn staging(&self) -> Self {
        let tag = Uuid::new_v4().simple().to_string();
        Self {
            voice: staging_path(&self.voice, &tag),
            music: staging_path(&self.music, &tag),
        }
    }

    /// Move staged files onto `target`; a half-moved pair is removed
    fn commit(&self, target: &SeparatedPaths) -> Result<()> {
        std::fs::rename(&self.voice, &target.voice).map_err(|e| {
            AppError::Encode(format!("Failed to move {:?} into place: {}", target.voice, e))
        })?;

        if let Err(e) = std::fs::rename(&self.music, &target.music) {
            if let Err(remove_err) = std::fs::remove_file(&target.voice) {
                warn!("Failed to remove {:?}: {}", target.voice, remove_err);
            }
            return Err(AppError::Encode(format!(
                "Failed to move {:?} into place: {}",
                target.music, e
            )));
        }
        Ok(())
    }

    /// Delete both files, ignoring ones that do not exist
    pub fn remove(&self) {
        for path in [&self.voice, &self.music] {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(path) {
                    warn!("Failed to remove {:?}: {}", path, e);
                }
            }
        }
    }
}

fn staging_path(path: &Path, tag: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.part", name, tag))
}

/// Result of one file in a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEntry {
    pub original: PathBuf,
    pub voice: Option<PathBuf>,
    pub music: Option<PathBuf>,
    pub error: Option<String>,
}

impl BatchEntry {
    pub fn failed(original: impl Into<PathBuf>, error: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            voice: None,
            music: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.voice.is_some() && self.music.is_some()
    }
}

/// Chunked separation of whole audio files
///
/// The pipeline holds no per-file state; one instance can be reused for any
/// number of sequential calls.
pub struct SeparationPipeline {
    separator: Box<dyn Separator>,
    config: SeparationConfig,
    output_dir: PathBuf,
}

impl SeparationPipeline {
    /// Create the pipeline, creating `output_dir` if needed
    pub fn new(
        separator: Box<dyn Separator>,
        config: SeparationConfig,
        output_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir)?;

        info!(
            "Separation pipeline ready (output={:?}, chunk={:.1}s, accompaniment={:?})",
            output_dir, config.chunk_seconds, config.accompaniment
        );

        Ok(Self {
            separator,
            config,
            output_dir,
        })
    }

    pub fn config(&self) -> &SeparationConfig {
        &self.config
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Separate one file into `<base>_voice.wav` and `<base>_music.wav`
    ///
    /// Tracks are written under staging names and only moved onto the final
    /// names once both are complete. On failure the staged files are removed
    /// and the cause is returned; files this call did not write are untouched.
    pub fn process_file(&self, path: &Path) -> Result<SeparatedPaths> {
        let outputs = SeparatedPaths::for_input(path, &self.output_dir);
        let staged = outputs.staging();
        let started = Instant::now();

        match self.run(path, &staged).and_then(|()| staged.commit(&outputs)) {
            Ok(()) => {
                info!(
                    "Separated {:?} in {:.2}s -> {:?}, {:?}",
                    path,
                    started.elapsed().as_secs_f64(),
                    outputs.voice,
                    outputs.music
                );
                Ok(outputs)
            }
            Err(e) => {
                error!("Separation of {:?} failed: {}", path, e);
                staged.remove();
                Err(e)
            }
        }
    }

    /// Separate every file independently, one entry per input
    pub fn process_multiple_files<P: AsRef<Path>>(&self, paths: &[P]) -> Vec<BatchEntry> {
        info!("Processing batch of {} files", paths.len());

        paths
            .iter()
            .map(|path| {
                let path = path.as_ref();
                match self.process_file(path) {
                    Ok(outputs) => BatchEntry {
                        original: path.to_path_buf(),
                        voice: Some(outputs.voice),
                        music: Some(outputs.music),
                        error: None,
                    },
                    Err(e) => BatchEntry::failed(path, e.to_string()),
                }
            })
            .collect()
    }

    fn run(&self, path: &Path, outputs: &SeparatedPaths) -> Result<()> {
        // Loading
        let (samples, sample_rate) = load_audio_file(path)?;

        // Chunking
        let plan = self.config.chunk_config().plan(samples.len(), sample_rate);
        let total_chunks = plan.len();

        // Per-chunk separation
        let mut assembler = StemAssembler::with_capacity(samples.len());
        for chunk in plan.iter() {
            debug!(
                "Separating chunk {}/{} ({:.1}s - {:.1}s)",
                chunk.index + 1,
                total_chunks,
                chunk.start_ms(sample_rate) as f64 / 1000.0,
                chunk.end_ms(sample_rate) as f64 / 1000.0
            );

            let input = chunk.slice(&samples);
            let estimate = self.separator.separate(input, sample_rate)?;
            let (vocals, accompaniment) = estimate.into_pair()?;

            let accompaniment = match self.config.accompaniment {
                AccompanimentSource::StemOutput => accompaniment,
                AccompanimentSource::Subtraction => subtract(input, &vocals),
            };

            assembler.push(&chunk, &vocals, &accompaniment)?;
        }

        // Reassembling
        let (vocals, accompaniment) = assembler.finish();
        if vocals.len() > samples.len() {
            return Err(AppError::PostProcess(format!(
                "Reassembled tracks are longer than the input ({} > {})",
                vocals.len(),
                samples.len()
            )));
        }

        // Post-processing
        let (vocals, accompaniment) = postprocess_tracks(&vocals, &accompaniment)?;

        // Encoding
        write_wav_pcm16(&outputs.voice, &vocals, sample_rate)?;
        write_wav_pcm16(&outputs.music, &accompaniment, sample_rate)?;

        Ok(())
    }
}

/// `mix - vocals` over the shorter of the two
fn subtract(mix: &[f32], vocals: &[f32]) -> Vec<f32> {
    mix.iter().zip(vocals).map(|(m, v)| m - v).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{SeparationEstimate, STEM_OTHER, STEM_VOCALS};
    use parking_lot::Mutex;
    use std::f32::consts::PI;
    use std::sync::Arc;

    /// Splits the mix into fixed fractions and records every call
    struct GainSeparator {
        vocal_gain: f32,
        calls: Arc<Mutex<Vec<usize>>>,
    }

    impl Separator for GainSeparator {
        fn separate(&self, samples: &[f32], _sample_rate: u32) -> Result<SeparationEstimate> {
            self.calls.lock().push(samples.len());
            Ok(SeparationEstimate::new()
                .with_stem(STEM_VOCALS, samples.iter().map(|s| s * self.vocal_gain).collect())
                .with_stem(STEM_OTHER, samples.iter().map(|s| s * 2.0).collect()))
        }
    }

    /// Returns vocals only
    struct VocalsOnlySeparator;

    impl Separator for VocalsOnlySeparator {
        fn separate(&self, samples: &[f32], _sample_rate: u32) -> Result<SeparationEstimate> {
            Ok(SeparationEstimate::new().with_stem(STEM_VOCALS, samples.to_vec()))
        }
    }

    /// Drops one sample from the accompaniment of every chunk
    struct DriftingSeparator;

    impl Separator for DriftingSeparator {
        fn separate(&self, samples: &[f32], _sample_rate: u32) -> Result<SeparationEstimate> {
            Ok(SeparationEstimate::new()
                .with_stem(STEM_VOCALS, samples.to_vec())
                .with_stem("accompaniment", samples[..samples.len() - 1].to_vec()))
        }
    }

    fn write_sine(path: &Path, seconds: f32, sample_rate: u32) -> usize {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let total = (seconds * sample_rate as f32) as usize;
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..total {
            let t = i as f32 / sample_rate as f32;
            let value = (2.0 * PI * 220.0 * t).sin() * 0.6;
            writer.write_sample((value * 32767.0) as i16).unwrap();
        }
        writer.finalize().unwrap();
        total
    }

    fn read_pcm(path: &Path) -> (hound::WavSpec, Vec<i16>) {
        let reader = hound::WavReader::open(path).unwrap();
        let spec = reader.spec();
        let samples = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        (spec, samples)
    }

    fn gain_pipeline(output_dir: &Path, config: SeparationConfig) -> (SeparationPipeline, Arc<Mutex<Vec<usize>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let separator = GainSeparator {
            vocal_gain: 0.5,
            calls: calls.clone(),
        };
        let pipeline = SeparationPipeline::new(Box::new(separator), config, output_dir).unwrap();
        (pipeline, calls)
    }

    #[test]
    fn test_output_names_are_deterministic() {
        let paths = SeparatedPaths::for_input(Path::new("uploads/song.mp3"), Path::new("temp_audio"));
        assert_eq!(paths.voice, Path::new("temp_audio/song_voice.wav"));
        assert_eq!(paths.music, Path::new("temp_audio/song_music.wav"));
    }

    #[test]
    fn test_25s_song_is_separated_in_three_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("song.wav");
        let total = write_sine(&input, 25.0, 44_100);

        let (pipeline, calls) = gain_pipeline(&dir.path().join("out"), SeparationConfig::default());
        let outputs = pipeline.process_file(&input).unwrap();

        assert_eq!(*calls.lock(), vec![441_000, 441_000, 220_500]);
        assert_eq!(outputs.voice, dir.path().join("out/song_voice.wav"));
        assert_eq!(outputs.music, dir.path().join("out/song_music.wav"));

        let (voice_spec, voice) = read_pcm(&outputs.voice);
        let (music_spec, music) = read_pcm(&outputs.music);
        assert_eq!(voice_spec.sample_rate, 44_100);
        assert_eq!(voice_spec.channels, 1);
        assert_eq!(voice_spec.bits_per_sample, 16);
        assert_eq!(music_spec.sample_rate, 44_100);
        assert_eq!(voice.len(), total);
        assert_eq!(music.len(), total);
    }

    #[test]
    fn test_out_of_range_stems_are_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("loud.wav");
        write_sine(&input, 1.0, 8_000);

        // The "other" stem is the mix doubled, peaking at 1.2
        let (pipeline, _) = gain_pipeline(&dir.path().join("out"), SeparationConfig::default());
        let outputs = pipeline.process_file(&input).unwrap();

        let (_, music) = read_pcm(&outputs.music);
        assert!(music.iter().any(|&s| s == 32767));
        assert!(music.iter().all(|&s| (s as f32 / 32767.0).abs() <= 1.0));
    }

    #[test]
    fn test_subtraction_mode_derives_accompaniment_from_mix() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("mix.wav");
        write_sine(&input, 2.0, 8_000);

        let config = SeparationConfig::default()
            .with_chunk_seconds(0.5)
            .with_accompaniment(AccompanimentSource::Subtraction);
        let (pipeline, calls) = gain_pipeline(&dir.path().join("out"), config);
        let outputs = pipeline.process_file(&input).unwrap();
        assert_eq!(calls.lock().len(), 4);

        let (_, voice) = read_pcm(&outputs.voice);
        let (_, music) = read_pcm(&outputs.music);
        // vocals are half the mix, so the remainder is the other half
        for (v, m) in voice.iter().zip(&music) {
            assert!((*v as i32 - *m as i32).abs() <= 1);
        }
    }

    #[test]
    fn test_missing_accompaniment_fails_without_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("song.wav");
        write_sine(&input, 1.0, 8_000);

        let out = dir.path().join("out");
        let pipeline =
            SeparationPipeline::new(Box::new(VocalsOnlySeparator), SeparationConfig::default(), &out).unwrap();

        let err = pipeline.process_file(&input).unwrap_err();
        assert!(matches!(err, AppError::EstimateShape(_)));
        assert!(!out.join("song_voice.wav").exists());
        assert!(!out.join("song_music.wav").exists());
        assert_eq!(staged_leftovers(&out), 0);
    }

    fn staged_leftovers(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().ends_with(".part"))
            .count()
    }

    #[test]
    fn test_failure_leaves_files_it_did_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(out.join("song_voice.wav"), b"previous").unwrap();

        let input = dir.path().join("song.wav");
        std::fs::write(&input, b"not audio").unwrap();

        let (pipeline, _) = gain_pipeline(&out, SeparationConfig::default());
        assert!(matches!(pipeline.process_file(&input), Err(AppError::Decode(_))));
        assert_eq!(std::fs::read(out.join("song_voice.wav")).unwrap(), b"previous");
        assert!(!out.join("song_music.wav").exists());
        assert_eq!(staged_leftovers(&out), 0);
    }

    #[test]
    fn test_failed_file_keeps_earlier_output_with_same_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a")).unwrap();
        std::fs::create_dir_all(dir.path().join("b")).unwrap();
        let valid = dir.path().join("a/song.wav");
        let garbage = dir.path().join("b/song.mp3");
        write_sine(&valid, 1.0, 8_000);
        std::fs::write(&garbage, b"garbage bytes").unwrap();

        let out = dir.path().join("out");
        let (pipeline, _) = gain_pipeline(&out, SeparationConfig::default());
        let results = pipeline.process_multiple_files(&[&valid, &garbage]);

        assert!(results[0].is_success());
        assert!(!results[1].is_success());
        let voice = results[0].voice.as_ref().unwrap();
        let music = results[0].music.as_ref().unwrap();
        assert_eq!(read_pcm(voice).1.len(), 8_000);
        assert_eq!(read_pcm(music).1.len(), 8_000);
        assert_eq!(staged_leftovers(&out), 0);
    }

    #[test]
    fn test_drifting_stems_are_truncated_to_match() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("drift.wav");
        let total = write_sine(&input, 3.0, 8_000);

        let pipeline = SeparationPipeline::new(
            Box::new(DriftingSeparator),
            SeparationConfig::default().with_chunk_seconds(1.0),
            dir.path().join("out"),
        )
        .unwrap();
        let outputs = pipeline.process_file(&input).unwrap();

        let (_, voice) = read_pcm(&outputs.voice);
        let (_, music) = read_pcm(&outputs.music);
        assert_eq!(voice.len(), music.len());
        assert_eq!(voice.len(), total - 3);
    }

    #[test]
    fn test_batch_entries_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.wav");
        let corrupt = dir.path().join("corrupt.mp3");
        let third = dir.path().join("third.wav");
        write_sine(&first, 1.0, 8_000);
        std::fs::write(&corrupt, b"garbage bytes").unwrap();
        write_sine(&third, 1.5, 8_000);

        let (pipeline, _) = gain_pipeline(&dir.path().join("out"), SeparationConfig::default());
        let results = pipeline.process_multiple_files(&[&first, &corrupt, &third]);

        assert_eq!(results.len(), 3);
        assert!(results[0].is_success());
        assert_eq!(results[1].original, corrupt);
        assert!(results[1].voice.is_none() && results[1].music.is_none());
        assert!(results[1].error.is_some());
        assert!(results[2].is_success());
        assert!(results[2].voice.as_ref().unwrap().exists());
        assert!(results[2].music.as_ref().unwrap().exists());
    }

    #[test]
    fn test_rerun_overwrites_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("song.wav");
        write_sine(&input, 1.0, 8_000);

        let (pipeline, _) = gain_pipeline(&dir.path().join("out"), SeparationConfig::default());
        let first = pipeline.process_file(&input).unwrap();
        let second = pipeline.process_file(&input).unwrap();
        assert_eq!(first, second);
        assert_eq!(read_pcm(&second.voice).1.len(), 8_000);
    }
}
