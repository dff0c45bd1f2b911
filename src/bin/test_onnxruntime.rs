//! Test binary for the ONNX Runtime separation backend
//!
//! Run with: cargo run --bin test_onnxruntime -- [model.onnx] [song.wav]

use std::path::PathBuf;
use std::process::ExitCode;
use voxsplit_lib::audio::{load_audio_file, ChunkConfig};
use voxsplit_lib::config::AppConfig;
use voxsplit_lib::engine::{OnnxSeparator, SeparationConfig, Separator};

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

/// Two seconds of a "voice-like" tone over a low "bass" tone
fn synthetic_mixture(sample_rate: u32) -> Vec<f32> {
    let n = sample_rate as usize * 2;
    (0..n)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            0.3 * (2.0 * std::f32::consts::PI * 440.0 * t).sin()
                + 0.3 * (2.0 * std::f32::consts::PI * 55.0 * t).sin()
        })
        .collect()
}

fn main() -> ExitCode {
    voxsplit_lib::init_tracing(None);

    println!("Testing ONNX Runtime separation backend...\n");

    let mut args = std::env::args().skip(1);
    let model_path = match args
        .next()
        .map(PathBuf::from)
        .or_else(|| AppConfig::default().resolve_model_path())
    {
        Some(path) => path,
        None => {
            eprintln!("Model not found: pass a path or place it at model/separator.onnx");
            return ExitCode::FAILURE;
        }
    };
    println!("Model: {:?}", model_path);

    let config = SeparationConfig::default();

    println!("\n[1/2] Loading ONNX model...");
    let separator = match OnnxSeparator::load(&model_path, &config) {
        Ok(separator) => {
            println!("✓ Model loaded on {}", separator.device().display_name());
            separator
        }
        Err(e) => {
            eprintln!("✗ Failed to load model: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let (samples, sample_rate) = match args.next().map(PathBuf::from) {
        Some(path) => match load_audio_file(&path) {
            Ok(loaded) => loaded,
            Err(e) => {
                eprintln!("✗ {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => {
            println!("No audio given, using a synthetic mixture");
            (synthetic_mixture(44100), 44100)
        }
    };

    // Only the first chunk, that is what the pipeline hands the model
    let plan = ChunkConfig::new(config.chunk_seconds).plan(samples.len(), sample_rate);
    let Some(chunk) = plan.iter().next() else {
        eprintln!("✗ Audio is empty");
        return ExitCode::FAILURE;
    };
    let input = chunk.slice(&samples);
    println!(
        "Audio: {} Hz, first chunk {} samples ({:.2}s)",
        sample_rate,
        input.len(),
        input.len() as f32 / sample_rate as f32
    );

    println!("\n[2/2] Running separation...");
    let start = std::time::Instant::now();
    let estimate = match separator.separate(input, sample_rate) {
        Ok(estimate) => estimate,
        Err(e) => {
            eprintln!("✗ Separation failed: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let elapsed = start.elapsed();

    println!("Input RMS: {:.4}", rms(input));
    for name in estimate.stem_names() {
        let stem = estimate.get(name).unwrap_or_default();
        println!("  {:<14} {} samples, RMS {:.4}", name, stem.len(), rms(stem));
    }
    println!("Time: {:?}", elapsed);

    match estimate.into_pair() {
        Ok(_) => {
            println!("\n✓ ONNX Runtime test completed successfully!");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("\n✗ {}", e);
            ExitCode::FAILURE
        }
    }
}
