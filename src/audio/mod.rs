pub mod chunker;
pub mod encoder;
pub mod pcm;
pub mod processor;

pub use chunker::{Chunk, ChunkConfig, ChunkPlan};
pub use encoder::write_wav_pcm16;
pub use pcm::{postprocess_tracks, quantize_pcm16};
pub use processor::{downmix_to_mono, duration_ms, load_audio_file, resample};
