//! Short-time Fourier transform used by the spectral model backend

use ndarray::Array2;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// Smallest frame size accepted
pub const MIN_N_FFT: usize = 16;

/// Windowed STFT with a periodic Hann window and centered frames
pub struct Stft {
    n_fft: usize,
    hop_length: usize,
    window: Vec<f32>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
}

impl Stft {
    /// `n_fft` is raised to at least 16 and the hop kept within `1..=n_fft`
    pub fn new(n_fft: usize, hop_length: usize) -> Self {
        let n_fft = n_fft.max(MIN_N_FFT);
        let window: Vec<f32> = (0..n_fft)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / n_fft as f32).cos()))
            .collect();

        let mut planner = FftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(n_fft);
        let inverse = planner.plan_fft_inverse(n_fft);

        Self {
            n_fft,
            hop_length: hop_length.clamp(1, n_fft),
            window,
            forward,
            inverse,
        }
    }

    /// Number of frequency bins per frame (DC through Nyquist)
    pub fn num_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Number of frames produced for a signal of `len` samples
    pub fn num_frames(&self, len: usize) -> usize {
        // n_fft/2 zero padding on the left, at least n_fft/2 on the right
        len.div_ceil(self.hop_length) + 1
    }

    fn padded_len(&self, len: usize) -> usize {
        (self.num_frames(len) - 1) * self.hop_length + self.n_fft
    }

    /// Complex spectrum, shape (frames, bins)
    pub fn forward(&self, samples: &[f32]) -> Array2<Complex<f32>> {
        let pad = self.n_fft / 2;
        let num_frames = self.num_frames(samples.len());

        let mut padded = vec![0.0f32; self.padded_len(samples.len())];
        padded[pad..pad + samples.len()].copy_from_slice(samples);

        let num_bins = self.num_bins();
        let mut spectrum = Array2::<Complex<f32>>::zeros((num_frames, num_bins));
        let mut buffer = vec![Complex::new(0.0f32, 0.0); self.n_fft];

        for frame in 0..num_frames {
            let start = frame * self.hop_length;
            for (i, slot) in buffer.iter_mut().enumerate() {
                *slot = Complex::new(padded[start + i] * self.window[i], 0.0);
            }

            self.forward.process(&mut buffer);

            for (bin, value) in buffer.iter().take(num_bins).enumerate() {
                spectrum[[frame, bin]] = *value;
            }
        }

        spectrum
    }

    /// Overlap-add inverse of [`Stft::forward`], trimmed to `len` samples
    pub fn inverse(&self, spectrum: &Array2<Complex<f32>>, len: usize) -> Vec<f32> {
        let (num_frames, num_bins) = spectrum.dim();
        let pad = self.n_fft / 2;
        let total = (num_frames.max(1) - 1) * self.hop_length + self.n_fft;

        let mut output = vec![0.0f32; total];
        let mut norm = vec![0.0f32; total];
        let mut buffer = vec![Complex::new(0.0f32, 0.0); self.n_fft];
        let scale = 1.0 / self.n_fft as f32;

        for frame in 0..num_frames {
            // Rebuild the full conjugate-symmetric spectrum
            for bin in 0..self.n_fft {
                buffer[bin] = if bin < num_bins {
                    spectrum[[frame, bin]]
                } else {
                    let mirror = self.n_fft - bin;
                    if mirror < num_bins {
                        spectrum[[frame, mirror]].conj()
                    } else {
                        Complex::new(0.0, 0.0)
                    }
                };
            }

            self.inverse.process(&mut buffer);

            let start = frame * self.hop_length;
            for (i, value) in buffer.iter().enumerate() {
                let w = self.window[i];
                output[start + i] += value.re * scale * w;
                norm[start + i] += w * w;
            }
        }

        for (sample, weight) in output.iter_mut().zip(norm.iter()) {
            if *weight > 1e-8 {
                *sample /= *weight;
            }
        }

        output
            .into_iter()
            .skip(pad)
            .take(len)
            .chain(std::iter::repeat(0.0))
            .take(len)
            .collect()
    }
}
