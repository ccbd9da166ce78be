use super::AcousticsError;
use super::spectrum::{fft, inverse_fft};
use rustfft::num_complex::Complex;
use std::f64::consts::PI;
use std::ops::Range;

/// A mono signal on an absolute time axis.
///
/// Sample `i` sits at `start_time + i / sample_rate`. Extracted parts keep
/// the times of the sound they came from, so annotation times can be used
/// on them directly.
#[derive(Debug, Clone, PartialEq)]
pub struct Sound {
    samples: Vec<f64>,
    sample_rate: f64,
    start_time: f64,
}

impl Sound {
    pub fn new(samples: Vec<f64>, sample_rate: f64) -> Self {
        Self {
            samples,
            sample_rate,
            start_time: 0.0,
        }
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration()
    }

    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate
    }

    pub fn time_at(&self, index: usize) -> f64 {
        self.start_time + index as f64 / self.sample_rate
    }

    /// Indices of the samples whose times fall inside `[from, to]`.
    pub fn index_range(&self, from: f64, to: f64) -> Range<usize> {
        let n = self.samples.len();
        let first = ((from - self.start_time) * self.sample_rate - 1e-9).ceil();
        let last = ((to - self.start_time) * self.sample_rate + 1e-9).floor();
        let first = first.clamp(0.0, n as f64) as usize;
        let end = (last + 1.0).clamp(0.0, n as f64) as usize;
        first..end.max(first)
    }

    /// Copy out `[from, to]`, keeping the original time axis.
    pub fn extract_part(&self, from: f64, to: f64) -> Result<Sound, AcousticsError> {
        let range = self.index_range(from, to);
        if range.is_empty() {
            return Err(AcousticsError::EmptyRange { from, to });
        }
        Ok(Sound {
            start_time: self.time_at(range.start),
            samples: self.samples[range].to_vec(),
            sample_rate: self.sample_rate,
        })
    }

    /// Root-mean-square amplitude; `None` for an empty sound.
    pub fn rms(&self) -> Option<f64> {
        rms(&self.samples)
    }

    /// First-order pre-emphasis: +6 dB/octave above `from_frequency`.
    pub fn pre_emphasis(&self, from_frequency: f64) -> Sound {
        let alpha = (-2.0 * PI * from_frequency / self.sample_rate).exp();
        let mut samples = self.samples.clone();
        for i in (1..samples.len()).rev() {
            samples[i] -= alpha * self.samples[i - 1];
        }
        Sound {
            samples,
            sample_rate: self.sample_rate,
            start_time: self.start_time,
        }
    }

    /// Band-limited resampling by spectrum truncation (or zero extension).
    pub fn resample(&self, new_rate: f64) -> Sound {
        let n = self.samples.len();
        if n == 0 || (new_rate - self.sample_rate).abs() < 1e-9 {
            return Sound {
                samples: self.samples.clone(),
                sample_rate: new_rate,
                start_time: self.start_time,
            };
        }

        let m = ((n as f64) * new_rate / self.sample_rate).round().max(1.0) as usize;
        let spectrum = fft(&self.samples, n);
        let mut out = vec![Complex::new(0.0, 0.0); m];
        let half = n.min(m) / 2;
        out[..half].copy_from_slice(&spectrum[..half]);
        for k in 1..half {
            out[m - k] = spectrum[n - k];
        }

        let scale = 1.0 / n as f64;
        let samples = inverse_fft(out).into_iter().map(|c| c.re * scale).collect();
        Sound {
            samples,
            sample_rate: new_rate,
            start_time: self.start_time,
        }
    }
}

fn rms(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let sum: f64 = samples.iter().map(|s| s * s).sum();
    Some((sum / samples.len() as f64).sqrt())
}
