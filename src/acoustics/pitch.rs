use super::AcousticsError;
use super::sound::Sound;
use pitch_detection::detector::PitchDetector;
use pitch_detection::detector::mcleod::McLeodDetector;

/// Power threshold for the McLeod detector (sum of squared samples per frame)
const POWER_THRESHOLD: f64 = 0.05;

/// Clarity threshold for the McLeod detector
const CLARITY_THRESHOLD: f64 = 0.5;

/// Analysis window in periods of the pitch floor
const PERIODS_PER_WINDOW: f64 = 3.0;

/// Time step as a fraction of the longest period
const STEP_FRACTION: f64 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchFrame {
    /// Frame centre in seconds
    pub time: f64,
    /// Fundamental frequency in Hz; `None` when unvoiced
    pub frequency: Option<f64>,
}

/// A pitch contour: one frame per time step, voiced or not.
#[derive(Debug, Clone, PartialEq)]
pub struct PitchTrack {
    floor: f64,
    ceiling: f64,
    time_step: f64,
    frames: Vec<PitchFrame>,
}

impl PitchTrack {
    pub fn new(floor: f64, ceiling: f64, time_step: f64, frames: Vec<PitchFrame>) -> Self {
        Self {
            floor,
            ceiling,
            time_step,
            frames,
        }
    }

    /// Track pitch over a whole sound with the McLeod pitch method.
    ///
    /// The window spans three periods of `floor`; the step is 0.75 of one
    /// such period. Estimates outside `[floor, ceiling]` count as unvoiced.
    pub fn from_sound(sound: &Sound, floor: f64, ceiling: f64) -> Result<Self, AcousticsError> {
        if !(floor > 0.0 && ceiling > floor) {
            return Err(AcousticsError::InvalidParameter(format!(
                "pitch range {floor}..{ceiling} Hz"
            )));
        }
        let sr = sound.sample_rate();
        let window = (PERIODS_PER_WINDOW / floor * sr).ceil() as usize;
        let time_step = STEP_FRACTION / floor;
        let step = ((time_step * sr).round() as usize).max(1);
        if sound.num_samples() < window {
            return Err(AcousticsError::TooShort {
                needed: PERIODS_PER_WINDOW / floor,
                available: sound.duration(),
            });
        }

        let mut detector = McLeodDetector::<f64>::new(window, window / 2);
        let samples = sound.samples();
        let mut frames = Vec::new();
        let mut start = 0;
        while start + window <= samples.len() {
            let frame = &samples[start..start + window];
            let frequency = detector
                .get_pitch(frame, sr as usize, POWER_THRESHOLD, CLARITY_THRESHOLD)
                .map(|p| p.frequency)
                .filter(|f| f.is_finite() && *f >= floor && *f <= ceiling);
            frames.push(PitchFrame {
                time: sound.time_at(start) + window as f64 / (2.0 * sr),
                frequency,
            });
            start += step;
        }

        log::trace!(
            "pitch track: {} frames, {} voiced",
            frames.len(),
            frames.iter().filter(|f| f.frequency.is_some()).count()
        );

        Ok(Self {
            floor,
            ceiling,
            time_step,
            frames,
        })
    }

    pub fn floor(&self) -> f64 {
        self.floor
    }

    pub fn ceiling(&self) -> f64 {
        self.ceiling
    }

    pub fn time_step(&self) -> f64 {
        self.time_step
    }

    pub fn frames(&self) -> &[PitchFrame] {
        &self.frames
    }

    /// F0 at `time`, linearly interpolated between the neighbouring frames.
    ///
    /// If either neighbour is unvoiced, the nearer frame is used provided it
    /// is voiced and within half a time step.
    pub fn value_at_time(&self, time: f64) -> Option<f64> {
        let idx = self.frames.partition_point(|f| f.time < time);
        let right = self.frames.get(idx);
        let left = idx.checked_sub(1).and_then(|i| self.frames.get(i));

        let nearest = |f: &PitchFrame| {
            ((f.time - time).abs() <= self.time_step / 2.0 + 1e-12)
                .then_some(f.frequency)
                .flatten()
        };

        match (left, right) {
            (Some(l), Some(r)) => match (l.frequency, r.frequency) {
                (Some(a), Some(b)) if r.time > l.time => {
                    let w = (time - l.time) / (r.time - l.time);
                    Some(a + w * (b - a))
                }
                _ => {
                    let closer = if time - l.time <= r.time - time { l } else { r };
                    nearest(closer)
                }
            },
            (Some(f), None) | (None, Some(f)) => nearest(f),
            (None, None) => None,
        }
    }

    /// Voiced F0 values of frames centred in `[from, to]`.
    pub fn voiced_between(&self, from: f64, to: f64) -> Vec<f64> {
        self.frames
            .iter()
            .filter(|f| f.time >= from && f.time <= to)
            .filter_map(|f| f.frequency)
            .collect()
    }

    /// Quantile `q` (0..=1) of the voiced F0 values in `[from, to]`.
    pub fn quantile(&self, from: f64, to: f64, q: f64) -> Option<f64> {
        let mut values = self.voiced_between(from, to);
        quantile(&mut values, q)
    }
}

/// Linear-interpolated quantile of `values`; sorts in place.
pub fn quantile(values: &mut [f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let pos = q * (values.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let w = pos - lo as f64;
    Some(values[lo] + w * (values[hi] - values[lo]))
}
