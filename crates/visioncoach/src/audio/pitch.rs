//! Duration-preserving pitch shift
//!
//! Two read taps sweep through a delay line at `1 - ratio` samples per
//! sample, half a window apart, and are crossfaded with a triangular window
//! so each tap is silent while it wraps. Output length always equals input
//! length. Cheap enough to run per beep on the frame-processing task.

/// Frequency ratio for a shift of `cents` (1200 cents per octave)
pub fn cents_to_ratio(cents: f64) -> f64 {
    2f64.powf(cents / 1200.0)
}

/// Default crossfade window in seconds
const WINDOW_SECONDS: f64 = 0.03;

#[derive(Debug, Clone)]
pub struct PitchShifter {
    window: usize,
}

impl PitchShifter {
    pub fn new(sample_rate: u32) -> Self {
        Self::with_window((sample_rate as f64 * WINDOW_SECONDS) as usize)
    }

    /// Window length in samples (at least 2)
    pub fn with_window(window: usize) -> Self {
        Self {
            window: window.max(2),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Shift `input` by `cents`. Zero cents returns the input unchanged.
    pub fn process(&self, input: &[f32], cents: f64) -> Vec<f32> {
        if cents == 0.0 || !cents.is_finite() || input.is_empty() {
            return input.to_vec();
        }

        let ratio = cents_to_ratio(cents);
        let window = self.window as f64;
        let rate = 1.0 - ratio;

        // Delay grows by `rate` per sample; each tap wraps inside [0, window)
        let mut phase = 0.0f64;
        let mut out = Vec::with_capacity(input.len());

        for n in 0..input.len() {
            let mut sample = 0.0f64;
            for offset in [0.0, 0.5] {
                let p = (phase + offset).rem_euclid(1.0);
                let delay = p * window;
                let gain = 1.0 - (2.0 * p - 1.0).abs();
                sample += gain * read_delayed(input, n, delay);
            }
            out.push(sample as f32);

            phase = (phase + rate / window).rem_euclid(1.0);
        }

        out
    }
}

/// Linear-interpolated read of `input[n - delay]`, zero before the start
fn read_delayed(input: &[f32], n: usize, delay: f64) -> f64 {
    let pos = n as f64 - delay;
    if pos < 0.0 {
        return 0.0;
    }
    let i = pos.floor() as usize;
    let frac = pos - i as f64;
    let a = input.get(i).copied().unwrap_or(0.0) as f64;
    let b = input.get(i + 1).copied().unwrap_or(a as f32) as f64;
    a + (b - a) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, rate: f64, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / rate).sin() as f32)
            .collect()
    }

    /// Count rising zero crossings in the steady-state part
    fn crossings(samples: &[f32]) -> usize {
        samples
            .windows(2)
            .filter(|w| w[0] <= 0.0 && w[1] > 0.0)
            .count()
    }

    #[test]
    fn test_cents_to_ratio() {
        assert!((cents_to_ratio(0.0) - 1.0).abs() < 1e-12);
        assert!((cents_to_ratio(1200.0) - 2.0).abs() < 1e-12);
        assert!((cents_to_ratio(-1200.0) - 0.5).abs() < 1e-12);
        assert!((cents_to_ratio(700.0) - 1.498_307).abs() < 1e-5);
    }

    #[test]
    fn test_zero_cents_is_identity() {
        let input = sine(440.0, 48000.0, 1000);
        let shifter = PitchShifter::new(48000);
        assert_eq!(shifter.process(&input, 0.0), input);
    }

    #[test]
    fn test_preserves_length() {
        let input = sine(440.0, 48000.0, 4800);
        let shifter = PitchShifter::new(48000);
        for cents in [-700.0, 300.0, 1200.0] {
            assert_eq!(shifter.process(&input, cents).len(), input.len());
        }
    }

    #[test]
    fn test_output_bounded() {
        let input = sine(880.0, 48000.0, 4800);
        let shifter = PitchShifter::new(48000);
        let out = shifter.process(&input, 1200.0);
        assert!(out.iter().all(|s| s.abs() <= 1.0 + 1e-4));
    }

    #[test]
    fn test_octave_up_doubles_frequency() {
        let rate = 48000.0;
        let input = sine(200.0, rate, 48000);
        let shifter = PitchShifter::new(48000);
        let out = shifter.process(&input, 1200.0);

        let steady = &out[4800..];
        let seconds = steady.len() as f64 / rate;
        let measured = crossings(steady) as f64 / seconds;
        assert!(
            (measured - 400.0).abs() < 40.0,
            "expected ~400Hz, measured {measured}"
        );
    }

    #[test]
    fn test_empty_input() {
        let shifter = PitchShifter::new(48000);
        assert!(shifter.process(&[], 600.0).is_empty());
    }
}
