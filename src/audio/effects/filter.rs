use super::{flush_denormal, safe_db_to_linear, validate_float};

/// Biquad IIR section (direct form I) for parametric EQ.
///
/// Coefficients are normalized by a0 and kept in f64 so a 0 dB band is
/// transparent to well below f32 resolution.
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadFilter {
    /// Peaking EQ centered on `freq`, `bandwidth` in octaves
    pub fn peak(sample_rate: u32, freq: f32, bandwidth: f32, gain_db: f32) -> Self {
        let mut filter = Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        };
        filter.update_peak_coeffs(sample_rate, freq, bandwidth, gain_db);
        filter
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let x = validate_float(input) as f64;
        let y = self.b0 * x + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;

        // **STABILITY**: Update delay line with denormal protection
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = flush_denormal(y);

        y as f32
    }

    /// Reset filter state to prevent instability
    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }

    /// Update peak coefficients without destroying the delay line, so
    /// parameter changes during playback do not click
    pub fn update_peak_coeffs(&mut self, sample_rate: u32, freq: f32, bandwidth: f32, gain_db: f32) {
        // Amplitude for a peaking filter is the square root of the linear gain
        let a = safe_db_to_linear(gain_db).sqrt();
        let w0 = 2.0 * std::f64::consts::PI * freq as f64 / sample_rate as f64;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha =
            sin_w0 * (std::f64::consts::LN_2 / 2.0 * bandwidth as f64 * w0 / sin_w0).sinh();

        let b0 = 1.0 + alpha * a;
        let b1 = -2.0 * cos_w0;
        let b2 = 1.0 - alpha * a;
        let a0 = 1.0 + alpha / a;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha / a;

        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
    }
}
