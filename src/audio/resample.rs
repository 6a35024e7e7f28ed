//! Streaming linear resampler
//!
//! Bridges the synthesis service's native rate and the playback device rate.
//! Interpolation is linear over the sample index space; the fractional read
//! position and the previous chunk's final sample are carried across calls so
//! arbitrary-size streaming chunks resample without seams. The resampler is
//! mono: it runs before channel routing, so channel separation is structural.

/// Stateful linear-interpolation resampler for 16-bit mono PCM
#[derive(Debug)]
pub struct LinearResampler {
    from_rate: u32,
    to_rate: u32,
    /// Read position relative to the current chunk, where index -1 is the
    /// final sample of the previous chunk
    pos: f64,
    last: Option<i16>,
}

impl LinearResampler {
    /// Create a resampler converting `from_rate` Hz to `to_rate` Hz
    #[must_use]
    pub const fn new(from_rate: u32, to_rate: u32) -> Self {
        Self {
            from_rate,
            to_rate,
            pos: 0.0,
            last: None,
        }
    }

    /// Whether input and output rates match (process becomes a copy)
    #[must_use]
    pub const fn is_identity(&self) -> bool {
        self.from_rate == self.to_rate
    }

    /// Resample one chunk, carrying state to the next call
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn process(&mut self, input: &[i16]) -> Vec<i16> {
        if input.is_empty() {
            return Vec::new();
        }
        if self.is_identity() {
            return input.to_vec();
        }

        let step = f64::from(self.from_rate) / f64::from(self.to_rate);
        let mut output =
            Vec::with_capacity((input.len() as f64 / step) as usize + 2);

        let limit = input.len() as f64 - 1.0;
        while self.pos <= limit {
            let base = self.pos.floor();
            let frac = self.pos - base;
            let idx = base as isize;

            let a = if idx < 0 {
                self.last.unwrap_or(input[0])
            } else {
                input[idx.unsigned_abs()]
            };
            let b = usize::try_from(idx + 1)
                .ok()
                .and_then(|i| input.get(i).copied())
                .unwrap_or(a);

            let value = f64::from(a) + (f64::from(b) - f64::from(a)) * frac;
            output.push(value.round() as i16);

            self.pos += step;
        }

        self.pos -= input.len() as f64;
        self.last = input.last().copied();
        output
    }
}
