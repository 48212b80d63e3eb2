// Sample conversion from device-native layouts to the session format.
//
// Capture devices rarely run at 16kHz mono, so captured samples are
// downmixed and resampled before they are blocked and encoded.

/// Convert interleaved samples to mono by averaging channels
pub fn to_mono(samples: &[i16], channels: u16) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }

    samples
        .chunks_exact(channels as usize)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Streaming sample-rate converter for mono audio.
///
/// Linear interpolation at any ratio. When downsampling, a one-pole
/// low-pass below the target Nyquist rate runs in front of the
/// interpolator. Position and filter state carry over between calls, so
/// callback buffers can be fed as they arrive.
pub struct Resampler {
    /// Input samples per output sample
    step: f64,
    /// Next output position; index 0 is `last` when it is set
    position: f64,
    last: Option<f32>,
    lowpass: Option<LowPass>,
    passthrough: bool,
}

impl Resampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        let passthrough = from_rate == to_rate || from_rate == 0 || to_rate == 0;
        let lowpass = (!passthrough && to_rate < from_rate)
            .then(|| LowPass::new(to_rate as f64 * 0.45, from_rate));

        Self {
            step: if passthrough { 1.0 } else { from_rate as f64 / to_rate as f64 },
            position: 0.0,
            last: None,
            lowpass,
            passthrough,
        }
    }

    /// Convert the next input buffer. Output for the tail of `input` is
    /// produced once the following buffer arrives.
    pub fn process(&mut self, input: &[i16]) -> Vec<i16> {
        if self.passthrough {
            return input.to_vec();
        }

        let mut buf = Vec::with_capacity(input.len() + 1);
        buf.extend(self.last);
        for &sample in input {
            let x = sample as f32;
            buf.push(match &mut self.lowpass {
                Some(lowpass) => lowpass.filter(x),
                None => x,
            });
        }

        if buf.len() < 2 {
            self.last = buf.last().copied();
            return Vec::new();
        }

        let end = (buf.len() - 1) as f64;
        let mut out = Vec::with_capacity((end / self.step) as usize + 1);
        while self.position < end {
            let index = self.position as usize;
            let frac = (self.position - index as f64) as f32;
            out.push(to_i16(buf[index] + (buf[index + 1] - buf[index]) * frac));
            self.position += self.step;
        }

        self.position -= end;
        self.last = Some(buf[buf.len() - 1]);
        out
    }
}

/// One-pole low-pass filter
struct LowPass {
    alpha: f32,
    state: Option<f32>,
}

impl LowPass {
    fn new(cutoff_hz: f64, sample_rate: u32) -> Self {
        let alpha = 1.0 - (-2.0 * std::f64::consts::PI * cutoff_hz / sample_rate as f64).exp();
        Self {
            alpha: alpha as f32,
            state: None,
        }
    }

    fn filter(&mut self, x: f32) -> f32 {
        // Starts from the first sample so a steady signal passes unchanged
        let y = match self.state {
            Some(prev) => prev + self.alpha * (x - prev),
            None => x,
        };
        self.state = Some(y);
        y
    }
}

fn to_i16(sample: f32) -> i16 {
    sample.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Resample a complete mono buffer to `to_rate`.
///
/// The output holds `ceil(len * to_rate / from_rate)` samples; positions
/// past the last input sample repeat it.
pub fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    let mut resampler = Resampler::new(from_rate, to_rate);
    if resampler.passthrough {
        return samples.to_vec();
    }

    let expected = (samples.len() as u64 * to_rate as u64 + from_rate as u64 - 1) / from_rate as u64;
    let mut out = resampler.process(samples);
    if let Some(tail) = resampler.last {
        out.resize(expected as usize, to_i16(tail));
    }
    out
}

/// Downmix then resample into the target rate
pub fn to_mono_at(samples: &[i16], channels: u16, from_rate: u32, to_rate: u32) -> Vec<i16> {
    let mono = to_mono(samples, channels);
    resample(&mono, from_rate, to_rate)
}
