//! Test tone generator and input meter

use std::f64::consts::TAU;

use ah_driver::realtime::{BufferSwitchHandler, HandoffSender, SwitchBuffers, SwitchInfo};
use ah_driver::Direction;
use ah_ffi::SampleType;

/// Peak input level seen during one buffer switch
#[derive(Debug, Clone, Copy)]
pub struct Meter {
    pub sample_position: Option<u64>,
    pub peak: f32,
}

/// Writes a sine to every output and reports input peaks
pub struct Tone {
    phase: f64,
    step: f64,
    amplitude: f64,
    meters: HandoffSender<Meter>,
}

impl Tone {
    pub fn new(frequency: f64, sample_rate: f64, amplitude: f64, meters: HandoffSender<Meter>) -> Self {
        Self {
            phase: 0.0,
            step: TAU * frequency / sample_rate,
            amplitude: amplitude.clamp(0.0, 1.0),
            meters,
        }
    }
}

fn fill<T: bytemuck::Pod>(samples: &mut [T], mut phase: f64, step: f64, sample: impl Fn(f64) -> T) {
    for slot in samples {
        *slot = sample(phase.sin());
        phase += step;
    }
}

fn peak<T: bytemuck::Pod>(samples: &[T], level: impl Fn(T) -> f32) -> f32 {
    samples.iter().map(|&s| level(s).abs()).fold(0.0, f32::max)
}

impl BufferSwitchHandler for Tone {
    fn buffer_switch(&mut self, buffers: &mut SwitchBuffers<'_>, info: &SwitchInfo) {
        let start = self.phase;
        let (step, amplitude) = (self.step, self.amplitude);
        let mut input_peak = 0.0f32;

        for mut channel in buffers.iter_mut() {
            let sample_type = channel.sample_type();
            if channel.direction() == Direction::Input {
                let level = match sample_type {
                    SampleType::Int32Lsb => channel
                        .samples::<i32>()
                        .map(|s| peak(s, |v| v as f32 / i32::MAX as f32)),
                    SampleType::Int16Lsb => channel
                        .samples::<i16>()
                        .map(|s| peak(s, |v| f32::from(v) / f32::from(i16::MAX))),
                    SampleType::Float32Lsb => channel.samples::<f32>().map(|s| peak(s, |v| v)),
                    SampleType::Float64Lsb => {
                        channel.samples::<f64>().map(|s| peak(s, |v| v as f32))
                    }
                    _ => None,
                };
                input_peak = input_peak.max(level.unwrap_or(0.0));
                continue;
            }

            let written = match sample_type {
                SampleType::Int32Lsb => channel.samples_mut::<i32>().map(|s| {
                    fill(s, start, step, |v| (v * amplitude * f64::from(i32::MAX)) as i32)
                }),
                SampleType::Int16Lsb => channel.samples_mut::<i16>().map(|s| {
                    fill(s, start, step, |v| (v * amplitude * f64::from(i16::MAX)) as i16)
                }),
                SampleType::Float32Lsb => channel
                    .samples_mut::<f32>()
                    .map(|s| fill(s, start, step, |v| (v * amplitude) as f32)),
                SampleType::Float64Lsb => channel
                    .samples_mut::<f64>()
                    .map(|s| fill(s, start, step, |v| v * amplitude)),
                _ => None,
            };
            if written.is_none() {
                channel.silence();
            }
        }

        self.phase = (start + step * buffers.frames() as f64) % TAU;
        self.meters.push(Meter {
            sample_position: info.time.and_then(|t| t.sample_position),
            peak: input_peak,
        });
    }
}
