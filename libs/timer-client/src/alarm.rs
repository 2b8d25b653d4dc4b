//! Timer alarm tone
//!
//! Three short 880 Hz sine beeps, 600 ms apart. Each beep fades in to a
//! gain of 0.3 over 100 ms and back to silence at 500 ms.

use std::f32::consts::TAU;

pub const FREQUENCY_HZ: f32 = 880.0;
pub const BEEP_OFFSETS_MS: [u32; 3] = [0, 600, 1200];
pub const BEEP_DURATION_MS: u32 = 500;
pub const PEAK_GAIN: f32 = 0.3;
pub const ATTACK_MS: u32 = 100;

/// Plays the alarm when a timer finishes
pub trait AlarmSink {
    fn play(&mut self, timer_id: &str);

    /// Silence the alarm of `timer_id`; sinks that play once can ignore it
    fn stop(&mut self, _timer_id: &str) {}
}

/// Alarm that makes no sound
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentAlarm;

impl AlarmSink for SilentAlarm {
    fn play(&mut self, _timer_id: &str) {}
}

/// Total length of the alarm in milliseconds
pub fn duration_ms() -> u32 {
    BEEP_OFFSETS_MS[BEEP_OFFSETS_MS.len() - 1] + BEEP_DURATION_MS
}

/// Gain of a single beep `t_ms` milliseconds after it starts
pub fn envelope(t_ms: f32) -> f32 {
    let attack = ATTACK_MS as f32;
    let length = BEEP_DURATION_MS as f32;

    if !(0.0..length).contains(&t_ms) {
        0.0
    } else if t_ms < attack {
        PEAK_GAIN * t_ms / attack
    } else {
        PEAK_GAIN * (length - t_ms) / (length - attack)
    }
}

/// Render the whole alarm as mono PCM samples at `sample_rate`
pub fn render(sample_rate: u32) -> Vec<f32> {
    let total = (u64::from(duration_ms()) * u64::from(sample_rate) / 1000) as usize;
    let rate = sample_rate as f32;

    (0..total)
        .map(|i| {
            let t_ms = i as f32 * 1000.0 / rate;
            BEEP_OFFSETS_MS
                .iter()
                .map(|&offset| t_ms - offset as f32)
                .filter(|local| (0.0..BEEP_DURATION_MS as f32).contains(local))
                .map(|local| envelope(local) * (TAU * FREQUENCY_HZ * local / 1000.0).sin())
                .sum()
        })
        .collect()
}
