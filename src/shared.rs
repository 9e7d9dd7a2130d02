// Constants and the small view types handed across the core/UI boundary.
//
// The idea of the rendering process:
//   - Only the middle layer owns sequencer and parameter state; whatever sits
//     on top of it (a terminal, a web view, a test) just reads a `TickView`.
//      - `Middle::on_tick` registers one render callback. It is invoked after
//        every sequencer step and after stop/reset, with a fresh `TickView`.
//      - Draw `playing_step` as the playhead, `bar` as "bar/4", and use
//        `fired` to flash track lanes. None of this feeds back into timing.
//   - Everything else (steps, locks, params) is read through the accessors on
//     `Middle`, never by holding on to references between ticks.

pub const NUM_PATTERNS: usize = 16;
pub const DRUM_STEPS: usize = 16;
pub const MAX_SYNTH_STEPS: usize = 32;
pub const BARS_PER_CYCLE: u8 = 4; // the meta-cycle step conditions are evaluated against
pub const NUM_LFOS: usize = 3;

pub const MIN_TEMPO: f32 = 40.0;
pub const MAX_TEMPO: f32 = 300.0;
pub const DEFAULT_TEMPO: f32 = 128.0;
pub const DEFAULT_VELOCITY: f32 = 0.8;

// Slides extend the decay of the start step up to this many seconds
pub const MAX_SLIDE_DECAY: f32 = 2.0;

// Melodic bounds: MIDI notes, transpose in semitones
pub const MAX_MIDI_NOTE: i32 = 127;
pub const MAX_TRANSPOSE: i32 = 48;

// Rate multipliers offered for melodic tracks
pub const SEQUENCER_RATES: [f32; 5] = [0.25, 0.5, 1.0, 2.0, 4.0];

// 16th notes: four steps per beat
pub fn step_duration_secs(tempo: f32) -> f64 {
    60.0 / tempo as f64 / 4.0
}

pub fn clamp_tempo(tempo: f32) -> f32 {
    if tempo.is_nan() {
        return DEFAULT_TEMPO;
    }
    tempo.clamp(MIN_TEMPO, MAX_TEMPO)
}

// What the render callback gets to see after each step
#[derive(Clone, Debug, PartialEq)]
pub struct TickView {
    pub playing: bool,
    pub playing_step: Option<u8>, // None when stopped
    pub bar: u8,                  // 0..BARS_PER_CYCLE
    pub step_in_bar: u8,
    pub tempo: f32,
    pub current_pattern: u8,
    pub fired: Vec<String>, // ids of tracks that produced a voice this step
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_duration_is_a_sixteenth() {
        assert!((step_duration_secs(120.0) - 0.125).abs() < 1e-12);
        assert!((step_duration_secs(60.0) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn tempo_is_clamped() {
        assert_eq!(clamp_tempo(10.0), MIN_TEMPO);
        assert_eq!(clamp_tempo(999.0), MAX_TEMPO);
        assert_eq!(clamp_tempo(f32::NAN), DEFAULT_TEMPO);
        assert_eq!(clamp_tempo(133.0), 133.0);
    }
}
