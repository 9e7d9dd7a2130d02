// The step clock. The host calls `tick` with however much time went by; every
// full step interval fires one step across all tracks, in creation order.
//
// -- DEFINITIONS --
// "step": one 16th note on the master clock (0..16).
// "bar": which of the 4 bars of the condition meta-cycle we're in.
// "slide": a drum step that rings on until the next active step on its track.
// "synth step": melodic tracks run their own step index, advanced by
//               `rate_multiplier` steps per master step.

use rand::Rng;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, warn};

use super::lfo::apply_lfos;
use super::params::ParamKey;
use super::project::{EngineSnapshot, ProjectState, Step, Track, TrackKind};
use super::scale::{note_at, scale_notes};
use crate::audio_api::{TriggerParams, VoiceBackend, VoiceHandle};
use crate::shared::{BARS_PER_CYCLE, DRUM_STEPS, MAX_SLIDE_DECAY, step_duration_secs};

// One voice the scheduler got out of the backend
#[derive(Clone, Debug, PartialEq)]
pub struct Fired {
    pub track_id: String,
    pub handle: VoiceHandle,
}

// Everything one step of the master clock produced, with the position it fired at
#[derive(Clone, Debug, PartialEq)]
pub struct StepFired {
    pub step: u8,
    pub bar: u8,
    pub step_in_bar: u8,
    pub fired: Vec<Fired>,
}

pub struct Sequencer {
    accumulator: f64, // seconds since the last step fired
    time: f64,        // seconds of playback so far, what the LFOs run on
    rng: StdRng,
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new(rand::thread_rng().r#gen())
    }
}

// Next active step after `from`, wrapping at 16. Never `from` itself.
pub fn find_next_active_step(steps: &[Step], from: usize) -> Option<usize> {
    (1..DRUM_STEPS)
        .map(|i| (from + i) % DRUM_STEPS)
        .find(|&i| steps.get(i).is_some_and(|s| s.active))
}

// How long a slide from `from` to `to` rings, in seconds
pub fn slide_duration(tempo: f32, from: usize, to: usize) -> f32 {
    let distance = if to > from { to - from } else { DRUM_STEPS - from + to };
    (60.0 / tempo) * (distance as f32 / 4.0)
}

fn trigger_params(track: &Track, sound: EngineSnapshot, velocity: f32) -> TriggerParams {
    TriggerParams {
        track_id: track.id.clone(),
        engine: sound.engine,
        params: sound.params,
        fx: sound.fx,
        velocity,
    }
}

// What a drum track plays on `step`, or None if it stays quiet
pub fn drum_trigger(track: &Track, step: usize, bar: u8, tempo: f32) -> Option<TriggerParams> {
    let s = track.steps.get(step)?;
    if !s.active || !s.condition.fires_on(bar as u32) {
        return None;
    }
    let mut sound = track.effective_sound(step);
    if s.slide {
        if let Some(next) = find_next_active_step(&track.steps, step) {
            // no cross-fade between the two steps' params, the start step just rings longer
            let decay = slide_duration(tempo, step, next).min(MAX_SLIDE_DECAY);
            sound.params = sound.params.with(ParamKey::Decay, decay);
        }
    }
    Some(trigger_params(track, sound, s.velocity))
}

// Advance a melodic track by one master step. Returns what it plays, in order.
pub fn advance_synth(track: &mut Track, bar: u8, time: f64, rng: &mut impl Rng) -> Vec<TriggerParams> {
    let step_count = track.step_count.min(track.max_steps());
    if step_count == 0 {
        return Vec::new();
    }
    let mut out = Vec::new();
    track.synth_state.accumulator += track.rate_multiplier;
    while track.synth_state.accumulator >= 1.0 {
        track.synth_state.accumulator -= 1.0;
        let index = track.synth_state.step_index.map_or(0, |i| (i + 1) % step_count);
        track.synth_state.step_index = Some(index);
        if let Some(trigger) = synth_trigger(track, index, bar, time, rng) {
            track.synth_state.sounding = true;
            out.push(trigger);
        }
    }
    out
}

// Melodic steps use the live sound; locks and slides are drum-only
fn synth_trigger(track: &Track, index: usize, bar: u8, time: f64, rng: &mut impl Rng) -> Option<TriggerParams> {
    let s = track.steps.get(index)?;
    if !s.active || !s.condition.fires_on(bar as u32) {
        return None;
    }
    let settings = &track.synth;
    let notes = scale_notes(settings.root_note, settings.scale, settings.range_start, settings.range_end());
    let base = s.note_index.min(notes.len() as i32 - 1);
    let modulated = apply_lfos(&settings.lfos, track.engine, track.params, time, rng);
    let offset = settings.transpose.saturating_add(modulated.note_offset.round() as i32);
    let note = note_at(&notes, base.saturating_add(offset));

    let mut sound = track.live_snapshot();
    sound.params = modulated.params.with(ParamKey::Note, note as f32);
    Some(trigger_params(track, sound, s.velocity))
}

impl Sequencer {
    pub fn new(seed: u64) -> Self {
        Self { accumulator: 0.0, time: 0.0, rng: StdRng::seed_from_u64(seed) }
    }

    pub fn start(&mut self, state: &mut ProjectState) -> bool {
        if state.is_playing {
            return false;
        }
        self.accumulator = 0.0;
        state.is_playing = true;
        debug!(tempo = state.tempo, "sequencer started");
        true
    }

    pub fn stop(&mut self, state: &mut ProjectState) {
        self.accumulator = 0.0;
        state.current_step = None;
        state.is_playing = false;
    }

    pub fn reset(&mut self, state: &mut ProjectState) {
        let was_playing = state.is_playing;
        if was_playing {
            self.stop(state);
        }
        state.current_step = None;
        state.current_bar = 0;
        state.step_in_bar = 0;
        if was_playing {
            self.start(state);
        }
    }

    // Restart the interval at the new tempo, same as a stop + start
    pub fn set_tempo(&mut self, state: &mut ProjectState, tempo: f32) {
        state.set_tempo(tempo);
        if state.is_playing {
            self.stop(state);
            self.start(state);
        }
    }

    // Feed elapsed wall (or render) time. Returns one entry per step that fired.
    pub fn tick(
        &mut self,
        elapsed: f64,
        state: &mut ProjectState,
        backend: &mut dyn VoiceBackend,
    ) -> Vec<StepFired> {
        if !state.is_playing {
            return Vec::new();
        }
        self.accumulator += elapsed.max(0.0);
        let interval = step_duration_secs(state.tempo);
        let mut steps = Vec::new();
        while self.accumulator >= interval {
            self.accumulator -= interval;
            self.time += interval;
            steps.push(self.step(state, backend));
        }
        steps
    }

    // One step of the master clock
    pub fn step(&mut self, state: &mut ProjectState, backend: &mut dyn VoiceBackend) -> StepFired {
        let step = state.current_step.map_or(0, |s| (s as usize + 1) % DRUM_STEPS);
        state.current_step = Some(step as u8);
        state.step_in_bar += 1;
        if state.step_in_bar as usize >= DRUM_STEPS {
            state.step_in_bar = 0;
            state.current_bar = (state.current_bar + 1) % BARS_PER_CYCLE;
        }
        let bar = state.current_bar;
        let tempo = state.tempo;

        for track in state.tracks.iter_mut().filter(|t| t.is_synth()) {
            track.synth_state.sounding = false;
        }

        let mut fired = Vec::new();
        for track in state.tracks.iter_mut().filter(|t| !t.mute) {
            let triggers = match track.kind {
                TrackKind::Drum => drum_trigger(track, step, bar, tempo).into_iter().collect(),
                TrackKind::Synth => advance_synth(track, bar, self.time, &mut self.rng),
            };
            for trigger in triggers {
                match backend.create_voice(&trigger) {
                    Some(handle) => fired.push(Fired { track_id: track.id.clone(), handle }),
                    // one track failing never holds up the rest
                    None => warn!(track = %track.id, step, "no voice for trigger"),
                }
            }
        }
        StepFired { step: step as u8, bar, step_in_bar: state.step_in_bar, fired }
    }
}
