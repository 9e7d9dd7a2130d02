// The track/pattern data model that middle.rs finagles and the sequencer reads.
//
// -- DEFINITIONS --
// "track": one voice lane (a drum sound or a melodic synth), with its own grid of steps.
// "step": one slot on that grid, plus everything that can be attached to it
//         (velocity, bar condition, parameter lock, slide).
// "pattern": the step data of every track at once; this is what the bank stores.

use super::condition::StepCondition;
use super::lfo::Lfo;
use super::params::{EngineKind, FxParams, ParamKey, SynthParams};
use super::scale::Scale;
use crate::shared::{
    DEFAULT_TEMPO, DEFAULT_VELOCITY, DRUM_STEPS, MAX_MIDI_NOTE, MAX_SYNTH_STEPS, MAX_TRANSPOSE,
    NUM_LFOS, SEQUENCER_RATES, clamp_tempo,
};

// A full sound: what a lock overrides, and what the normal state remembers
#[derive(Clone, Debug, PartialEq)]
pub struct EngineSnapshot {
    pub engine: EngineKind,
    pub params: SynthParams,
    pub fx: FxParams,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    pub active: bool,
    pub velocity: f32, // 0..1
    pub condition: StepCondition,
    pub lock: Option<EngineSnapshot>, // p-lock: replaces engine/params/fx for this step only
    pub slide: bool,
    pub note_index: i32, // scale degree, melodic tracks only
}

impl Default for Step {
    fn default() -> Self {
        Self {
            active: false,
            velocity: DEFAULT_VELOCITY,
            condition: StepCondition::ALWAYS,
            lock: None,
            slide: false,
            note_index: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackKind {
    Drum,  // fixed 16-step grid on the master clock
    Synth, // own step count and rate, scale-quantized notes
}

#[derive(Clone, Debug, PartialEq)]
pub struct SynthSettings {
    pub root_note: i32,
    pub scale: Scale,
    pub range_start: i32,
    pub range_span: i32,
    pub transpose: i32,
    pub lfos: [Lfo; NUM_LFOS],
}

impl Default for SynthSettings {
    fn default() -> Self {
        Self {
            root_note: 60,
            scale: Scale::Ionian,
            range_start: 48,
            range_span: 24,
            transpose: 0,
            lfos: [Lfo::default(); NUM_LFOS],
        }
    }
}

// Every write goes through these, whether it comes from the UI or an import
impl SynthSettings {
    pub fn range_end(&self) -> i32 {
        self.range_start.saturating_add(self.range_span - 1).min(MAX_MIDI_NOTE)
    }

    pub fn set_root_note(&mut self, root: i32) {
        self.root_note = root.clamp(0, MAX_MIDI_NOTE);
    }

    pub fn set_range_start(&mut self, start: i32) {
        self.range_start = start.clamp(0, MAX_MIDI_NOTE);
    }

    pub fn set_range_span(&mut self, span: i32) {
        self.range_span = span.clamp(1, MAX_MIDI_NOTE + 1);
    }

    pub fn set_transpose(&mut self, semis: i32) {
        self.transpose = semis.clamp(-MAX_TRANSPOSE, MAX_TRANSPOSE);
    }

    pub fn set_lfo(&mut self, slot: usize, lfo: Lfo) -> bool {
        let Some(dst) = self.lfos.get_mut(slot) else { return false };
        *dst = lfo.clamped();
        true
    }
}

pub fn clamp_note_index(index: i32) -> i32 {
    index.clamp(0, MAX_MIDI_NOTE)
}

// Runtime only; never saved, never banked
#[derive(Clone, Debug, PartialEq)]
pub struct SynthState {
    pub accumulator: f32,
    pub step_index: Option<usize>, // None until the first advance
    pub sounding: bool,            // fired during the current master tick
}

impl Default for SynthState {
    fn default() -> Self {
        Self { accumulator: 0.0, step_index: None, sounding: false }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MorphTarget {
    pub origin: SynthParams, // params at the moment the target was generated
    pub target: SynthParams,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub kind: TrackKind,
    pub mute: bool,
    pub engine: EngineKind,
    pub params: SynthParams,
    pub fx: FxParams,
    pub normal_state: Option<EngineSnapshot>,
    pub morph_amount: u8, // 0..=100
    pub morph_target: Option<MorphTarget>,
    pub steps: Vec<Step>, // len == max_steps, always
    pub step_count: usize,
    pub rate_multiplier: f32,
    pub synth: SynthSettings,
    pub synth_state: SynthState,
}

impl Track {
    pub fn drum(id: &str, name: &str, engine: EngineKind) -> Self {
        Self::build(id, name, engine, TrackKind::Drum, DRUM_STEPS, DRUM_STEPS)
    }

    pub fn synth(id: &str, name: &str, engine: EngineKind, max_steps: usize, step_count: usize) -> Self {
        let max_steps = max_steps.clamp(1, MAX_SYNTH_STEPS);
        Self::build(id, name, engine, TrackKind::Synth, max_steps, step_count.clamp(1, max_steps))
    }

    fn build(
        id: &str,
        name: &str,
        engine: EngineKind,
        kind: TrackKind,
        max_steps: usize,
        step_count: usize,
    ) -> Self {
        let params = engine.default_params();
        let fx = FxParams::default();
        Self {
            id: id.to_string(),
            name: name.to_string(),
            kind,
            mute: false,
            engine,
            params,
            fx,
            normal_state: Some(EngineSnapshot { engine, params, fx }),
            morph_amount: 0,
            morph_target: None,
            steps: vec![Step::default(); max_steps],
            step_count,
            rate_multiplier: 1.0,
            synth: SynthSettings::default(),
            synth_state: SynthState::default(),
        }
    }

    pub fn is_synth(&self) -> bool {
        self.kind == TrackKind::Synth
    }

    pub fn max_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn live_snapshot(&self) -> EngineSnapshot {
        EngineSnapshot { engine: self.engine, params: self.params, fx: self.fx }
    }

    // Lock wins over live values, for this step only
    pub fn effective_sound(&self, step: usize) -> EngineSnapshot {
        match self.steps.get(step).and_then(|s| s.lock.as_ref()) {
            Some(lock) => lock.clone(),
            None => self.live_snapshot(),
        }
    }

    pub fn set_param(&mut self, key: ParamKey, value: f32) -> f32 {
        self.params.set(self.engine, key, value)
    }

    // Switching engine resets params to that engine's defaults and drops any morph
    pub fn set_engine(&mut self, engine: EngineKind) {
        self.engine = engine;
        self.params = engine.default_params();
        self.morph_target = None;
        self.morph_amount = 0;
    }

    pub fn set_step_count(&mut self, count: usize) {
        self.step_count = match self.kind {
            TrackKind::Drum => self.max_steps(),
            TrackKind::Synth => count.clamp(1, self.max_steps()),
        };
        if let Some(idx) = self.synth_state.step_index {
            if idx >= self.step_count {
                self.synth_state.step_index = None;
            }
        }
    }

    // Snaps to the nearest offered rate; zero, negative and NaN are ignored
    pub fn set_rate_multiplier(&mut self, rate: f32) {
        if !(rate.is_finite() && rate > 0.0) {
            return;
        }
        let nearest = SEQUENCER_RATES
            .iter()
            .copied()
            .min_by(|a, b| (a.log2() - rate.log2()).abs().total_cmp(&(b.log2() - rate.log2()).abs()));
        if let Some(r) = nearest {
            self.rate_multiplier = r;
        }
    }

    pub fn clear_steps(&mut self) {
        for step in &mut self.steps {
            step.active = false;
            step.velocity = DEFAULT_VELOCITY;
        }
    }

    pub fn clear_locks(&mut self) {
        for step in &mut self.steps {
            step.lock = None;
            step.slide = false;
        }
    }

}

// The application state: tracks plus global sequencer fields
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectState {
    pub tracks: Vec<Track>, // creation order is scheduling order
    pub tempo: f32,
    pub is_playing: bool,
    pub current_step: Option<u8>, // None when stopped
    pub current_bar: u8,
    pub step_in_bar: u8,
    pub master_fx: FxParams,
    pub selected_track: String,
    pub current_pattern: u8,
    pub global_morph_amount: u8,
}

impl Default for ProjectState {
    fn default() -> Self {
        let tracks = vec![
            Track::drum("kick", "KICK", EngineKind::Kick),
            Track::drum("snare", "SNARE", EngineKind::Snare),
            Track::drum("hihat", "HI-HAT", EngineKind::HiHat),
            Track::drum("tom", "TOM", EngineKind::Modal),
            Track::drum("perc", "PERC", EngineKind::Fm),
            Track::drum("cymbal", "CYMBAL", EngineKind::Noise),
            Track::synth("bass", "BASS", EngineKind::VirtualAnalog, MAX_SYNTH_STEPS, 16),
            Track::synth("lead", "LEAD", EngineKind::VirtualAnalog, MAX_SYNTH_STEPS, 16),
        ];
        Self::with_tracks(tracks)
    }
}

impl ProjectState {
    pub fn with_tracks(tracks: Vec<Track>) -> Self {
        let selected_track = tracks.first().map(|t| t.id.clone()).unwrap_or_default();
        Self {
            tracks,
            tempo: DEFAULT_TEMPO,
            is_playing: false,
            current_step: None,
            current_bar: 0,
            step_in_bar: 0,
            master_fx: FxParams::default(),
            selected_track,
            current_pattern: 0,
            global_morph_amount: 0,
        }
    }

    pub fn track(&self, id: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn track_mut(&mut self, id: &str) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.id == id)
    }

    pub fn set_tempo(&mut self, tempo: f32) {
        self.tempo = clamp_tempo(tempo);
    }
}
