// The middle layer: owns the project, the pattern bank and the sequencer, and
// is the only thing the outside world (binary, UI, tests) talks to.
//
// Every write goes through here and is clamped on the way in. Anything that
// needs to make sound takes the `VoiceBackend` it should use.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::audio_api::{TriggerParams, VoiceBackend, VoiceHandle, VoiceTickets};
use crate::pipeline::condition::StepCondition;
use crate::pipeline::groove::{self, Groove};
use crate::pipeline::lfo::Lfo;
use crate::pipeline::params::{EngineKind, FxKey, FxParams, ParamKey};
use crate::pipeline::pattern_bank::{Pattern, PatternBank};
use crate::pipeline::project::{ProjectState, Track, clamp_note_index};
use crate::pipeline::scale::Scale;
use crate::pipeline::sequencer::{Sequencer, StepFired};
use crate::pipeline::snapshot::{self, ImportError};
use crate::shared::{DEFAULT_VELOCITY, NUM_PATTERNS, TickView};

const RANDOM_STEP_CHANCE: f64 = 0.4;
const MANUAL_TRIGGER_VELOCITY: f32 = DEFAULT_VELOCITY;

type RenderCallback = Box<dyn FnMut(&TickView)>;

pub struct Middle {
    state: ProjectState,
    bank: PatternBank,
    sequencer: Sequencer,
    tickets: VoiceTickets,
    rng: StdRng,
    render: Option<RenderCallback>,
}

impl Default for Middle {
    fn default() -> Self {
        Self::with_state(ProjectState::default(), PatternBank::new())
    }
}

impl Middle {
    pub fn with_state(state: ProjectState, bank: PatternBank) -> Self {
        Self::with_seed(state, bank, rand::thread_rng().r#gen())
    }

    // Deterministic randomness (morph targets, randomize, LFO noise) for tests and bounces
    pub fn with_seed(state: ProjectState, bank: PatternBank, seed: u64) -> Self {
        Self {
            state,
            bank,
            sequencer: Sequencer::new(seed.wrapping_add(1)),
            tickets: VoiceTickets::default(),
            rng: StdRng::seed_from_u64(seed),
            render: None,
        }
    }

    pub fn state(&self) -> &ProjectState {
        &self.state
    }

    pub fn bank(&self) -> &PatternBank {
        &self.bank
    }

    pub fn track(&self, id: &str) -> Option<&Track> {
        self.state.track(id)
    }

    pub fn selected_track(&self) -> Option<&Track> {
        self.state.track(&self.state.selected_track)
    }

    pub fn outstanding_voices(&self) -> usize {
        self.tickets.len()
    }

    fn with_track<R>(&mut self, id: &str, f: impl FnOnce(&mut Track) -> R) -> Option<R> {
        self.state.track_mut(id).map(f)
    }

    // -- render callback --

    pub fn on_tick(&mut self, callback: impl FnMut(&TickView) + 'static) {
        self.render = Some(Box::new(callback));
    }

    // `step` carries the position it fired at; None reports the transport as it is now
    fn notify(&mut self, step: Option<&StepFired>) {
        let Some(render) = self.render.as_mut() else { return };
        let (playing_step, bar, step_in_bar) = match step {
            Some(s) => (Some(s.step), s.bar, s.step_in_bar),
            None => (self.state.current_step, self.state.current_bar, self.state.step_in_bar),
        };
        let view = TickView {
            playing: self.state.is_playing,
            playing_step,
            bar,
            step_in_bar,
            tempo: self.state.tempo,
            current_pattern: self.state.current_pattern,
            fired: step.map(|s| s.fired.iter().map(|f| f.track_id.clone()).collect()).unwrap_or_default(),
        };
        render(&view);
    }

    // -- transport --

    pub fn start(&mut self) -> bool {
        self.sequencer.start(&mut self.state)
    }

    pub fn stop(&mut self) {
        self.sequencer.stop(&mut self.state);
        self.notify(None);
    }

    pub fn reset(&mut self) {
        self.sequencer.reset(&mut self.state);
        self.notify(None);
    }

    pub fn toggle_play(&mut self) -> bool {
        if self.state.is_playing {
            self.stop();
        } else {
            self.start();
        }
        self.state.is_playing
    }

    pub fn set_tempo(&mut self, tempo: f32) -> f32 {
        let was_playing = self.state.is_playing;
        self.sequencer.set_tempo(&mut self.state, tempo);
        if was_playing {
            // the restart passes through a stop, which the view hears about
            self.notify(None);
        }
        self.state.tempo
    }

    // Drive the clock. Returns how many steps fired.
    pub fn tick(&mut self, elapsed: f64, backend: &mut dyn VoiceBackend) -> usize {
        let steps = self.sequencer.tick(elapsed, &mut self.state, backend);
        for step in &steps {
            for f in &step.fired {
                self.tickets.issue(f.handle);
            }
            self.notify(Some(step));
        }
        self.tickets.advance(elapsed, backend);
        steps.len()
    }

    // Play a track's live sound right now, outside the grid
    pub fn trigger_track(&mut self, id: &str, backend: &mut dyn VoiceBackend) -> Option<VoiceHandle> {
        let track = self.state.track(id)?;
        let params = TriggerParams {
            track_id: track.id.clone(),
            engine: track.engine,
            params: track.params,
            fx: track.fx,
            velocity: MANUAL_TRIGGER_VELOCITY,
        };
        let handle = backend.create_voice(&params)?;
        self.tickets.issue(handle);
        Some(handle)
    }

    // -- selection --

    pub fn select_track(&mut self, id: &str) -> bool {
        if self.state.track(id).is_none() {
            return false;
        }
        self.state.selected_track = id.to_string();
        true
    }

    // Returns true if the slot held a pattern and it was recalled
    pub fn select_pattern(&mut self, index: usize) -> bool {
        if index >= NUM_PATTERNS {
            return false;
        }
        self.state.current_pattern = index as u8;
        self.bank.load(index, &mut self.state)
    }

    // -- sound --

    pub fn set_engine(&mut self, id: &str, engine: EngineKind) -> bool {
        self.with_track(id, |t| t.set_engine(engine)).is_some()
    }

    pub fn set_param(&mut self, id: &str, key: ParamKey, value: f32) -> Option<f32> {
        self.with_track(id, |t| t.set_param(key, value))
    }

    pub fn set_fx(&mut self, id: &str, key: FxKey, value: f32) -> Option<f32> {
        self.with_track(id, |t| t.fx.set(key, value))
    }

    // Any master change rebuilds the master chain on the backend
    pub fn set_master_fx(&mut self, key: FxKey, value: f32, backend: &mut dyn VoiceBackend) -> f32 {
        let v = self.state.master_fx.set(key, value);
        backend.set_master_fx(&self.state.master_fx);
        v
    }

    pub fn replace_master_fx(&mut self, fx: FxParams, backend: &mut dyn VoiceBackend) {
        self.state.master_fx = fx.clamped();
        backend.set_master_fx(&self.state.master_fx);
    }

    pub fn toggle_mute(&mut self, id: &str) -> Option<bool> {
        self.with_track(id, |t| {
            t.mute = !t.mute;
            t.mute
        })
    }

    pub fn save_normal_state(&mut self, id: &str) -> bool {
        self.with_track(id, |t| t.normal_state = Some(t.live_snapshot())).is_some()
    }

    pub fn recall_normal_state(&mut self, id: &str) -> bool {
        self.with_track(id, |t| {
            let Some(normal) = t.normal_state.clone() else { return false };
            t.engine = normal.engine;
            t.params = normal.params;
            t.fx = normal.fx;
            t.morph_target = None;
            t.morph_amount = 0;
            true
        })
        .unwrap_or(false)
    }

    // -- grid --

    pub fn toggle_step(&mut self, id: &str, step: usize) -> Option<bool> {
        self.with_track(id, |t| {
            let s = t.steps.get_mut(step)?;
            s.active = !s.active;
            Some(s.active)
        })
        .flatten()
    }

    // Setting a velocity on an empty step turns it on, like dragging it up
    pub fn set_velocity(&mut self, id: &str, step: usize, velocity: f32) -> Option<f32> {
        self.with_track(id, |t| {
            let s = t.steps.get_mut(step)?;
            s.velocity = if velocity.is_nan() { DEFAULT_VELOCITY } else { velocity.clamp(0.0, 1.0) };
            s.active = true;
            Some(s.velocity)
        })
        .flatten()
    }

    pub fn set_condition(&mut self, id: &str, step: usize, condition: StepCondition) -> bool {
        self.with_track(id, |t| t.steps.get_mut(step).map(|s| s.condition = condition))
            .flatten()
            .is_some()
    }

    // Lock captures the live sound; toggling again clears it
    pub fn toggle_lock(&mut self, id: &str, step: usize) -> Option<bool> {
        self.with_track(id, |t| {
            let snapshot = t.live_snapshot();
            let s = t.steps.get_mut(step)?;
            s.lock = match s.lock {
                Some(_) => None,
                None => Some(snapshot),
            };
            Some(s.lock.is_some())
        })
        .flatten()
    }

    pub fn toggle_slide(&mut self, id: &str, step: usize) -> Option<bool> {
        self.with_track(id, |t| {
            let s = t.steps.get_mut(step)?;
            s.slide = !s.slide;
            Some(s.slide)
        })
        .flatten()
    }

    pub fn clear_locks(&mut self, id: &str) -> bool {
        self.with_track(id, Track::clear_locks).is_some()
    }

    pub fn clear_track(&mut self, id: &str) -> bool {
        self.with_track(id, Track::clear_steps).is_some()
    }

    pub fn randomize_track(&mut self, id: &str) -> bool {
        let Some(track) = self.state.track_mut(id) else { return false };
        let count = track.step_count.min(track.max_steps());
        for step in track.steps.iter_mut().take(count) {
            step.active = self.rng.gen_bool(RANDOM_STEP_CHANCE);
            step.velocity = self.rng.gen_range(0.6..1.0);
        }
        true
    }

    // -- morph --

    pub fn generate_morph(&mut self, id: &str) -> bool {
        let Some(track) = self.state.track_mut(id) else { return false };
        track.generate_morph_target(&mut self.rng);
        true
    }

    pub fn set_morph_amount(&mut self, id: &str, amount: u8) -> bool {
        self.with_track(id, |t| t.set_morph_amount(amount)).is_some()
    }

    pub fn lock_morph(&mut self, id: &str) -> bool {
        self.with_track(id, Track::lock_morph).unwrap_or(false)
    }

    pub fn generate_global_morph(&mut self) {
        for track in &mut self.state.tracks {
            track.generate_morph_target(&mut self.rng);
        }
    }

    pub fn set_global_morph_amount(&mut self, amount: u8) {
        let amount = amount.min(crate::pipeline::morph::MAX_MORPH);
        self.state.global_morph_amount = amount;
        for track in &mut self.state.tracks {
            track.set_morph_amount(amount);
        }
    }

    // Returns how many tracks had something to lock
    pub fn lock_global_morph(&mut self) -> usize {
        let locked = self.state.tracks.iter_mut().map(Track::lock_morph).filter(|l| *l).count();
        self.state.global_morph_amount = 0;
        locked
    }

    // -- melodic tracks --

    fn with_synth<R>(&mut self, id: &str, f: impl FnOnce(&mut Track) -> R) -> Option<R> {
        self.state.track_mut(id).filter(|t| t.is_synth()).map(f)
    }

    pub fn set_step_count(&mut self, id: &str, count: usize) -> Option<usize> {
        self.with_synth(id, |t| {
            t.set_step_count(count);
            t.step_count
        })
    }

    pub fn set_rate_multiplier(&mut self, id: &str, rate: f32) -> Option<f32> {
        self.with_synth(id, |t| {
            t.set_rate_multiplier(rate);
            t.rate_multiplier
        })
    }

    pub fn set_root_note(&mut self, id: &str, root: i32) -> bool {
        self.with_synth(id, |t| t.synth.set_root_note(root)).is_some()
    }

    pub fn set_scale(&mut self, id: &str, scale: Scale) -> bool {
        self.with_synth(id, |t| t.synth.scale = scale).is_some()
    }

    pub fn set_range(&mut self, id: &str, start: i32, span: i32) -> bool {
        self.with_synth(id, |t| {
            t.synth.set_range_start(start);
            t.synth.set_range_span(span);
        })
        .is_some()
    }

    pub fn set_transpose(&mut self, id: &str, semis: i32) -> bool {
        self.with_synth(id, |t| t.synth.set_transpose(semis)).is_some()
    }

    pub fn set_note_index(&mut self, id: &str, step: usize, index: i32) -> bool {
        self.with_synth(id, |t| t.steps.get_mut(step).map(|s| s.note_index = clamp_note_index(index)))
            .flatten()
            .is_some()
    }

    pub fn set_lfo(&mut self, id: &str, slot: usize, lfo: Lfo) -> bool {
        self.with_synth(id, |t| t.synth.set_lfo(slot, lfo)).unwrap_or(false)
    }

    // -- pattern bank --

    pub fn save_pattern(&mut self, index: usize) -> bool {
        self.bank.save(index, &self.state)
    }

    pub fn load_pattern(&mut self, index: usize) -> bool {
        self.bank.load(index, &mut self.state)
    }

    pub fn clear_pattern(&mut self, index: usize) {
        self.bank.clear(index);
    }

    pub fn copy_pattern(&mut self, index: usize) {
        self.bank.copy(index);
    }

    pub fn paste_pattern(&mut self, index: usize) -> bool {
        self.bank.paste(index)
    }

    // -- import / export --

    pub fn export_pattern(&self, index: usize) -> Option<serde_json::Result<String>> {
        let pattern = self.bank.get(index)?;
        Some(serde_json::to_string_pretty(&snapshot::export_pattern(pattern)))
    }

    pub fn export_live_pattern(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&snapshot::export_pattern(&Pattern::capture(&self.state)))
    }

    // Failed imports leave everything as it was
    pub fn import_pattern(&mut self, index: usize, json: &str) -> Result<(), ImportError> {
        let pattern = snapshot::decode_pattern(json)?;
        self.bank.set(index, Some(pattern));
        debug!(index, "pattern imported");
        Ok(())
    }

    pub fn export_bank(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&snapshot::export_bank(&self.bank))
    }

    pub fn import_bank(&mut self, json: &str) -> Result<(), ImportError> {
        let slots = snapshot::decode_bank(json)?;
        self.bank.replace_all(slots);
        info!("pattern bank imported");
        Ok(())
    }

    pub fn export_state(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&snapshot::export_state(&self.state, None))
    }

    pub fn export_preset(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&snapshot::export_state(&self.state, Some(&self.bank)))
    }

    // Full state or preset. Tempo and master FX take effect immediately.
    pub fn import_state(&mut self, json: &str, backend: &mut dyn VoiceBackend) -> Result<(), ImportError> {
        let decoded = snapshot::decode_state(json)?;
        let tempo_before = self.state.tempo;
        snapshot::apply_state(decoded, &mut self.state, &mut self.bank);
        if self.state.tempo != tempo_before {
            let tempo = self.state.tempo;
            self.set_tempo(tempo);
        }
        backend.set_master_fx(&self.state.master_fx);
        info!(tempo = self.state.tempo, "state imported");
        Ok(())
    }

    // -- grooves --

    pub fn load_random_groove(&mut self, library: &[Groove]) -> bool {
        groove::apply_random(library, &mut self.state, &mut self.rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::audio_api::VoiceId;

    #[derive(Default)]
    struct Recorder {
        triggers: Vec<TriggerParams>,
        disposed: Vec<VoiceId>,
        master: Vec<FxParams>,
    }

    impl VoiceBackend for Recorder {
        fn create_voice(&mut self, params: &TriggerParams) -> Option<VoiceHandle> {
            self.triggers.push(params.clone());
            Some(VoiceHandle::new(VoiceId(self.triggers.len() as u64), params.duration()))
        }
        fn dispose(&mut self, handle: VoiceHandle) {
            self.disposed.push(handle.id);
        }
        fn set_master_fx(&mut self, fx: &FxParams) {
            self.master.push(*fx);
        }
    }

    fn middle() -> Middle {
        Middle::with_seed(ProjectState::default(), PatternBank::new(), 42)
    }

    #[test]
    fn melodic_setters_clamp() {
        let mut m = middle();
        assert!(m.set_range("bass", 120, 500));
        assert!(m.set_transpose("bass", -300));
        assert!(m.set_note_index("bass", 0, 9999));
        let wild = Lfo { depth: 4.0, rate: -1.0, ..Lfo::default() };
        assert!(m.set_lfo("bass", 2, wild));
        assert!(!m.set_lfo("bass", 3, wild));
        assert!(!m.set_transpose("kick", 2));

        let bass = m.track("bass").unwrap();
        assert_eq!((bass.synth.range_start, bass.synth.range_span), (120, 128));
        assert_eq!(bass.synth.range_end(), 127);
        assert_eq!(bass.synth.transpose, -48);
        assert_eq!(bass.steps[0].note_index, 127);
        assert_eq!((bass.synth.lfos[2].depth, bass.synth.lfos[2].rate), (1.0, 0.0));
    }

    #[test]
    fn render_callback_sees_every_step_and_stop() {
        let mut m = middle();
        let views = Rc::new(RefCell::new(Vec::new()));
        let sink = views.clone();
        m.on_tick(move |v| sink.borrow_mut().push(v.clone()));
        m.toggle_step("kick", 1);
        m.set_tempo(120.0);
        m.start();

        let mut rec = Recorder::default();
        assert_eq!(m.tick(0.25, &mut rec), 2);
        m.stop();

        let views = views.borrow();
        assert_eq!(views.len(), 3);
        assert_eq!(views[0].playing_step, Some(0));
        assert!(views[0].fired.is_empty());
        assert_eq!(views[1].fired, ["kick"]);
        assert_eq!(views[2].playing_step, None);
        assert!(!views[2].playing);
    }

    #[test]
    fn voices_are_disposed_after_their_cleanup_time() {
        let mut m = middle();
        let mut rec = Recorder::default();
        m.set_param("kick", ParamKey::Decay, 0.3);
        let handle = m.trigger_track("kick", &mut rec).unwrap();
        assert_eq!(rec.triggers[0].velocity, MANUAL_TRIGGER_VELOCITY);
        m.tick(0.4, &mut rec); // not playing, but the clock still runs for tickets
        assert!(rec.disposed.is_empty());
        m.tick(0.11, &mut rec);
        assert_eq!(rec.disposed, [handle.id]);
        assert_eq!(m.outstanding_voices(), 0);
    }

    #[test]
    fn writes_are_clamped() {
        let mut m = middle();
        assert_eq!(m.set_param("kick", ParamKey::Decay, 99.0), Some(1.5));
        assert_eq!(m.set_fx("kick", FxKey::Delay, -3.0), Some(0.0));
        assert_eq!(m.set_velocity("kick", 0, 4.0), Some(1.0));
        assert!(m.track("kick").unwrap().steps[0].active);
        assert_eq!(m.set_tempo(1000.0), 300.0);
        assert_eq!(m.set_param("nope", ParamKey::Decay, 0.5), None);
        assert_eq!(m.toggle_step("kick", 16), None);
        assert_eq!(m.set_step_count("kick", 8), None); // drum tracks have no step count
        assert_eq!(m.set_step_count("bass", 99), Some(32));
    }

    #[test]
    fn master_fx_change_reaches_backend() {
        let mut m = middle();
        let mut rec = Recorder::default();
        assert_eq!(m.set_master_fx(FxKey::Reverb, 2.0, &mut rec), 1.0);
        assert_eq!(rec.master.len(), 1);
        assert_eq!(rec.master[0].reverb, 1.0);
    }

    #[test]
    fn lock_captures_live_sound_and_toggles_off() {
        let mut m = middle();
        m.set_param("snare", ParamKey::Timbre, 0.9);
        assert_eq!(m.toggle_lock("snare", 4), Some(true));
        m.set_param("snare", ParamKey::Timbre, 0.1);
        let lock = m.track("snare").unwrap().steps[4].lock.clone().unwrap();
        assert!((lock.params.get(ParamKey::Timbre) - 0.9).abs() < 1e-6);
        assert_eq!(m.toggle_lock("snare", 4), Some(false));
        assert_eq!(m.toggle_slide("snare", 4), Some(true));
        assert!(m.clear_locks("snare"));
        assert!(!m.track("snare").unwrap().steps[4].slide);
    }

    #[test]
    fn randomize_stays_in_bounds() {
        let mut m = middle();
        assert!(m.randomize_track("hihat"));
        let track = m.track("hihat").unwrap();
        assert!(track.steps.iter().all(|s| (0.6..1.0).contains(&s.velocity)));
        assert!(m.clear_track("hihat"));
        assert!(m.track("hihat").unwrap().steps.iter().all(|s| !s.active && s.velocity == DEFAULT_VELOCITY));
    }

    #[test]
    fn normal_state_recall_drops_morph() {
        let mut m = middle();
        m.save_normal_state("tom");
        let saved = m.track("tom").unwrap().params;
        m.generate_morph("tom");
        m.set_morph_amount("tom", 70);
        assert_ne!(m.track("tom").unwrap().params, saved);
        assert!(m.recall_normal_state("tom"));
        let tom = m.track("tom").unwrap();
        assert_eq!(tom.params, saved);
        assert!(tom.morph_target.is_none());
        assert_eq!(tom.morph_amount, 0);
    }

    #[test]
    fn global_morph_applies_to_all_tracks() {
        let mut m = middle();
        m.generate_global_morph();
        m.set_global_morph_amount(150);
        assert_eq!(m.state().global_morph_amount, 100);
        assert!(m.state().tracks.iter().all(|t| t.morph_amount == 100));
        assert_eq!(m.lock_global_morph(), m.state().tracks.len());
        assert_eq!(m.state().global_morph_amount, 0);
        assert!(m.state().tracks.iter().all(|t| t.morph_target.is_none()));
    }

    #[test]
    fn selecting_a_filled_pattern_recalls_it() {
        let mut m = middle();
        m.toggle_step("kick", 0);
        assert!(m.save_pattern(3));
        m.clear_track("kick");
        assert!(!m.select_pattern(5));
        assert_eq!(m.state().current_pattern, 5);
        assert!(!m.track("kick").unwrap().steps[0].active);
        assert!(m.select_pattern(3));
        assert!(m.track("kick").unwrap().steps[0].active);
        assert!(!m.select_pattern(16));
    }

    #[test]
    fn failed_import_changes_nothing() {
        let mut m = middle();
        let mut rec = Recorder::default();
        m.toggle_step("kick", 0);
        let before = m.state().clone();
        assert!(m.import_state(r#"{"version":"9.9","tempo":90,"tracks":{}}"#, &mut rec).is_err());
        assert!(m.import_state("{ not json", &mut rec).is_err());
        assert!(m.import_pattern(0, r#"{"version":"1.0","pattern":{"kick":{"steps":[true]}}}"#).is_err());
        assert_eq!(m.state(), &before);
        assert!(!m.bank().has(0));
        assert!(rec.master.is_empty());
    }

    #[test]
    fn state_round_trips_through_json() {
        let mut m = middle();
        let mut rec = Recorder::default();
        m.toggle_step("bass", 5);
        m.set_note_index("bass", 5, 7);
        m.set_scale("bass", Scale::Dorian);
        m.set_tempo(97.0);
        m.set_master_fx(FxKey::Drive, 3.0, &mut rec);
        let json = m.export_state().unwrap();

        let mut other = Middle::with_seed(ProjectState::default(), PatternBank::new(), 1);
        other.import_state(&json, &mut rec).unwrap();
        let bass = other.track("bass").unwrap();
        assert_eq!(bass.synth.scale, Scale::Dorian);
        assert_eq!(bass.steps[5].note_index, 7);
        assert_eq!(other.state().tempo, 97.0);
        assert_eq!(rec.master.last().unwrap().drive, 3.0);
    }
}
