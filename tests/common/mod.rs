// Shared helpers for the integration tests
#![allow(dead_code)]

use stepper::audio::VoiceId;
use stepper::pipeline::params::FxParams;
use stepper::pipeline::project::ProjectState;
use stepper::{TriggerParams, VoiceBackend, VoiceHandle};

// Backend that makes no sound, just writes down what it was asked for
#[derive(Default)]
pub struct Recorder {
    pub triggers: Vec<TriggerParams>,
    pub disposed: Vec<VoiceHandle>,
    pub master_fx: Vec<FxParams>,
    next_id: u64,
}

impl Recorder {
    pub fn track_ids(&self) -> Vec<&str> {
        self.triggers.iter().map(|t| t.track_id.as_str()).collect()
    }
}

impl VoiceBackend for Recorder {
    fn create_voice(&mut self, params: &TriggerParams) -> Option<VoiceHandle> {
        self.next_id += 1;
        self.triggers.push(params.clone());
        Some(VoiceHandle::new(VoiceId(self.next_id), params.duration()))
    }

    fn dispose(&mut self, handle: VoiceHandle) {
        self.disposed.push(handle);
    }

    fn set_master_fx(&mut self, fx: &FxParams) {
        self.master_fx.push(*fx);
    }
}

// Default project with every step switched off
pub fn silent_project() -> ProjectState {
    let mut state = ProjectState::default();
    for track in &mut state.tracks {
        for step in &mut track.steps {
            step.active = false;
        }
    }
    state
}
