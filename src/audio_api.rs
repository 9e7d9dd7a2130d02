// What the sequencer side is allowed to say to whatever makes the sound.
//
// The sequencer only ever talks to a `VoiceBackend`. The live backend
// (`audio::AudioHandle`) forwards `AudioCommand`s to the audio thread; the
// offline engine implements the trait directly; tests record the calls.

pub use crate::audio::VoiceId;
use crate::audio::{ChainParts, PreparedVoice};
use crate::pipeline::params::{EngineKind, FxParams, ParamKey, SynthParams};

pub const MIN_VOICE_SECS: f32 = 0.02;
pub const MAX_VOICE_SECS: f32 = 2.0;
pub const STOP_MARGIN_SECS: f32 = 0.1; // voice output stops this long after its duration
pub const CLEANUP_MARGIN_SECS: f32 = 0.2; // and its nodes are released this long after

pub fn voice_duration(decay: f32) -> f32 {
    if decay.is_nan() {
        return MIN_VOICE_SECS;
    }
    decay.clamp(0.0, MAX_VOICE_SECS).max(MIN_VOICE_SECS)
}

#[derive(Clone, Debug, PartialEq)]
pub struct TriggerParams {
    pub track_id: String,
    pub engine: EngineKind,
    pub params: SynthParams, // already resolved: lock, slide, LFOs, note
    pub fx: FxParams,
    pub velocity: f32,
}

impl TriggerParams {
    pub fn duration(&self) -> f32 {
        voice_duration(self.params.get(ParamKey::Decay))
    }
}

// Lifetime ticket for one voice. There is no cancel: once created, a voice
// runs to its stop time and is disposed after the cleanup margin.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VoiceHandle {
    pub id: VoiceId,
    pub duration: f32,
}

impl VoiceHandle {
    pub fn new(id: VoiceId, duration: f32) -> Self {
        Self { id, duration }
    }

    pub fn stop_after(&self) -> f32 {
        self.duration + STOP_MARGIN_SECS
    }

    pub fn cleanup_after(&self) -> f32 {
        self.duration + CLEANUP_MARGIN_SECS
    }
}

// Payloads are built on the sending side; the audio thread only wires them in
pub enum AudioCommand {
    // The id is minted on the sequencer side so the handle can be returned
    // without waiting on the audio thread
    Trigger { id: VoiceId, voice: Box<PreparedVoice> },
    Dispose(VoiceId),
    // Tears down the master chain and wires this one before any later trigger is applied
    SetMasterChain(Box<ChainParts>),
}

pub trait VoiceBackend {
    // None when the backend is not ready or the voice could not be made
    fn create_voice(&mut self, params: &TriggerParams) -> Option<VoiceHandle>;
    fn dispose(&mut self, handle: VoiceHandle);
    fn set_master_fx(&mut self, fx: &FxParams);
}

// Outstanding tickets, disposed once their cleanup time has passed
#[derive(Debug, Default)]
pub struct VoiceTickets {
    now: f64,
    pending: Vec<(f64, VoiceHandle)>,
}

impl VoiceTickets {
    pub fn issue(&mut self, handle: VoiceHandle) {
        self.pending.push((self.now + handle.cleanup_after() as f64, handle));
    }

    // Advance the clock and dispose everything that has expired. Returns how many went.
    pub fn advance(&mut self, elapsed: f64, backend: &mut dyn VoiceBackend) -> usize {
        self.now += elapsed.max(0.0);
        let now = self.now;
        let mut disposed = 0;
        self.pending.retain(|(due, handle)| {
            if *due <= now {
                backend.dispose(*handle);
                disposed += 1;
                false
            } else {
                true
            }
        });
        disposed
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Disposals(Vec<VoiceId>);

    impl VoiceBackend for Disposals {
        fn create_voice(&mut self, _: &TriggerParams) -> Option<VoiceHandle> {
            None
        }
        fn dispose(&mut self, handle: VoiceHandle) {
            self.0.push(handle.id);
        }
        fn set_master_fx(&mut self, _: &FxParams) {}
    }

    #[test]
    fn duration_is_bounded() {
        assert_eq!(voice_duration(0.0), MIN_VOICE_SECS);
        assert_eq!(voice_duration(-1.0), MIN_VOICE_SECS);
        assert_eq!(voice_duration(0.5), 0.5);
        assert_eq!(voice_duration(9.0), MAX_VOICE_SECS);
        assert_eq!(voice_duration(f32::NAN), MIN_VOICE_SECS);
    }

    #[test]
    fn handle_margins() {
        let h = VoiceHandle::new(VoiceId(1), 0.5);
        assert!((h.stop_after() - 0.6).abs() < 1e-6);
        assert!((h.cleanup_after() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn tickets_dispose_after_cleanup_margin() {
        let mut backend = Disposals::default();
        let mut tickets = VoiceTickets::default();
        tickets.issue(VoiceHandle::new(VoiceId(1), 0.3));
        tickets.advance(0.2, &mut backend);
        tickets.issue(VoiceHandle::new(VoiceId(2), 0.3));

        assert_eq!(tickets.advance(0.25, &mut backend), 0);
        assert_eq!(tickets.advance(0.1, &mut backend), 1); // t = 0.55, first due at 0.5
        assert_eq!(backend.0, [VoiceId(1)]);
        assert_eq!(tickets.advance(0.2, &mut backend), 1); // t = 0.75, second due at 0.7
        assert!(tickets.is_empty());
    }
}
