// The engine owns the audio graph. Live, it sits on the audio thread and
// eats `AudioCommand`s between blocks; offline, it is driven directly
// through `VoiceBackend`. Voices and chains arrive prepared, so the audio
// thread only links nodes.
//
// Per voice: voice (with its envelope) -> FX chain -> velocity gain -> track bus
// Per track: track bus (1.0) -> master input -> master chain -> master gain -> out

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use super::chain::{ChainParts, MasterBus, prepare_chain, wire_chain};
use super::frame::StereoFrame;
use super::graph::{AudioGraph, NodeId, NodeKind};
use super::voice::SynthVoice;
use super::voice_id::{VoiceId, next_voice_id};
use crate::audio_api::{AudioCommand, TriggerParams, VoiceBackend, VoiceHandle};
use crate::pipeline::params::FxParams;

// A voice with its chain, built on the sending side
pub struct PreparedVoice {
    pub track_id: String,
    pub velocity: f32,
    pub duration: f32,
    voice: Box<SynthVoice>,
    chain: ChainParts,
}

impl std::fmt::Debug for PreparedVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedVoice")
            .field("track_id", &self.track_id)
            .field("duration", &self.duration)
            .field("stages", &self.chain.stage_count())
            .finish()
    }
}

pub fn prepare_voice(params: &TriggerParams, sample_rate: f32, rng: &mut impl Rng) -> PreparedVoice {
    let duration = params.duration();
    let voice = SynthVoice::new(params.engine, params.params, duration, sample_rate, rng.r#gen());
    PreparedVoice {
        track_id: params.track_id.clone(),
        velocity: params.velocity.clamp(0.0, 1.0),
        duration,
        voice: Box::new(voice),
        chain: prepare_chain(sample_rate, &params.fx, rng),
    }
}

struct LiveVoice {
    nodes: Vec<NodeId>,
    output: NodeId, // velocity gain, muted at the stop time
    stop_at: u64,   // in samples on the engine clock
    cleanup_at: u64,
    stopped: bool,
}

pub struct Engine {
    graph: AudioGraph,
    master: Option<MasterBus>, // None until initialize()
    track_buses: HashMap<String, NodeId>,
    voices: HashMap<VoiceId, LiveVoice>,
    clock: u64,
    rng: StdRng,
}

impl Engine {
    pub fn new(sample_rate: u32) -> Self {
        Self::with_seed(sample_rate, rand::thread_rng().r#gen())
    }

    pub fn with_seed(sample_rate: u32, seed: u64) -> Self {
        Self {
            graph: AudioGraph::new(sample_rate as f32),
            master: None,
            track_buses: HashMap::new(),
            voices: HashMap::new(),
            clock: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn initialize(&mut self, master_fx: &FxParams) {
        let parts = prepare_chain(self.graph.sample_rate(), master_fx, &mut self.rng);
        if self.master.is_some() {
            self.rebuild_master(parts);
            return;
        }
        self.master = Some(MasterBus::new(&mut self.graph, parts));
        debug!(nodes = self.graph.node_count(), "audio engine ready");
    }

    pub fn is_ready(&self) -> bool {
        self.master.is_some()
    }

    pub fn sample_rate(&self) -> f32 {
        self.graph.sample_rate()
    }

    pub fn handle_cmd(&mut self, cmd: AudioCommand) {
        match cmd {
            AudioCommand::Trigger { id, voice } => {
                self.trigger(id, *voice);
            }
            AudioCommand::Dispose(id) => self.release(id),
            AudioCommand::SetMasterChain(parts) => self.rebuild_master(*parts),
        }
    }

    fn rebuild_master(&mut self, parts: ChainParts) {
        let Some(master) = self.master.as_mut() else {
            warn!("master fx change before the engine is ready; ignored");
            return;
        };
        master.rebuild(&mut self.graph, parts);
        // every track keeps feeding the one master input
        let input = master.input();
        for bus in self.track_buses.values() {
            self.graph.connect(*bus, input);
        }
        debug!(nodes = self.graph.node_count(), connections = self.graph.connection_count(), "master chain rebuilt");
    }

    fn track_bus(&mut self, track_id: &str, master_input: NodeId) -> NodeId {
        if let Some(bus) = self.track_buses.get(track_id) {
            return *bus;
        }
        let bus = self.graph.add(NodeKind::Gain(1.0));
        self.graph.connect(bus, master_input);
        self.track_buses.insert(track_id.to_string(), bus);
        bus
    }

    fn trigger(&mut self, id: VoiceId, prepared: PreparedVoice) -> bool {
        let Some(master_input) = self.master.as_ref().map(|m| m.input()) else {
            warn!(track = %prepared.track_id, "trigger before the audio engine is ready; dropped");
            return false;
        };
        let sr = self.graph.sample_rate();
        let PreparedVoice { track_id, velocity, duration, voice, chain } = prepared;

        let bus = self.track_bus(&track_id, master_input);
        let source = self.graph.add(NodeKind::Voice(voice));
        let chain = wire_chain(&mut self.graph, source, chain);
        let velocity = self.graph.add(NodeKind::Gain(velocity));
        self.graph.connect(chain.output, velocity);
        self.graph.connect(velocity, bus);

        let mut nodes = chain.nodes;
        nodes.push(source);
        nodes.push(velocity);
        let ticket = VoiceHandle::new(id, duration);
        let at = |secs: f32| self.clock + (secs * sr).ceil() as u64;
        let (stop_at, cleanup_at) = (at(ticket.stop_after()), at(ticket.cleanup_after()));
        self.voices.insert(id, LiveVoice { nodes, output: velocity, stop_at, cleanup_at, stopped: false });
        true
    }

    fn release(&mut self, id: VoiceId) {
        let Some(voice) = self.voices.remove(&id) else {
            return; // already reaped
        };
        for node in voice.nodes {
            self.graph.remove(node);
        }
    }

    // Voices past their stop time go quiet (tails included); past cleanup they are removed
    fn reap_expired(&mut self) {
        let now = self.clock;
        for voice in self.voices.values_mut().filter(|v| !v.stopped && v.stop_at <= now) {
            self.graph.set_gain(voice.output, 0.0);
            voice.stopped = true;
        }
        let expired: Vec<VoiceId> =
            self.voices.iter().filter(|(_, v)| v.cleanup_at <= now).map(|(id, _)| *id).collect();
        for id in expired {
            self.release(id);
        }
    }

    pub fn next_frame(&mut self) -> StereoFrame {
        let frame = self.graph.next_frame();
        self.clock += 1;
        frame
    }

    pub fn render_block(&mut self, frames: &mut [StereoFrame]) {
        for frame in frames.iter_mut() {
            *frame = self.next_frame();
        }
        self.reap_expired();
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn connection_count(&self) -> usize {
        self.graph.connection_count()
    }
}

// Offline use: the engine is its own backend
impl VoiceBackend for Engine {
    fn create_voice(&mut self, params: &TriggerParams) -> Option<VoiceHandle> {
        if !self.is_ready() {
            warn!(track = %params.track_id, "trigger before the audio engine is ready; dropped");
            return None;
        }
        let id = next_voice_id();
        let prepared = prepare_voice(params, self.graph.sample_rate(), &mut self.rng);
        self.trigger(id, prepared).then(|| VoiceHandle::new(id, params.duration()))
    }

    fn dispose(&mut self, handle: VoiceHandle) {
        self.release(handle.id);
    }

    fn set_master_fx(&mut self, fx: &FxParams) {
        let parts = prepare_chain(self.graph.sample_rate(), fx, &mut self.rng);
        self.rebuild_master(parts);
    }
}
