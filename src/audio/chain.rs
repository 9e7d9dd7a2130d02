// FX chains. The same builder is used per voice and for the master bus.
//
// Stage order is fixed: wasp filter -> drive -> distortion -> resonator ->
// delay -> reverb. A stage whose amount is at its off value adds no nodes at
// all, so a fully dry chain is just the input node.

use rand::Rng;

use super::effect::{
    Convolver, DelayLine, FilterMode, StereoFilter, distortion_curve, impulse_response, tanh_curve,
};
use super::graph::{AudioGraph, NodeId, NodeKind};
use crate::pipeline::params::{FxKey, FxParams};

pub const MASTER_GAIN: f32 = 0.7;
const WASP_POLES: usize = 4;

pub struct ChainOutput {
    pub output: NodeId,
    pub nodes: Vec<NodeId>, // everything the chain added, for teardown
}

// One enabled stage, with every buffer it needs already allocated
enum Stage {
    Wasp { shaper: Vec<f32>, poles: [StereoFilter; WASP_POLES], mix: f32 },
    Drive(Vec<f32>),
    Distortion { curve: Vec<f32>, makeup: f32 },
    Resonator { delay: DelayLine, band: StereoFilter, amount: f32 },
    Echo { delay: DelayLine, amount: f32 },
    Reverb { convolver: Box<Convolver>, amount: f32 },
}

// A chain made ahead of time. Delay lines, impulse responses and shaper
// curves are built here, off the audio thread; `wire_chain` only links them.
pub struct ChainParts {
    stages: Vec<Stage>,
}

impl ChainParts {
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

pub fn prepare_chain(sr: f32, fx: &FxParams, rng: &mut impl Rng) -> ChainParts {
    let mut stages = Vec::new();

    let wasp = fx.get(FxKey::WaspFilter);
    if wasp > 0.0 {
        let (freq, q) = (fx.get(FxKey::WaspFreq), fx.get(FxKey::WaspRes) / 4.0);
        stages.push(Stage::Wasp {
            shaper: tanh_curve(fx.get(FxKey::WaspDrive) * 0.9),
            poles: std::array::from_fn(|_| StereoFilter::new(FilterMode::LowPass, sr, freq, q)),
            mix: wasp,
        });
    }

    let drive = fx.get(FxKey::Drive);
    if drive > 1.0 {
        stages.push(Stage::Drive(tanh_curve(drive)));
    }

    let dist = fx.get(FxKey::Distortion);
    if dist > 0.0 {
        stages.push(Stage::Distortion { curve: distortion_curve(dist), makeup: 1.0 / (1.0 + dist) });
    }

    let res = fx.get(FxKey::Resonator);
    if res > 0.0 {
        let freq = fx.get(FxKey::ResFreq);
        stages.push(Stage::Resonator {
            delay: DelayLine::new(sr, 1.0 / freq),
            band: StereoFilter::new(FilterMode::BandPass, sr, freq, 20.0),
            amount: res,
        });
    }

    let echo = fx.get(FxKey::Delay);
    if echo > 0.0 {
        stages.push(Stage::Echo { delay: DelayLine::new(sr, fx.get(FxKey::DelayTime)), amount: echo });
    }

    let reverb = fx.get(FxKey::Reverb);
    if reverb > 0.0 {
        let ir = impulse_response(sr, fx.get(FxKey::ReverbSize), rng);
        stages.push(Stage::Reverb { convolver: Box::new(Convolver::new(ir)), amount: reverb });
    }

    ChainParts { stages }
}

struct Builder<'g> {
    graph: &'g mut AudioGraph,
    nodes: Vec<NodeId>,
}

impl Builder<'_> {
    fn add(&mut self, kind: NodeKind) -> NodeId {
        let id = self.graph.add(kind);
        self.nodes.push(id);
        id
    }

    // `src` -> new node, returns the new node
    fn then(&mut self, src: NodeId, kind: NodeKind) -> NodeId {
        let id = self.add(kind);
        self.graph.connect(src, id);
        id
    }

    // Two gains merged into a fresh summing node
    fn mix(&mut self, dry_src: NodeId, dry: f32, wet_src: NodeId, wet: f32) -> NodeId {
        let dry_gain = self.then(dry_src, NodeKind::Gain(dry));
        let wet_gain = self.then(wet_src, NodeKind::Gain(wet));
        let sum = self.add(NodeKind::Gain(1.0));
        self.graph.connect(dry_gain, sum);
        self.graph.connect(wet_gain, sum);
        sum
    }
}

pub fn wire_chain(graph: &mut AudioGraph, input: NodeId, parts: ChainParts) -> ChainOutput {
    let mut b = Builder { graph, nodes: Vec::new() };
    let mut cur = input;

    for stage in parts.stages {
        cur = match stage {
            Stage::Wasp { shaper, poles, mix } => {
                let mut wet = b.then(cur, NodeKind::Shaper(shaper));
                for pole in poles {
                    wet = b.then(wet, NodeKind::Filter(pole));
                }
                b.mix(cur, 1.0 - mix, wet, mix)
            }
            Stage::Drive(curve) => b.then(cur, NodeKind::Shaper(curve)),
            Stage::Distortion { curve, makeup } => {
                let shaped = b.then(cur, NodeKind::Shaper(curve));
                b.then(shaped, NodeKind::Gain(makeup))
            }
            Stage::Resonator { delay, band, amount } => {
                let delay = b.then(cur, NodeKind::Delay(delay));
                let band = b.then(delay, NodeKind::Filter(band));
                let feedback = b.then(band, NodeKind::Gain(0.85 * amount));
                b.graph.connect(feedback, delay);
                b.mix(cur, 1.0 - 0.3 * amount, band, 0.7 * amount)
            }
            Stage::Echo { delay, amount } => {
                let delay = b.then(cur, NodeKind::Delay(delay));
                let feedback = b.then(delay, NodeKind::Gain(0.4 * amount));
                b.graph.connect(feedback, delay);
                b.mix(cur, 1.0, delay, 0.5 * amount)
            }
            Stage::Reverb { convolver, amount } => {
                let conv = b.then(cur, NodeKind::Convolver(convolver));
                b.mix(cur, 1.0, conv, 0.4 * amount)
            }
        };
    }

    ChainOutput { output: cur, nodes: b.nodes }
}

pub fn build_chain(graph: &mut AudioGraph, input: NodeId, fx: &FxParams, rng: &mut impl Rng) -> ChainOutput {
    let parts = prepare_chain(graph.sample_rate(), fx, rng);
    wire_chain(graph, input, parts)
}

// master input (1.0) -> chain -> master gain (0.7) -> destination
pub struct MasterBus {
    input: NodeId,
    output_gain: NodeId,
    chain: Vec<NodeId>,
}

impl MasterBus {
    pub fn new(graph: &mut AudioGraph, parts: ChainParts) -> Self {
        let input = graph.add(NodeKind::Gain(1.0));
        let output_gain = graph.add(NodeKind::Gain(MASTER_GAIN));
        graph.connect(output_gain, graph.destination());
        let mut bus = Self { input, output_gain, chain: Vec::new() };
        bus.attach_chain(graph, parts);
        bus
    }

    pub fn input(&self) -> NodeId {
        self.input
    }

    pub fn chain_len(&self) -> usize {
        self.chain.len()
    }

    fn attach_chain(&mut self, graph: &mut AudioGraph, parts: ChainParts) {
        let chain = wire_chain(graph, self.input, parts);
        graph.connect(chain.output, self.output_gain);
        self.chain = chain.nodes;
    }

    // Tear the old chain down completely, then wire the new one from the input
    pub fn rebuild(&mut self, graph: &mut AudioGraph, parts: ChainParts) {
        graph.disconnect_outputs(self.input);
        for id in self.chain.drain(..) {
            graph.remove(id);
        }
        self.attach_chain(graph, parts);
    }
}
