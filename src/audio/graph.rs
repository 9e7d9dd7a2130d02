// The audio graph: an arena of nodes plus directed connections, rendered one
// stereo frame at a time.
//
// -- DEFINITIONS --
// "node": one processing stage (gain, shaper, filter, delay, convolver, voice).
// "connection": output of one node summed into the input of another.
// "destination": the node whose output is what you hear.
//
// Cycles are only allowed through delay nodes. A delay's output this frame is
// what was written into it earlier, so ordering ignores edges into delays and
// delays take their input at the very end of the frame.

use tracing::warn;

use super::effect::{Convolver, DelayLine, StereoFilter, shape};
use super::frame::StereoFrame;
use super::voice::SynthVoice;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32, // stale ids never alias a reused slot
}

pub enum NodeKind {
    Gain(f32),
    Shaper(Vec<f32>),
    Filter(StereoFilter),
    Delay(DelayLine),
    Convolver(Box<Convolver>),
    Voice(Box<SynthVoice>),
}

impl NodeKind {
    fn is_delay(&self) -> bool {
        matches!(self, NodeKind::Delay(_))
    }
}

struct NodeState {
    kind: NodeKind,
    inputs: Vec<usize>,
    out: StereoFrame,
}

struct Slot {
    generation: u32,
    node: Option<NodeState>,
}

pub struct AudioGraph {
    sample_rate: f32,
    slots: Vec<Slot>,
    free: Vec<usize>,
    destination: NodeId,
    order: Vec<usize>,
    order_dirty: bool,
}

fn sum_inputs(slots: &[Slot], index: usize) -> StereoFrame {
    let mut sum = StereoFrame::zero();
    if let Some(node) = &slots[index].node {
        for &src in &node.inputs {
            if let Some(from) = &slots[src].node {
                sum += from.out;
            }
        }
    }
    sum
}

impl AudioGraph {
    pub fn new(sample_rate: f32) -> Self {
        let mut graph = Self {
            sample_rate,
            slots: Vec::new(),
            free: Vec::new(),
            destination: NodeId { index: 0, generation: 0 },
            order: Vec::new(),
            order_dirty: true,
        };
        graph.destination = graph.add(NodeKind::Gain(1.0));
        graph
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn destination(&self) -> NodeId {
        self.destination
    }

    pub fn add(&mut self, kind: NodeKind) -> NodeId {
        let node = NodeState { kind, inputs: Vec::new(), out: StereoFrame::zero() };
        self.order_dirty = true;
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.node = Some(node);
                NodeId { index: index as u32, generation: slot.generation }
            }
            None => {
                self.slots.push(Slot { generation: 0, node: Some(node) });
                NodeId { index: (self.slots.len() - 1) as u32, generation: 0 }
            }
        }
    }

    fn live(&self, id: NodeId) -> Option<usize> {
        let slot = self.slots.get(id.index as usize)?;
        (slot.generation == id.generation && slot.node.is_some()).then_some(id.index as usize)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.live(id).is_some()
    }

    // Connecting twice is a no-op, same as Web Audio
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> bool {
        let (Some(src), Some(dst)) = (self.live(from), self.live(to)) else {
            warn!(?from, ?to, "connect on a removed node");
            return false;
        };
        let Some(node) = self.slots[dst].node.as_mut() else { return false };
        if !node.inputs.contains(&src) {
            node.inputs.push(src);
            self.order_dirty = true;
        }
        true
    }

    // Drop every connection leaving `id`
    pub fn disconnect_outputs(&mut self, id: NodeId) {
        let Some(src) = self.live(id) else { return };
        for slot in &mut self.slots {
            if let Some(node) = slot.node.as_mut() {
                node.inputs.retain(|&i| i != src);
            }
        }
        self.order_dirty = true;
    }

    // Removing a node takes every connection in or out of it along with it
    pub fn remove(&mut self, id: NodeId) {
        if id == self.destination {
            return;
        }
        let Some(index) = self.live(id) else { return };
        self.disconnect_outputs(id);
        let slot = &mut self.slots[index];
        slot.node = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        self.order_dirty = true;
    }

    pub fn node_count(&self) -> usize {
        self.slots.iter().filter(|s| s.node.is_some()).count()
    }

    pub fn connection_count(&self) -> usize {
        self.slots.iter().filter_map(|s| s.node.as_ref()).map(|n| n.inputs.len()).sum()
    }

    pub fn set_gain(&mut self, id: NodeId, gain: f32) {
        if let Some(index) = self.live(id) {
            if let Some(NodeState { kind: NodeKind::Gain(g), .. }) = self.slots[index].node.as_mut() {
                *g = gain;
            }
        }
    }

    // Kahn's algorithm over every edge except the ones feeding a delay
    fn rebuild_order(&mut self) {
        let n = self.slots.len();
        let mut indegree = vec![0usize; n];
        let mut outputs: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, slot) in self.slots.iter().enumerate() {
            let Some(node) = &slot.node else { continue };
            if node.kind.is_delay() {
                continue;
            }
            for &src in &node.inputs {
                indegree[i] += 1;
                outputs[src].push(i);
            }
        }

        let mut ready: Vec<usize> = (0..n)
            .filter(|&i| self.slots[i].node.is_some() && indegree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(n);
        while let Some(i) = ready.pop() {
            order.push(i);
            for &next in &outputs[i] {
                indegree[next] -= 1;
                if indegree[next] == 0 {
                    ready.push(next);
                }
            }
        }

        let live = self.slots.iter().filter(|s| s.node.is_some()).count();
        if order.len() < live {
            // a cycle with no delay in it; render what's left in arbitrary order
            warn!(stuck = live - order.len(), "audio graph has a cycle without a delay");
            for i in 0..n {
                if self.slots[i].node.is_some() && !order.contains(&i) {
                    order.push(i);
                }
            }
        }
        self.order = order;
        self.order_dirty = false;
    }

    pub fn next_frame(&mut self) -> StereoFrame {
        if self.order_dirty {
            self.rebuild_order();
        }

        for k in 0..self.order.len() {
            let i = self.order[k];
            let input = sum_inputs(&self.slots, i);
            let Some(node) = self.slots[i].node.as_mut() else { continue };
            node.out = match &mut node.kind {
                NodeKind::Gain(g) => input * *g,
                NodeKind::Shaper(curve) => input.map(|x| shape(curve, x)),
                NodeKind::Filter(f) => f.process(input),
                NodeKind::Delay(d) => d.read(),
                NodeKind::Convolver(c) => c.process(input),
                NodeKind::Voice(v) => v.next_frame(),
            };
        }

        for i in 0..self.slots.len() {
            let is_delay = matches!(&self.slots[i].node, Some(n) if n.kind.is_delay());
            if !is_delay {
                continue;
            }
            let input = sum_inputs(&self.slots, i);
            if let Some(NodeState { kind: NodeKind::Delay(d), .. }) = self.slots[i].node.as_mut() {
                d.write(input);
            }
        }

        let dest = self.destination.index as usize;
        let out = self.slots[dest].node.as_ref().map(|n| n.out).unwrap_or_default();
        if out.is_finite() { out } else { StereoFrame::zero() }
    }
}
