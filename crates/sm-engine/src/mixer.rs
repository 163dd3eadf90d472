//! The mixing graph: a processor behind every node plus the fixed routing
//! of track strips, decks, send buses and the master chain.
//!
//! ```text
//! instrument -> eq -> strip ------------------------> input
//!                       |-> send A -> reverb -------> input
//!                       '-> send B -> delay --------> input
//! deck A -> strip -> crossfader[0] -+
//! deck B -> strip -> crossfader[1] -+---------------> input
//! input -> compressor -> volume -> soft clip -> master
//! ```

use slotmap::SecondaryMap;
use sm_ir::{AudioBuffer, AudioGraph, DeckId, EffectKind, EqSettings, NodeId, NodeType, TrackKey};

use crate::context::RenderContext;
use crate::crossfader::Crossfader;
use crate::deck::Deck;
use crate::effects::{
    compressor, create_effect, filter, panner, reverb, soft_clip, ChannelStrip, Effect, Gain, Reverb, ThreeBandEq,
};
use crate::graph_state::{gather_inputs, GraphState};
use crate::instrument::Instrument;
use crate::sample_bank::SampleBank;

/// Node id of the final output.
pub const MASTER: NodeId = 0;

/// What runs behind one graph node.
pub enum Processor {
    Vacant,
    Master,
    /// Sums port 0
    Bus,
    Instrument(Box<Instrument>),
    Deck(Box<Deck>),
    Crossfader(Crossfader),
    Effect(Box<dyn Effect>),
}

impl Processor {
    fn node_type(&self) -> NodeType {
        match self {
            Processor::Vacant => NodeType::Vacant,
            Processor::Master => NodeType::Master,
            Processor::Bus => NodeType::Bus,
            // track strips register the real key through `Mixer::add_track`
            Processor::Instrument(_) => NodeType::Instrument {
                track: TrackKey::default(),
            },
            Processor::Deck(d) => NodeType::Deck { deck: d.id() },
            Processor::Crossfader(_) => NodeType::Crossfader,
            Processor::Effect(fx) => NodeType::Effect { kind: fx.info().kind },
        }
    }
}

/// Mixing settings fixed at construction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MixerSettings {
    /// Linear master volume in [0, 1]
    pub master_volume: f32,
    /// Length of the generated reverb impulse
    pub reverb_seconds: f32,
    /// Wet share of the reverb bus
    pub reverb_mix: f32,
}

impl Default for MixerSettings {
    fn default() -> Self {
        Self {
            master_volume: 0.8,
            reverb_seconds: reverb::DEFAULT_SECONDS,
            reverb_mix: 1.0,
        }
    }
}

/// Nodes of the master section and the shared buses.
#[derive(Clone, Copy, Debug)]
pub struct MasterNodes {
    pub input: NodeId,
    pub compressor: NodeId,
    pub volume: NodeId,
    pub soft_clip: NodeId,
    pub reverb: NodeId,
    pub delay: NodeId,
    pub crossfader: NodeId,
}

/// Nodes owned by one sequencer track.
#[derive(Clone, Copy, Debug)]
pub struct TrackNodes {
    pub instrument: NodeId,
    pub eq: NodeId,
    pub strip: NodeId,
    pub send_a: NodeId,
    pub send_b: NodeId,
}

#[derive(Clone, Copy, Debug)]
struct DeckNodes {
    deck: NodeId,
    strip: NodeId,
}

/// Strip and send levels of one track.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackMix {
    pub gain: f32,
    pub pan: f32,
    pub send_a: f32,
    pub send_b: f32,
    pub muted: bool,
}

pub struct Mixer {
    graph: AudioGraph,
    processors: Vec<Processor>,
    state: GraphState,
    master: MasterNodes,
    decks: [DeckNodes; 2],
    tracks: SecondaryMap<TrackKey, TrackNodes>,
    sample_rate: u32,
}

impl Mixer {
    pub fn new(sample_rate: u32, settings: MixerSettings) -> Self {
        let mut mixer = Self {
            graph: AudioGraph::with_master(),
            processors: vec![Processor::Master],
            state: GraphState::from_graph(&AudioGraph::with_master()),
            master: MasterNodes {
                input: MASTER,
                compressor: MASTER,
                volume: MASTER,
                soft_clip: MASTER,
                reverb: MASTER,
                delay: MASTER,
                crossfader: MASTER,
            },
            decks: [DeckNodes { deck: MASTER, strip: MASTER }; 2],
            tracks: SecondaryMap::new(),
            sample_rate,
        };

        let input = mixer.add(Processor::Bus);
        let comp = mixer.add(Processor::Effect(create_effect(EffectKind::Compressor, sample_rate)));
        let volume = mixer.add(Processor::Effect(Box::new(Gain::new(settings.master_volume.clamp(0.0, 1.0)))));
        let clip = mixer.add(Processor::Effect(create_effect(EffectKind::SoftClip, sample_rate)));
        mixer.graph.connect(input, comp);
        mixer.graph.connect(comp, volume);
        mixer.graph.connect(volume, clip);
        mixer.graph.connect(clip, MASTER);

        let mut rv = Reverb::with_length(sample_rate, settings.reverb_seconds);
        rv.set_param(reverb::MIX, settings.reverb_mix, 0.0);
        let reverb = mixer.add(Processor::Effect(Box::new(rv)));
        let delay = mixer.add(Processor::Effect(create_effect(EffectKind::Delay, sample_rate)));
        mixer.graph.connect(reverb, input);
        mixer.graph.connect(delay, input);

        let crossfader = mixer.add(Processor::Crossfader(Crossfader::new()));
        mixer.graph.connect(crossfader, input);
        for id in DeckId::ALL {
            let deck = mixer.add(Processor::Deck(Box::new(Deck::new(id, sample_rate))));
            let strip = mixer.add(Processor::Effect(create_effect(EffectKind::ChannelStrip, sample_rate)));
            mixer.graph.connect(deck, strip);
            mixer.graph.connect_port(strip, crossfader, id.index() as u8);
            mixer.decks[id.index()] = DeckNodes { deck, strip };
        }

        mixer.master = MasterNodes {
            input,
            compressor: comp,
            volume,
            soft_clip: clip,
            reverb,
            delay,
            crossfader,
        };
        mixer.state.rebuild(&mixer.graph);
        mixer
    }

    fn add(&mut self, processor: Processor) -> NodeId {
        let id = self.graph.add_node(processor.node_type());
        self.place(id, processor);
        id
    }

    fn place(&mut self, id: NodeId, processor: Processor) {
        let idx = id as usize;
        if idx >= self.processors.len() {
            self.processors.resize_with(idx + 1, || Processor::Vacant);
        }
        self.processors[idx] = processor;
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn graph(&self) -> &AudioGraph {
        &self.graph
    }

    pub fn master_nodes(&self) -> MasterNodes {
        self.master
    }

    /// Wire a new track strip for `key` around `instrument`.
    pub fn add_track(&mut self, key: TrackKey, instrument: Instrument, mix: TrackMix) -> TrackNodes {
        if let Some(nodes) = self.tracks.get(key).copied() {
            self.replace_instrument(key, instrument);
            return nodes;
        }
        let inst = self.graph.add_node(NodeType::Instrument { track: key });
        self.place(inst, Processor::Instrument(Box::new(instrument)));
        let eq = self.add(Processor::Effect(Box::new(ThreeBandEq::new())));
        let gain = if mix.muted { 0.0 } else { mix.gain };
        let strip = self.add(Processor::Effect(Box::new(ChannelStrip::with_values(gain, mix.pan))));
        let send_a = self.add(Processor::Effect(Box::new(Gain::new(mix.send_a))));
        let send_b = self.add(Processor::Effect(Box::new(Gain::new(mix.send_b))));

        self.graph.connect(inst, eq);
        self.graph.connect(eq, strip);
        self.graph.connect(strip, self.master.input);
        self.graph.connect(strip, send_a);
        self.graph.connect(strip, send_b);
        self.graph.connect(send_a, self.master.reverb);
        self.graph.connect(send_b, self.master.delay);
        self.state.rebuild(&self.graph);

        let nodes = TrackNodes {
            instrument: inst,
            eq,
            strip,
            send_a,
            send_b,
        };
        self.tracks.insert(key, nodes);
        log::debug!("mixer: track strip at nodes {nodes:?}");
        nodes
    }

    /// Remove a track's nodes, returning its instrument.
    pub fn remove_track(&mut self, key: TrackKey) -> Option<Instrument> {
        let nodes = self.tracks.remove(key)?;
        let mut instrument = None;
        for id in [nodes.instrument, nodes.eq, nodes.strip, nodes.send_a, nodes.send_b] {
            self.graph.remove_node(id);
            if let Some(slot) = self.processors.get_mut(id as usize) {
                if let Processor::Instrument(inst) = core::mem::replace(slot, Processor::Vacant) {
                    instrument = Some(*inst);
                }
            }
        }
        self.state.rebuild(&self.graph);
        instrument
    }

    pub fn track_nodes(&self, key: TrackKey) -> Option<TrackNodes> {
        self.tracks.get(key).copied()
    }

    pub fn has_track(&self, key: TrackKey) -> bool {
        self.tracks.contains_key(key)
    }

    /// Keys of every wired track.
    pub fn track_keys(&self) -> impl Iterator<Item = TrackKey> + '_ {
        self.tracks.keys()
    }

    /// Swap the instrument behind a track. The old one is returned silenced.
    pub fn replace_instrument(&mut self, key: TrackKey, instrument: Instrument) -> Option<Instrument> {
        let nodes = self.tracks.get(key)?;
        let slot = self.processors.get_mut(nodes.instrument as usize)?;
        match core::mem::replace(slot, Processor::Instrument(Box::new(instrument))) {
            Processor::Instrument(mut old) => {
                old.kill_all();
                Some(*old)
            }
            _ => None,
        }
    }

    pub fn instrument(&self, key: TrackKey) -> Option<&Instrument> {
        let nodes = self.tracks.get(key)?;
        match self.processors.get(nodes.instrument as usize)? {
            Processor::Instrument(inst) => Some(inst.as_ref()),
            _ => None,
        }
    }

    pub fn instrument_mut(&mut self, key: TrackKey) -> Option<&mut Instrument> {
        let nodes = self.tracks.get(key)?;
        match self.processors.get_mut(nodes.instrument as usize)? {
            Processor::Instrument(inst) => Some(inst.as_mut()),
            _ => None,
        }
    }

    pub fn instruments_mut(&mut self) -> impl Iterator<Item = &mut Instrument> + '_ {
        self.processors.iter_mut().filter_map(|p| match p {
            Processor::Instrument(inst) => Some(inst.as_mut()),
            _ => None,
        })
    }

    /// Glide a track's strip and sends. Muting drops the strip gain to zero.
    pub fn set_track_mix(&mut self, key: TrackKey, mix: TrackMix, at: f64) {
        let Some(nodes) = self.tracks.get(key).copied() else {
            return;
        };
        let gain = if mix.muted { 0.0 } else { mix.gain };
        self.set_effect_param(nodes.strip, panner::channel_strip::GAIN, gain, at);
        self.set_effect_param(nodes.strip, panner::channel_strip::PAN, mix.pan, at);
        self.set_effect_param(nodes.send_a, panner::gain::GAIN, mix.send_a, at);
        self.set_effect_param(nodes.send_b, panner::gain::GAIN, mix.send_b, at);
    }

    pub fn set_track_eq(&mut self, key: TrackKey, eq: EqSettings, at: f64) {
        let Some(nodes) = self.tracks.get(key).copied() else {
            return;
        };
        self.set_effect_param(nodes.eq, filter::LOW, eq.low, at);
        self.set_effect_param(nodes.eq, filter::MID, eq.mid, at);
        self.set_effect_param(nodes.eq, filter::HIGH, eq.high, at);
    }

    pub fn effect(&self, id: NodeId) -> Option<&dyn Effect> {
        match self.processors.get(id as usize)? {
            Processor::Effect(fx) => Some(fx.as_ref()),
            _ => None,
        }
    }

    pub fn effect_mut(&mut self, id: NodeId) -> Option<&mut dyn Effect> {
        match self.processors.get_mut(id as usize)? {
            Processor::Effect(fx) => Some(fx.as_mut()),
            _ => None,
        }
    }

    pub fn set_effect_param(&mut self, id: NodeId, param: u16, value: f32, at: f64) {
        match self.effect_mut(id) {
            Some(fx) => fx.set_param(param, value, at),
            None => log::warn!("mixer: node {id} is not an effect"),
        }
    }

    pub fn effect_param(&self, id: NodeId, param: u16) -> Option<f32> {
        self.effect(id)?.param(param)
    }

    pub fn deck(&self, id: DeckId) -> Option<&Deck> {
        match self.processors.get(self.decks[id.index()].deck as usize)? {
            Processor::Deck(deck) => Some(deck.as_ref()),
            _ => None,
        }
    }

    pub fn deck_mut(&mut self, id: DeckId) -> Option<&mut Deck> {
        match self.processors.get_mut(self.decks[id.index()].deck as usize)? {
            Processor::Deck(deck) => Some(deck.as_mut()),
            _ => None,
        }
    }

    pub fn set_deck_gain(&mut self, id: DeckId, gain: f32, at: f64) {
        let strip = self.decks[id.index()].strip;
        self.set_effect_param(strip, panner::channel_strip::GAIN, gain, at);
    }

    pub fn set_deck_pan(&mut self, id: DeckId, pan: f32, at: f64) {
        let strip = self.decks[id.index()].strip;
        self.set_effect_param(strip, panner::channel_strip::PAN, pan, at);
    }

    pub fn crossfader(&self) -> Option<&Crossfader> {
        match self.processors.get(self.master.crossfader as usize)? {
            Processor::Crossfader(xf) => Some(xf),
            _ => None,
        }
    }

    pub fn crossfader_mut(&mut self) -> Option<&mut Crossfader> {
        match self.processors.get_mut(self.master.crossfader as usize)? {
            Processor::Crossfader(xf) => Some(xf),
            _ => None,
        }
    }

    /// Linear master volume, clamped to [0, 1].
    pub fn set_master_volume(&mut self, volume: f32, at: f64) {
        let volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        self.set_effect_param(self.master.volume, panner::gain::GAIN, volume, at);
    }

    pub fn master_volume(&self) -> f32 {
        self.effect_param(self.master.volume, panner::gain::GAIN)
            .unwrap_or(0.0)
    }

    pub fn set_compressor(&mut self, param: u16, value: f32, at: f64) {
        self.set_effect_param(self.master.compressor, param, value, at);
    }

    pub fn set_limiter(&mut self, enabled: bool, at: f64) {
        let value = if enabled { 1.0 } else { 0.0 };
        self.set_effect_param(self.master.compressor, compressor::LIMITER, value, at);
    }

    pub fn set_soft_clip(&mut self, enabled: bool, at: f64) {
        let value = if enabled { 1.0 } else { 0.0 };
        self.set_effect_param(self.master.soft_clip, soft_clip::ENABLED, value, at);
    }

    pub fn set_reverb_mix(&mut self, mix: f32, at: f64) {
        self.set_effect_param(self.master.reverb, reverb::MIX, mix, at);
    }

    /// Master compressor gain reduction in dB.
    pub fn gain_reduction_db(&self) -> f32 {
        self.effect(self.master.compressor)
            .and_then(|fx| fx.meter())
            .unwrap_or(0.0)
    }

    /// Output of the last rendered block.
    pub fn output(&self) -> &AudioBuffer {
        &self.state.node_outputs[MASTER as usize]
    }

    /// Render one block through the whole graph and return the master output.
    pub fn render(&mut self, ctx: &RenderContext, bank: &SampleBank) -> &AudioBuffer {
        let Self {
            graph,
            processors,
            state,
            ..
        } = self;
        for &id in &state.topo_order {
            let idx = id as usize;
            let Some(processor) = processors.get_mut(idx) else {
                continue;
            };
            match processor {
                Processor::Vacant => {}
                Processor::Instrument(inst) => {
                    let out = &mut state.node_outputs[idx];
                    out.silence();
                    inst.render(ctx, bank, out);
                }
                Processor::Deck(deck) => deck.render(ctx, &mut state.node_outputs[idx]),
                Processor::Crossfader(xf) => {
                    let [a, b] = &mut state.scratch;
                    gather_inputs(graph, &state.node_outputs, id, 0, a);
                    gather_inputs(graph, &state.node_outputs, id, 1, b);
                    xf.process(ctx, a, b, &mut state.node_outputs[idx]);
                }
                Processor::Master | Processor::Bus => {
                    gather_inputs(graph, &state.node_outputs, id, 0, &mut state.scratch[0]);
                    core::mem::swap(&mut state.scratch[0], &mut state.node_outputs[idx]);
                }
                Processor::Effect(fx) => {
                    gather_inputs(graph, &state.node_outputs, id, 0, &mut state.scratch[0]);
                    fx.process(ctx, &mut state.scratch[0]);
                    core::mem::swap(&mut state.scratch[0], &mut state.node_outputs[idx]);
                }
            }
        }
        &state.node_outputs[MASTER as usize]
    }

    /// Clear effect tails and instrument voices.
    pub fn reset(&mut self) {
        for p in &mut self.processors {
            match p {
                Processor::Effect(fx) => fx.reset(),
                Processor::Instrument(inst) => inst.kill_all(),
                _ => {}
            }
        }
        self.state.clear_outputs();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::test_util::{block_ctx, SR};
    use sm_ir::{InstrumentPreset, PresetCatalogue, Velocity};
    use slotmap::SlotMap;

    fn synth(catalogue: &PresetCatalogue) -> Instrument {
        let preset: &InstrumentPreset = catalogue.get("synth-lead").unwrap();
        Instrument::from_preset(preset, SR, 8)
    }

    fn mix() -> TrackMix {
        TrackMix {
            gain: 1.0,
            pan: 0.0,
            send_a: 0.0,
            send_b: 0.0,
            muted: false,
        }
    }

    fn keys(n: usize) -> Vec<TrackKey> {
        let mut sm: SlotMap<TrackKey, ()> = SlotMap::with_key();
        (0..n).map(|_| sm.insert(())).collect()
    }

    fn render_blocks(mixer: &mut Mixer, bank: &SampleBank, from: usize, count: usize) -> f32 {
        let mut peak = 0.0f32;
        for b in from..from + count {
            peak = peak.max(mixer.render(&block_ctx(b), bank).peak());
        }
        peak
    }

    #[test]
    fn empty_mixer_is_silent() {
        let mut mixer = Mixer::new(SR, MixerSettings::default());
        let bank = SampleBank::new();
        assert_eq!(render_blocks(&mut mixer, &bank, 0, 4), 0.0);
        // master chain is fully wired: every node except the master has an outlet
        let order = &mixer.state.topo_order;
        assert_eq!(order.len(), mixer.graph().nodes.len());
        assert_eq!(order.last(), Some(&MASTER));
    }

    #[test]
    fn track_note_reaches_master() {
        let catalogue = PresetCatalogue::builtin();
        let mut mixer = Mixer::new(SR, MixerSettings::default());
        let bank = SampleBank::new();
        let key = keys(1)[0];
        mixer.add_track(key, synth(&catalogue), mix());
        mixer
            .instrument_mut(key)
            .unwrap()
            .play(69, Velocity::from_unit(1.0), 0.0, &bank);
        assert!(render_blocks(&mut mixer, &bank, 0, 20) > 0.01);
    }

    #[test]
    fn muted_track_is_silent() {
        let catalogue = PresetCatalogue::builtin();
        let mut mixer = Mixer::new(SR, MixerSettings::default());
        let bank = SampleBank::new();
        let key = keys(1)[0];
        mixer.add_track(key, synth(&catalogue), TrackMix { muted: true, ..mix() });
        mixer
            .instrument_mut(key)
            .unwrap()
            .play(60, Velocity::from_unit(1.0), 0.0, &bank);
        // strip gain glides down from unity, then stays shut
        render_blocks(&mut mixer, &bank, 0, 40);
        assert!(render_blocks(&mut mixer, &bank, 40, 10) < 1e-3);
    }

    #[test]
    fn removing_a_track_returns_its_instrument_and_reuses_slots() {
        let catalogue = PresetCatalogue::builtin();
        let mut mixer = Mixer::new(SR, MixerSettings::default());
        let ks = keys(2);
        let nodes = mixer.add_track(ks[0], synth(&catalogue), mix());
        let before = mixer.graph().nodes.len();
        assert!(mixer.remove_track(ks[0]).is_some());
        assert!(!mixer.has_track(ks[0]));
        let again = mixer.add_track(ks[1], synth(&catalogue), mix());
        assert_eq!(mixer.graph().nodes.len(), before);
        assert_eq!(again.instrument, nodes.instrument);
    }

    #[test]
    fn master_controls_are_clamped_and_readable() {
        let mut mixer = Mixer::new(SR, MixerSettings::default());
        mixer.set_master_volume(3.0, 0.0);
        assert_eq!(mixer.master_volume(), 1.0);
        mixer.set_limiter(true, 0.0);
        let comp = mixer.master_nodes().compressor;
        assert_eq!(mixer.effect_param(comp, compressor::LIMITER), Some(1.0));
        mixer.set_soft_clip(false, 0.0);
        let clip = mixer.master_nodes().soft_clip;
        assert_eq!(mixer.effect_param(clip, soft_clip::ENABLED), Some(0.0));
    }

    #[test]
    fn deck_plays_through_crossfader() {
        let mut mixer = Mixer::new(SR, MixerSettings::default());
        let bank = SampleBank::new();
        let mut buf = AudioBuffer::new(2, SR as usize);
        buf.channel_mut(0).fill(0.2);
        buf.channel_mut(1).fill(0.2);
        let deck = mixer.deck_mut(DeckId::B).unwrap();
        deck.load_buffer(buf, "tone");
        deck.play();
        assert!(render_blocks(&mut mixer, &bank, 0, 10) > 0.01);

        // fader hard over to deck A shuts deck B out
        mixer
            .crossfader_mut()
            .unwrap()
            .set(-1.0, sm_ir::CrossfadeCurve::Linear, false, block_ctx(10).start_time);
        render_blocks(&mut mixer, &bank, 10, 60);
        assert!(render_blocks(&mut mixer, &bank, 70, 5) < 1e-3);
    }
}
