//! Biquad filter unit and the three-band channel EQ.

use sm_ir::{AudioBuffer, EffectKind, EqSettings, EQ_MAX_DB, EQ_MIN_DB};

use super::{Effect, EffectInfo, ParamInfo};
use crate::biquad::{BiquadCoeffs, BiquadState, FilterType};
use crate::context::RenderContext;
use crate::param::AudioParam;

/// Frames between coefficient updates while a parameter glides.
const UPDATE_FRAMES: usize = 32;

pub const CUTOFF: u16 = 0;
pub const Q: u16 = 1;
pub const GAIN: u16 = 2;
/// Response shape, as the index into [`FILTER_TYPES`]
pub const TYPE: u16 = 3;

pub const FILTER_TYPES: [FilterType; 6] = [
    FilterType::LowPass,
    FilterType::HighPass,
    FilterType::BandPass,
    FilterType::Peaking,
    FilterType::LowShelf,
    FilterType::HighShelf,
];

static FILTER_PARAMS: &[ParamInfo] = &[
    ParamInfo {
        id: CUTOFF,
        name: "Cutoff",
        min: 20.0,
        max: 20000.0,
        default: 20000.0,
    },
    ParamInfo {
        id: Q,
        name: "Q",
        min: 0.1,
        max: 20.0,
        default: 0.707,
    },
    ParamInfo {
        id: GAIN,
        name: "Gain",
        min: EQ_MIN_DB,
        max: EQ_MAX_DB,
        default: 0.0,
    },
    ParamInfo {
        id: TYPE,
        name: "Type",
        min: 0.0,
        max: 5.0,
        default: 0.0,
    },
];

static FILTER_INFO: EffectInfo = EffectInfo {
    name: "Filter",
    kind: EffectKind::Filter,
    params: FILTER_PARAMS,
};

/// A single glide-able biquad section.
#[derive(Debug)]
struct Section {
    kind: FilterType,
    freq: AudioParam,
    q: AudioParam,
    gain: AudioParam,
    coeffs: BiquadCoeffs,
    designed: Option<(f32, f32, f32)>,
    state: BiquadState,
}

impl Section {
    fn new(kind: FilterType, freq: AudioParam, q: AudioParam, gain: AudioParam) -> Self {
        Self {
            kind,
            freq,
            q,
            gain,
            coeffs: BiquadCoeffs::IDENTITY,
            designed: None,
            state: BiquadState::default(),
        }
    }

    fn update(&mut self, t: f64, sample_rate: u32) {
        let wanted = (self.freq.value_at(t), self.q.value_at(t), self.gain.value_at(t));
        if self.designed != Some(wanted) {
            self.coeffs = BiquadCoeffs::design(self.kind, wanted.0, wanted.1, wanted.2, sample_rate);
            self.designed = Some(wanted);
        }
    }

    fn run(&mut self, left: &mut [f32], right: &mut [f32]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            *l = self.state.process(0, *l, &self.coeffs);
            *r = self.state.process(1, *r, &self.coeffs);
        }
    }

    fn prune(&mut self, now: f64) {
        self.freq.prune(now);
        self.q.prune(now);
        self.gain.prune(now);
    }

    fn set_kind(&mut self, kind: FilterType) {
        if self.kind != kind {
            self.kind = kind;
            self.designed = None;
        }
    }
}

/// Run `sections` in series over one block, refreshing coefficients as they glide.
fn process_sections(sections: &mut [Section], ctx: &RenderContext, buffer: &mut AudioBuffer) {
    let frames = ctx.frames.min(buffer.frames());
    let Some((left, right)) = buffer.stereo_mut() else {
        return;
    };
    let mut start = 0;
    while start < frames {
        let end = (start + UPDATE_FRAMES).min(frames);
        let t = ctx.time_at(start);
        for s in sections.iter_mut() {
            s.update(t, ctx.sample_rate);
            s.run(&mut left[start..end], &mut right[start..end]);
        }
        start = end;
    }
    for s in sections.iter_mut() {
        s.prune(ctx.end_time());
    }
}

/// Single biquad with selectable response.
pub struct Filter {
    section: Section,
}

impl Default for Filter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter {
    pub fn new() -> Self {
        Self {
            section: Section::new(
                FilterType::LowPass,
                FILTER_PARAMS[0].param(),
                FILTER_PARAMS[1].param(),
                FILTER_PARAMS[2].param(),
            ),
        }
    }

    pub fn with_type(kind: FilterType) -> Self {
        let mut f = Self::new();
        f.section.set_kind(kind);
        f
    }

    pub fn filter_type(&self) -> FilterType {
        self.section.kind
    }
}

impl Effect for Filter {
    fn info(&self) -> &EffectInfo {
        &FILTER_INFO
    }

    fn process(&mut self, ctx: &RenderContext, buffer: &mut AudioBuffer) {
        process_sections(core::slice::from_mut(&mut self.section), ctx, buffer);
    }

    fn set_param(&mut self, id: u16, value: f32, at: f64) {
        match id {
            CUTOFF => self.section.freq.smooth_to(value, at),
            Q => self.section.q.smooth_to(value, at),
            GAIN => self.section.gain.smooth_to(value, at),
            TYPE => {
                let index = value.round().clamp(0.0, 5.0) as usize;
                self.section.set_kind(FILTER_TYPES[index]);
            }
            _ => {}
        }
    }

    fn param(&self, id: u16) -> Option<f32> {
        match id {
            CUTOFF => Some(self.section.freq.settled_value()),
            Q => Some(self.section.q.settled_value()),
            GAIN => Some(self.section.gain.settled_value()),
            TYPE => FILTER_TYPES
                .iter()
                .position(|k| *k == self.section.kind)
                .map(|i| i as f32),
            _ => None,
        }
    }

    fn reset(&mut self) {
        self.section.state.reset();
    }
}

pub const LOW: u16 = 0;
pub const MID: u16 = 1;
pub const HIGH: u16 = 2;

/// Fixed band centres in Hz.
pub const LOW_FREQ: f32 = 100.0;
pub const MID_FREQ: f32 = 1000.0;
pub const HIGH_FREQ: f32 = 10000.0;
const MID_Q: f32 = 0.7;
const SHELF_Q: f32 = 0.707;

static EQ_PARAMS: &[ParamInfo] = &[
    ParamInfo {
        id: LOW,
        name: "Low",
        min: EQ_MIN_DB,
        max: EQ_MAX_DB,
        default: 0.0,
    },
    ParamInfo {
        id: MID,
        name: "Mid",
        min: EQ_MIN_DB,
        max: EQ_MAX_DB,
        default: 0.0,
    },
    ParamInfo {
        id: HIGH,
        name: "High",
        min: EQ_MIN_DB,
        max: EQ_MAX_DB,
        default: 0.0,
    },
];

static EQ_INFO: EffectInfo = EffectInfo {
    name: "3-Band EQ",
    kind: EffectKind::Eq,
    params: EQ_PARAMS,
};

/// Low shelf, mid peak and high shelf in series.
pub struct ThreeBandEq {
    bands: [Section; 3],
}

impl Default for ThreeBandEq {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreeBandEq {
    pub fn new() -> Self {
        let fixed = |v: f32| AudioParam::new(v, v, v);
        Self {
            bands: [
                Section::new(FilterType::LowShelf, fixed(LOW_FREQ), fixed(SHELF_Q), EQ_PARAMS[0].param()),
                Section::new(FilterType::Peaking, fixed(MID_FREQ), fixed(MID_Q), EQ_PARAMS[1].param()),
                Section::new(FilterType::HighShelf, fixed(HIGH_FREQ), fixed(SHELF_Q), EQ_PARAMS[2].param()),
            ],
        }
    }

    /// Glide all three bands at once.
    pub fn set_eq(&mut self, eq: EqSettings, at: f64) {
        self.set_param(LOW, eq.low, at);
        self.set_param(MID, eq.mid, at);
        self.set_param(HIGH, eq.high, at);
    }

    pub fn settings(&self) -> EqSettings {
        EqSettings::new(
            self.bands[HIGH as usize].gain.settled_value(),
            self.bands[MID as usize].gain.settled_value(),
            self.bands[LOW as usize].gain.settled_value(),
        )
    }
}

impl Effect for ThreeBandEq {
    fn info(&self) -> &EffectInfo {
        &EQ_INFO
    }

    fn process(&mut self, ctx: &RenderContext, buffer: &mut AudioBuffer) {
        process_sections(&mut self.bands, ctx, buffer);
    }

    fn set_param(&mut self, id: u16, value: f32, at: f64) {
        if let Some(band) = self.bands.get_mut(id as usize) {
            band.gain.smooth_to(value, at);
        }
    }

    fn param(&self, id: u16) -> Option<f32> {
        self.bands.get(id as usize).map(|b| b.gain.settled_value())
    }

    fn reset(&mut self) {
        for band in &mut self.bands {
            band.state.reset();
        }
    }
}
