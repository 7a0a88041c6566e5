//! Csound document generation.
//!
//! Every generated document shares one orchestra header and holds exactly one
//! instrument and one score event. Numbers are written with `f64`'s `Display`,
//! which is locale-free and round-trips, so identical parameters always yield
//! identical bytes.

use std::fmt;

use crate::params::{KickParameters, Oscillator, VoiceParameters};

pub const SAMPLE_RATE: u32 = 44_100;
/// Samples per control period (`ksmps`).
pub const CONTROL_BLOCK: u32 = 32;
pub const CHANNELS: u16 = 1;
pub const NYQUIST_HZ: f64 = SAMPLE_RATE as f64 / 2.0;

/// moogladder gets unstable close to Nyquist; sweeps stop here.
const MAX_SWEEP_HZ: f64 = NYQUIST_HZ * 0.9;
/// The filter opens this many times above the cutoff and settles over
/// attack + decay.
const SWEEP_RATIO: f64 = 3.0;
const FILTER_RESONANCE: f64 = 0.4;

/// An orchestra + score document, built whole or taken verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstrumentDocument(String);

impl InstrumentDocument {
    /// Wrap caller-supplied text without looking at it.
    pub fn from_raw(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for InstrumentDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Build the filtered, enveloped single-voice instrument.
pub fn build_voice(voice: &VoiceParameters) -> InstrumentDocument {
    let env = &voice.envelope;
    let pitch = voice.pitch;
    let cutoff = voice.cutoff_hz;
    let oscillator = match voice.oscillator {
        // vco2 mode 0 is a band-limited sawtooth
        Oscillator::Sawtooth => format!("asig vco2 1.0, {pitch}, 0"),
        Oscillator::Sine => format!("asig poscil 1.0, {pitch}"),
    };
    let sweep_start = (cutoff * SWEEP_RATIO).min(MAX_SWEEP_HZ).max(cutoff);
    let sweep_time = env.attack + env.decay;

    let instrument = format!(
        "    ; adsr places the release inside the note
    kamp adsr {attack}, {decay}, {sustain}, {release}
    {oscillator}
    kcut expseg {sweep_start}, {sweep_time}, {cutoff}
    afil moogladder asig, kcut, {FILTER_RESONANCE}
    ; half amplitude leaves headroom
    out afil * kamp * 0.5",
        attack = env.attack,
        decay = env.decay,
        sustain = env.sustain,
        release = env.release,
    );
    assemble(&instrument, voice.duration)
}

/// Build the pitch-swept, saturated sine kick.
pub fn build_kick(kick: &KickParameters) -> InstrumentDocument {
    let instrument = format!(
        "    kamp expseg 1.0, {decay}, 0.001
    kpitch expseg {start}, {drop}, {fundamental}, {decay}, {fundamental}
    asig poscil kamp, kpitch
    ; tanh soft clipping
    asig = tanh(asig * {drive})
    out asig * 0.8",
        decay = kick.decay_secs,
        start = kick.sweep_start_hz,
        drop = kick.drop_secs,
        fundamental = kick.fundamental_hz,
        drive = kick.drive,
    );
    assemble(&instrument, kick.decay_secs)
}

fn assemble(instrument: &str, duration: f64) -> InstrumentDocument {
    InstrumentDocument(format!(
        "<CsoundSynthesizer>
<CsOptions>
</CsOptions>
<CsInstruments>
sr = {SAMPLE_RATE}
ksmps = {CONTROL_BLOCK}
nchnls = {CHANNELS}
0dbfs = 1

instr 1
{instrument}
endin
</CsInstruments>
<CsScore>
i 1 0 {duration}
</CsScore>
</CsoundSynthesizer>
"
    ))
}
