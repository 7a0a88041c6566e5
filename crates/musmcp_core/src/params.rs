//! Parameter mapping: agent-facing numbers to synthesis values.
//!
//! Envelope controls arrive as integer steps in `0..=255`. Segment times use an
//! exponential curve, so low steps stay distinguishable as fast transients
//! while the top of the range stretches out into multi-second tails:
//!
//! ```text
//! f(v) = MIN_SEGMENT_SECS * (max / MIN_SEGMENT_SECS) ^ (v / 255)
//! ```
//!
//! `f(0)` is exactly `MIN_SEGMENT_SECS` and `f(255)` exactly the segment
//! maximum. Levels are linear (`v / 255`).
//!
//! Everything here is pure. Validation happens before a document exists, so a
//! rejected request never touches the filesystem.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::document::NYQUIST_HZ;
use crate::error::ValidationError;

/// Shortest segment the envelope generator is ever handed.
pub const MIN_SEGMENT_SECS: f64 = 0.001;
pub const MAX_ATTACK_SECS: f64 = 2.0;
pub const MAX_DECAY_SECS: f64 = 2.0;
pub const MAX_RELEASE_SECS: f64 = 5.0;
/// Longest note any tool will render.
pub const MAX_DURATION_SECS: f64 = 600.0;

/// Fixed envelope for the plain tone path: fast enough to sound immediate,
/// long enough not to click.
const TONE_ENVELOPE: (f64, f64, f64, f64) = (0.005, 0.005, 1.0, 0.01);
/// The tone path keeps the filter wide open.
const TONE_CUTOFF_HZ: f64 = 18_000.0;

const KICK_DECAY_SECS: (f64, f64) = (0.1, 3.0);
const KICK_SWEEP_HZ: (f64, f64) = (100.0, 3000.0);
const KICK_DROP_SECS: (f64, f64) = (0.1, 0.01);
const KICK_DRIVE: (f64, f64) = (1.0, 20.0);

/// Arguments for the subtractive sawtooth voice (basses, leads, plucks, pads).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SynthesisRequest {
    /// The fundamental frequency in Hz (e.g. 55.0 for a bass, 440.0 for a lead).
    pub pitch: f64,
    /// The total length of the note in seconds, release included.
    pub duration: f64,
    /// Filter brightness in Hz. 100-400: dark, muffled (bass, deep pads).
    /// 800-1500: warm, midrange (warm pads, keys). 2000-5000: bright,
    /// piercing (leads, plucks).
    pub cutoff_hz: f64,
    /// Time to reach full volume (0-255). 0-10: instant hit (plucks, kicks).
    /// 50-100: medium swell (soft leads, strings). 150-255: very slow fade in
    /// (ambient pads, drones).
    #[schemars(range(min = 0, max = 255))]
    pub attack: i64,
    /// Time to fall from full volume to the sustain level (0-255). 10-50: fast
    /// drop (punchy bass). 80-150: natural decay (keys, guitars).
    #[schemars(range(min = 0, max = 255))]
    pub decay: i64,
    /// Level held after the decay phase (0-255). 0: the note dies out
    /// entirely (plucks, percussion). 255: holds at full volume (organs).
    #[schemars(range(min = 0, max = 255))]
    pub sustain: i64,
    /// Fade out time at the end of the note (0-255). 10-30: stops
    /// immediately (staccato). 150-255: long ringing tail (cinematic pads).
    /// Shortened if attack + decay + release would not fit in `duration`.
    #[schemars(range(min = 0, max = 255))]
    pub release: i64,
    /// Optional name for the output file (e.g. 'warm_pad.wav').
    #[serde(default)]
    pub output_filename: Option<String>,
}

/// Arguments for a plain sine tone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ToneRequest {
    /// The frequency of the tone in Hz.
    pub pitch: f64,
    /// The duration of the tone in seconds.
    pub duration: f64,
    /// Optional name for the output file.
    #[serde(default)]
    pub output_filename: Option<String>,
}

/// Arguments for the analog-style kick drum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KickRequest {
    /// The resting sub-bass frequency in Hz (e.g. 40.0 - 80.0).
    pub fundamental_hz: f64,
    /// Speed and intensity of the initial transient click (0-255). 0-50:
    /// soft, acoustic thump. 100-150: punchy house kick. 200-255: hard,
    /// laser-like transient.
    #[schemars(range(min = 0, max = 255))]
    pub punch: i64,
    /// Length of the amplitude decay (0-255). 10-50: short, tight.
    /// 100-150: standard club kick. 200-255: long, booming 808 sub.
    #[schemars(range(min = 0, max = 255))]
    pub decay: i64,
    /// Amount of saturation (0-255). 0-20: clean sine. 100-150: warm
    /// analog. 200-255: heavily distorted.
    #[schemars(range(min = 0, max = 255))]
    pub drive: i64,
    /// Optional name for the output file.
    #[serde(default)]
    pub output_filename: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Oscillator {
    Sawtooth,
    Sine,
}

/// Mapped ADSR envelope, in seconds and normalized level.
///
/// `attack + decay + hold + release` always equals the note duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeParameters {
    pub attack: f64,
    pub decay: f64,
    /// Sustain level in `0.0..=1.0`.
    pub sustain: f64,
    pub release: f64,
    /// Time the sustain level is held between decay and release.
    pub hold: f64,
    /// Set when segments were shortened to fit the note.
    pub compressed: bool,
}

impl EnvelopeParameters {
    /// Map four validated steps and fit the result into `duration`.
    pub fn from_steps(attack: u8, decay: u8, sustain: u8, release: u8, duration: f64) -> Self {
        Self::fitted(
            step_to_seconds(attack, MAX_ATTACK_SECS),
            step_to_seconds(decay, MAX_DECAY_SECS),
            step_to_level(sustain),
            step_to_seconds(release, MAX_RELEASE_SECS),
            duration,
        )
    }

    /// Fit segment times into `duration`.
    ///
    /// The release absorbs any overflow first. If attack and decay alone leave
    /// no room for a minimal release, the release is pinned to that minimum
    /// and attack/decay are scaled down proportionally.
    pub fn fitted(attack: f64, decay: f64, sustain: f64, release: f64, duration: f64) -> Self {
        let total = attack + decay + release;
        if total <= duration {
            return Self {
                attack,
                decay,
                sustain,
                release,
                hold: duration - total,
                compressed: false,
            };
        }

        let floor = MIN_SEGMENT_SECS.min(duration / 3.0);
        let room = duration - attack - decay;
        if room >= floor {
            return Self {
                attack,
                decay,
                sustain,
                release: room,
                hold: 0.0,
                compressed: true,
            };
        }

        let scale = (duration - floor) / (attack + decay);
        Self {
            attack: attack * scale,
            decay: decay * scale,
            sustain,
            release: floor,
            hold: 0.0,
            compressed: true,
        }
    }

    pub fn total(&self) -> f64 {
        self.attack + self.decay + self.hold + self.release
    }
}

/// A single mapped voice, ready for the document builder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceParameters {
    pub oscillator: Oscillator,
    pub pitch: f64,
    pub duration: f64,
    pub cutoff_hz: f64,
    pub envelope: EnvelopeParameters,
}

/// Mapped kick drum: a sine with a falling pitch sweep and soft clipping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KickParameters {
    pub fundamental_hz: f64,
    /// Where the pitch sweep starts, in Hz.
    pub sweep_start_hz: f64,
    /// How long the sweep takes to land on the fundamental.
    pub drop_secs: f64,
    /// Amplitude decay; also the length of the score event.
    pub decay_secs: f64,
    /// Gain applied before `tanh` saturation.
    pub drive: f64,
}

/// Exponential map of a step onto `[MIN_SEGMENT_SECS, max]` seconds.
pub fn step_to_seconds(step: u8, max: f64) -> f64 {
    match step {
        0 => MIN_SEGMENT_SECS,
        u8::MAX => max,
        _ => MIN_SEGMENT_SECS * (max / MIN_SEGMENT_SECS).powf(f64::from(step) / 255.0),
    }
}

/// Linear map of a step onto `0.0..=1.0`.
pub fn step_to_level(step: u8) -> f64 {
    f64::from(step) / 255.0
}

/// Linear map of a step onto `from..=to` (either direction).
pub fn step_to_range(step: u8, (from, to): (f64, f64)) -> f64 {
    from + (to - from) * step_to_level(step)
}

pub fn map_synthesis(request: &SynthesisRequest) -> Result<VoiceParameters, ValidationError> {
    let pitch = frequency("pitch", request.pitch)?;
    let duration = note_duration("duration", request.duration)?;
    let cutoff_hz = frequency("cutoff_hz", request.cutoff_hz)?;
    let attack = step("attack", request.attack)?;
    let decay = step("decay", request.decay)?;
    let sustain = step("sustain", request.sustain)?;
    let release = step("release", request.release)?;

    Ok(VoiceParameters {
        oscillator: Oscillator::Sawtooth,
        pitch,
        duration,
        cutoff_hz,
        envelope: EnvelopeParameters::from_steps(attack, decay, sustain, release, duration),
    })
}

pub fn map_tone(request: &ToneRequest) -> Result<VoiceParameters, ValidationError> {
    let pitch = frequency("pitch", request.pitch)?;
    let duration = note_duration("duration", request.duration)?;
    let (attack, decay, sustain, release) = TONE_ENVELOPE;

    Ok(VoiceParameters {
        oscillator: Oscillator::Sine,
        pitch,
        duration,
        cutoff_hz: TONE_CUTOFF_HZ,
        envelope: EnvelopeParameters::fitted(attack, decay, sustain, release, duration),
    })
}

pub fn map_kick(request: &KickRequest) -> Result<KickParameters, ValidationError> {
    let fundamental_hz = frequency("fundamental_hz", request.fundamental_hz)?;
    let punch = step("punch", request.punch)?;
    let decay = step("decay", request.decay)?;
    let drive = step("drive", request.drive)?;

    Ok(KickParameters {
        fundamental_hz,
        sweep_start_hz: fundamental_hz + step_to_range(punch, KICK_SWEEP_HZ),
        drop_secs: step_to_range(punch, KICK_DROP_SECS),
        decay_secs: step_to_range(decay, KICK_DECAY_SECS),
        drive: step_to_range(drive, KICK_DRIVE),
    })
}

fn step(field: &str, value: i64) -> Result<u8, ValidationError> {
    u8::try_from(value).map_err(|_| {
        ValidationError::new(
            field,
            format!("must be an integer between 0 and 255, got {value}"),
        )
    })
}

fn positive(field: &str, value: f64) -> Result<f64, ValidationError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ValidationError::new(
            field,
            format!("must be a finite number greater than 0, got {value}"),
        ))
    }
}

fn frequency(field: &str, value: f64) -> Result<f64, ValidationError> {
    let value = positive(field, value)?;
    if value >= NYQUIST_HZ {
        return Err(ValidationError::new(
            field,
            format!("must be below the Nyquist frequency of {NYQUIST_HZ} Hz, got {value}"),
        ));
    }
    Ok(value)
}

fn note_duration(field: &str, value: f64) -> Result<f64, ValidationError> {
    let value = positive(field, value)?;
    if value > MAX_DURATION_SECS {
        return Err(ValidationError::new(
            field,
            format!("must not exceed {MAX_DURATION_SECS} seconds, got {value}"),
        ));
    }
    Ok(value)
}
