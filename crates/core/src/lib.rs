//! Core library of the reactive parameter engine.
//!
//! The engine turns a stream of audio analysis frames into smoothed band
//! envelopes, layers them on top of user-authored morph weights, and moves
//! the live parameter state between stored presets, either one transition at
//! a time or as an unattended chain. Each module owns one subsystem; the
//! [`ReactiveEngine`] façade wires them together around a single
//! [`LiveState`].

pub mod analysis;
pub mod audio;
pub mod blend;
pub mod chain;
pub mod config;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod events;
pub mod interpolation;
pub mod mapping;
pub mod presets;
pub mod state;
pub mod timeline;

pub use analysis::{compute_rms, BandEnergies, BandEnergyExtractor, SpectrumAnalyser};
pub use audio::AudioHandoff;
pub use blend::{MorphTarget, WeightBlender, WeightVector};
pub use chain::{ChainContext, ChainOptions, ChainProgress, ChainSequencer, ChainStatus};
pub use config::{
    AudioConfig, BlendConfig, ChainConfig, EngineConfig, EnvelopeConfig, InterpolationConfig,
};
pub use engine::ReactiveEngine;
pub use envelope::{Band, BandState, EnvelopeFollower};
pub use error::{ReactiveError, Result};
pub use events::{EngineEvent, EventQueue, SkipDirection};
pub use interpolation::{Easing, InterpolationSession, SessionStatus};
pub use mapping::{
    map_controller_to_parameter, Axis, ControllerBinding, ControllerMap, ParameterPath,
    ParameterUpdate,
};
pub use presets::{ChainDefinition, ChainLibrary, MemoryPresetStore, PresetStore};
pub use state::{Interpolate, Layer, Lighting, LiveState, Rgb, StateSnapshot};
pub use timeline::{Millis, PlaybackClock};
