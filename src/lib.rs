// src/lib.rs
// FOCUS PANEL - SYNTHETIC FOCUS GROUP ENGINE
// Persona synthesis, diversity enforcement and moderated discussion over any text generator.

pub mod brain;
pub mod config;
pub mod error;
pub mod focus_group;
pub mod persona;
pub mod persona_generator;
pub mod reporter;

pub use brain::{build_brain, MockBrain, NetworkBrain, TextGenerator};
pub use config::{AppConfig, LogFormat};
pub use error::{FocusGroupError, LlmError, Result};
pub use focus_group::{
    DiscussionConfig, DiscussionConfigBuilder, DiscussionMessage, DiscussionSimulator,
    DiscussionTranscript, MessageRole, Phase,
};
pub use persona::{DemographicConstraints, DiversityChecker, DiversityReport, DiversityTarget, Persona};
pub use persona_generator::PersonaGenerator;
pub use reporter::{Reporter, TranscriptStats};
