//! procsuite-core: the extraction-first registry and CPT coding pipeline
//! for interventional-pulmonology procedure notes.
//!
//! A note flows through the PHI gate, the sectionizer, deterministic and
//! schema-guided extraction, granular-to-aggregate propagation, and the
//! pure CPT derivation engine; an independent RAW-ML auditor cross-checks
//! the result and can trigger a guarded self-correction pass. See
//! [`service::RegistryService`] for the entry points.

pub mod audit;
pub mod config;
pub mod derive;
pub mod errors;
pub mod extract;
pub mod model;
pub mod phi;
pub mod propagate;
pub mod providers;
pub mod sectionizer;
pub mod selfcorrect;
pub mod service;

pub use config::Settings;
pub use errors::{PipelineError, PipelineErrorKind};
pub use model::{RegistryRecord, RegistrySchema};
pub use service::{CodingResult, CodingService, ExtractionResult, RegistryService};
