pub mod coding;
pub mod hybrid;
pub mod registry;

pub use coding::{CodeSuggestion, CodingResult, CodingService, ReviewFlag};
pub use registry::{ExtractionMeta, ExtractionResult, RegistryService};
