pub mod audit;
pub mod procedures;
pub mod record;
pub mod schema;

pub use audit::{
    AuditCompareReport, AuditPrediction, CasePredictions, CoderDifficulty, ConfidenceBucket,
    SelfCorrectionMetadata,
};
pub use procedures::{PleuralProcedure, Procedure};
pub use record::{
    Complication, Demographics, EbusGranular, GranularData, ProcedureDetails, ProcedureEntry,
    RegistryRecord, Sedation, SedationAgent, StationSample, StentPlacement, TblbGranular,
    TblbSite, ValvePlacement,
};
pub use schema::RegistrySchema;
