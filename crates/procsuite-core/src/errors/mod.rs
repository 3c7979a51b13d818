//! Pipeline error taxonomy.
//!
//! Contained failures (extractor timeouts, schema mismatches) never
//! surface as errors: they become warning entries on the result. The
//! typed error here is reserved for the failures that abort a request
//! (PHI redaction, derivation) or startup (configuration).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorKind {
    PhiRedactionFailed,
    ExtractorTimeout,
    InvalidExtractorOutput,
    SchemaValidationFailed,
    AuditorUnavailable,
    RateLimited,
    SelfCorrectionRejected,
    Derivation,
    Config,
    Other,
}

#[derive(Debug, Clone)]
pub struct PipelineError {
    pub kind: PipelineErrorKind,
    pub message: String,
    pub component: Option<String>,
    pub status: Option<u16>,
    /// Retry hint surfaced to the caller on upstream rate limits.
    pub retry_after_s: Option<u64>,
    pub detail: Option<String>,
}

impl PipelineError {
    pub fn new(kind: PipelineErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            component: None,
            status: None,
            retry_after_s: None,
            detail: None,
        }
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after_s = Some(seconds);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn phi_redaction_failed(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        Self::new(
            PipelineErrorKind::PhiRedactionFailed,
            "PHI redaction failed; refusing to continue with unscrubbed text",
        )
        .with_component("phi")
        .with_detail(detail)
    }

    pub fn extractor_timeout(component: impl Into<String>, seconds: u64) -> Self {
        let component = component.into();
        Self::new(
            PipelineErrorKind::ExtractorTimeout,
            format!("{} timed out after {}s", component, seconds),
        )
        .with_component(component)
    }

    pub fn invalid_extractor_output(component: impl Into<String>, detail: impl Into<String>) -> Self {
        let component = component.into();
        let detail = detail.into();
        Self::new(
            PipelineErrorKind::InvalidExtractorOutput,
            format!("{} produced unusable output", component),
        )
        .with_component(component)
        .with_detail(detail)
    }

    pub fn schema_validation(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        Self::new(
            PipelineErrorKind::SchemaValidationFailed,
            "extracted fragment does not validate against the registry schema",
        )
        .with_detail(detail)
    }

    pub fn auditor_unavailable(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        Self::new(
            PipelineErrorKind::AuditorUnavailable,
            "RAW-ML auditor unavailable",
        )
        .with_component("audit")
        .with_detail(detail)
    }

    pub fn rate_limited(status: u16, retry_after_s: Option<u64>, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let mut err = Self::new(PipelineErrorKind::RateLimited, "upstream LLM rate limited")
            .with_status(status)
            .with_detail(detail);
        if let Some(seconds) = retry_after_s {
            err = err.with_retry_after(seconds);
        }
        err
    }

    pub fn self_correction_rejected(cpt: impl Into<String>, reason: impl Into<String>) -> Self {
        let cpt = cpt.into();
        let reason = reason.into();
        Self::new(
            PipelineErrorKind::SelfCorrectionRejected,
            format!("SELF_CORRECT_SKIPPED: {}: {}", cpt, reason),
        )
        .with_component("selfcorrect")
    }

    pub fn derivation(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        Self::new(PipelineErrorKind::Derivation, "CPT derivation failed")
            .with_component("derive")
            .with_detail(detail)
    }

    pub fn config(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        Self::new(PipelineErrorKind::Config, detail.clone()).with_detail(detail)
    }

    /// Fatal errors abort the request; everything else is contained as a
    /// warning by the orchestrator.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            PipelineErrorKind::PhiRedactionFailed
                | PipelineErrorKind::Derivation
                | PipelineErrorKind::Config
        )
    }

    /// The warning string a contained error turns into.
    pub fn as_warning(&self) -> String {
        match (&self.component, &self.detail) {
            (Some(component), Some(detail)) => {
                format!("{}: {} ({})", component, self.message, detail)
            }
            (Some(component), None) => format!("{}: {}", component, self.message),
            (None, Some(detail)) => format!("{} ({})", self.message, detail),
            (None, None) => self.message.clone(),
        }
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(detail) = &self.detail {
            if detail != &self.message {
                write!(f, ": {}", detail)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for PipelineError {}
