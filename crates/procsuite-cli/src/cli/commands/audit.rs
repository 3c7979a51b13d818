use crate::exit_codes;
use procsuite_core::{RegistryService, Settings};
use serde_json::json;

pub(super) async fn run(text: &str) -> anyhow::Result<i32> {
    let settings = Settings::from_env()?;
    let service = RegistryService::new(settings)?;

    match service.audit_note(text) {
        Ok(Some(case)) => {
            println!("{}", json!({"backend": case.backend, "predictions": case.predictions}));
            Ok(exit_codes::SUCCESS)
        }
        Ok(None) => {
            eprintln!("auditor disabled (REGISTRY_AUDITOR_SOURCE=disabled)");
            Ok(exit_codes::CONFIG_ERROR)
        }
        Err(e) => {
            eprintln!("audit error: {}", e);
            Ok(exit_codes::PIPELINE_ERROR)
        }
    }
}
