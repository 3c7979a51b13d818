use crate::exit_codes;
use procsuite_core::{RegistryService, Settings};
use serde_json::json;

pub(super) async fn run(text: &str, pretty: bool) -> anyhow::Result<i32> {
    let settings = Settings::from_env()?;
    let service = RegistryService::new(settings)?;

    let (record, warnings, meta) = match service.extract_record(text, None).await {
        Ok(parts) => parts,
        Err(e) => {
            eprintln!("pipeline error: {}", e);
            return Ok(exit_codes::PIPELINE_ERROR);
        }
    };

    let output = json!({
        "record": record,
        "warnings": warnings,
        "meta": meta,
    });
    let rendered = if pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        output.to_string()
    };
    println!("{}", rendered);
    Ok(exit_codes::SUCCESS)
}
