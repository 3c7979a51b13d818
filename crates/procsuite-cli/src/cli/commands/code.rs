use crate::exit_codes;
use procsuite_core::{CodingService, RegistryService, Settings};

pub(super) async fn run(
    text: &str,
    procedure_id: &str,
    procedure_type: Option<&str>,
    pretty: bool,
) -> anyhow::Result<i32> {
    let settings = Settings::from_env()?;
    let service = CodingService::new(RegistryService::new(settings)?);

    let result = match service
        .generate_result(procedure_id, text, procedure_type)
        .await
    {
        Ok(result) => result,
        Err(e) => {
            eprintln!("pipeline error: {}", e);
            return Ok(exit_codes::PIPELINE_ERROR);
        }
    };

    let needs_review = result
        .suggestions
        .iter()
        .any(|s| s.review_flag == procsuite_core::service::ReviewFlag::Required);

    let output = if pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{}", output);

    Ok(if needs_review {
        exit_codes::NEEDS_REVIEW
    } else {
        exit_codes::SUCCESS
    })
}
