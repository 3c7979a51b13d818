//! Schema-guided LLM extraction.
//!
//! One structured call against the dynamic Registry schema, one repair
//! retry when the output does not validate, then an empty fragment plus
//! a warning. Nothing here ever raises past the orchestrator, and the
//! input type guarantees the model only sees scrubbed text.

use crate::model::RegistrySchema;
use crate::phi::ScrubbedText;
use crate::providers::llm::LlmRuntime;
use serde_json::Value;
use tokio::time::Duration;

const SYSTEM_PROMPT: &str = "You are a clinical registry extraction engine for interventional \
pulmonology procedure notes. Read the note and emit ONLY a JSON object that conforms to the \
provided JSON Schema. Include only fields supported by the note; omit anything not documented. \
Never invent procedures, stations, or devices.";

/// Extract a schema-conforming fragment from the focused note.
/// Always returns a fragment (possibly `{}`) and warnings; no error
/// escapes this function.
pub async fn extract_fragment(
    runtime: &LlmRuntime,
    focused: &ScrubbedText,
    schema: &RegistrySchema,
    timeout_s: u64,
) -> (Value, Vec<String>) {
    let mut warnings = Vec::new();
    let deadline = Duration::from_secs(timeout_s);

    let prompt = build_prompt(focused, schema);
    let response = match runtime
        .call_json_with_timeout(&prompt, Some(SYSTEM_PROMPT), deadline)
        .await
    {
        Ok(response) => response,
        Err(e) => {
            warnings.push(e.as_warning());
            return (Value::Object(Default::default()), warnings);
        }
    };

    match parse_and_validate(&response.text, schema) {
        Ok(fragment) => (fragment, warnings),
        Err(first_failure) => {
            // One repair attempt: show the model its own output and the
            // violations, then give up quietly.
            let repair_prompt = format!(
                "{}\n\nYour previous output was rejected:\n{}\n\nPrevious output:\n{}\n\n\
                 Emit a corrected JSON object that validates against the schema.",
                prompt, first_failure, response.text
            );
            match runtime
                .call_json_with_timeout(&repair_prompt, Some(SYSTEM_PROMPT), deadline)
                .await
            {
                Ok(repaired) => match parse_and_validate(&repaired.text, schema) {
                    Ok(fragment) => (fragment, warnings),
                    Err(second_failure) => {
                        warnings.push(format!(
                            "schema_guided: output invalid after repair retry; using empty fragment ({})",
                            second_failure
                        ));
                        (Value::Object(Default::default()), warnings)
                    }
                },
                Err(e) => {
                    warnings.push(e.as_warning());
                    (Value::Object(Default::default()), warnings)
                }
            }
        }
    }
}

fn build_prompt(focused: &ScrubbedText, schema: &RegistrySchema) -> String {
    format!(
        "JSON Schema:\n{}\n\nProcedure note:\n{}\n\nJSON:",
        schema.document(),
        focused.as_str()
    )
}

fn parse_and_validate(text: &str, schema: &RegistrySchema) -> Result<Value, String> {
    let trimmed = text.trim();
    let json_start = trimmed
        .find('{')
        .ok_or_else(|| "no JSON object start found".to_string())?;
    let fragment: Value = serde_json::Deserializer::from_str(&trimmed[json_start..])
        .into_iter::<Value>()
        .next()
        .ok_or_else(|| "no JSON value found".to_string())?
        .map_err(|e| format!("invalid JSON: {}", e))?;

    if !fragment.is_object() {
        return Err("top-level JSON value is not an object".to_string());
    }
    let violations = schema.violations(&fragment);
    if violations.is_empty() {
        Ok(fragment)
    } else {
        Err(violations.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phi;
    use crate::providers::llm::stub::StubLlm;
    use std::sync::Arc;

    fn runtime(stub: StubLlm) -> LlmRuntime {
        LlmRuntime::new(Arc::new(stub), 2, 5)
    }

    fn scrubbed(text: &str) -> ScrubbedText {
        phi::redact(text).unwrap().scrubbed_text
    }

    #[tokio::test]
    async fn empty_stub_yields_empty_fragment() {
        let schema = RegistrySchema::generated().unwrap();
        let rt = runtime(StubLlm::empty());
        let (fragment, warnings) =
            extract_fragment(&rt, &scrubbed("BAL performed."), &schema, 5).await;
        assert_eq!(fragment, serde_json::json!({}));
        assert!(warnings.is_empty());
    }

    #[tokio::test]
    async fn valid_fragment_passes_through() {
        let schema = RegistrySchema::generated().unwrap();
        let rt = runtime(StubLlm::with_responses(vec![(
            "BAL of the RLL".to_string(),
            r#"{"procedures_performed": {"bal": {"performed": true}}}"#.to_string(),
        )]));
        let (fragment, warnings) =
            extract_fragment(&rt, &scrubbed("BAL of the RLL."), &schema, 5).await;
        assert!(warnings.is_empty());
        assert_eq!(
            fragment["procedures_performed"]["bal"]["performed"],
            serde_json::json!(true)
        );
    }

    #[tokio::test]
    async fn invalid_output_falls_back_after_repair_retry() {
        let schema = RegistrySchema::generated().unwrap();
        let rt = runtime(StubLlm::with_responses(vec![(
            "note".to_string(),
            r#"{"procedures_performed": {"bal": {"performed": "yes"}}}"#.to_string(),
        )]));
        let (fragment, warnings) = extract_fragment(
            &rt,
            &scrubbed("note about a bronchoscopy"),
            &schema,
            5,
        )
        .await;
        assert_eq!(fragment, serde_json::json!({}));
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("repair retry"));
    }

    #[tokio::test]
    async fn non_json_output_contained() {
        let schema = RegistrySchema::generated().unwrap();
        let rt = runtime(StubLlm::with_responses(vec![(
            "note".to_string(),
            "I could not find any procedures.".to_string(),
        )]));
        let (fragment, warnings) =
            extract_fragment(&rt, &scrubbed("note text"), &schema, 5).await;
        assert_eq!(fragment, serde_json::json!({}));
        assert!(!warnings.is_empty());
    }
}
