//! Preflight checks: everything the service would load at startup,
//! checked piecewise so one failure does not hide the rest.

use crate::exit_codes;
use procsuite_core::audit::AuditorService;
use procsuite_core::config::AuditorSource;
use procsuite_core::{RegistrySchema, Settings};
use procsuite_rules::{KnowledgeBase, NcciTable, RuleTable};

struct Check {
    name: &'static str,
    outcome: Result<String, String>,
}

pub(super) fn run() -> anyhow::Result<i32> {
    let mut checks: Vec<Check> = Vec::new();

    let settings = match Settings::from_env() {
        Ok(settings) => {
            checks.push(Check {
                name: "settings",
                outcome: Ok(format!("snapshot {}", settings.snapshot())),
            });
            Some(settings)
        }
        Err(e) => {
            checks.push(Check {
                name: "settings",
                outcome: Err(e.to_string()),
            });
            None
        }
    };

    match KnowledgeBase::builtin() {
        Ok(kb) => checks.push(Check {
            name: "rule tables (builtin)",
            outcome: Ok(format!(
                "{} rules, {} NCCI pairs, {} keyword guards, {} allow-list pointers",
                kb.rules.rules.len(),
                kb.ncci.pairs.len(),
                kb.keywords.keywords.len(),
                kb.allowlist.pointers.len()
            )),
        }),
        Err(e) => checks.push(Check {
            name: "rule tables (builtin)",
            outcome: Err(e.to_string()),
        }),
    }

    if let Some(settings) = &settings {
        if let Some(path) = settings.rules_path.as_deref() {
            checks.push(Check {
                name: "rule tables (override)",
                outcome: RuleTable::load(path)
                    .map(|t| format!("{} rules from {}", t.rules.len(), path.display()))
                    .map_err(|e| e.to_string()),
            });
        }
        if let Some(path) = settings.ncci_path.as_deref() {
            checks.push(Check {
                name: "NCCI table (override)",
                outcome: NcciTable::load(path)
                    .map(|t| format!("{} pairs from {}", t.pairs.len(), path.display()))
                    .map_err(|e| e.to_string()),
            });
        }

        checks.push(Check {
            name: "registry schema",
            outcome: match settings.schema_path.as_deref() {
                Some(path) => RegistrySchema::load(path)
                    .map(|_| format!("external schema {} compiles", path.display()))
                    .map_err(|e| e.to_string()),
                None => RegistrySchema::generated()
                    .map(|_| "generated schema compiles".to_string())
                    .map_err(|e| e.to_string()),
            },
        });

        checks.push(Check {
            name: "audit backend",
            outcome: if settings.auditor_source == AuditorSource::Disabled {
                Ok("disabled by configuration".to_string())
            } else {
                match AuditorService::startup(settings) {
                    Ok(Some(auditor)) => Ok(format!("{} backend ready", auditor.backend_name())),
                    Ok(None) => Ok("disabled by configuration".to_string()),
                    Err(e) => Err(e.to_string()),
                }
            },
        });

        checks.push(Check {
            name: "llm client",
            outcome: if settings.offline_stub {
                Ok("deterministic stub (offline)".to_string())
            } else if settings.openai_api_key.is_some() {
                Ok(format!("openai, model {}", settings.llm_model))
            } else {
                Err("OPENAI_API_KEY missing and PROCSUITE_OFFLINE_STUB is off".to_string())
            },
        });
    }

    let mut failed = false;
    for check in &checks {
        match &check.outcome {
            Ok(detail) => println!("ok   {:<24} {}", check.name, detail),
            Err(detail) => {
                failed = true;
                println!("FAIL {:<24} {}", check.name, detail);
            }
        }
    }

    Ok(if failed {
        exit_codes::CONFIG_ERROR
    } else {
        exit_codes::SUCCESS
    })
}
