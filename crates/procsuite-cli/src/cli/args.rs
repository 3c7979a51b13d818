use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "procsuite",
    version,
    about = "Registry extraction and CPT coding for interventional pulmonology notes"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Full coding run: registry record, derived CPT codes, audit, suggestions.
    Code {
        /// Path to the note text file, or '-' for stdin.
        note: PathBuf,
        #[arg(long, default_value = "cli")]
        procedure_id: String,
        #[arg(long)]
        procedure_type: Option<String>,
        /// Pretty-print the JSON output.
        #[arg(long)]
        pretty: bool,
    },
    /// Registry extraction only: record, warnings, meta.
    Extract {
        /// Path to the note text file, or '-' for stdin.
        note: PathBuf,
        #[arg(long)]
        pretty: bool,
    },
    /// Run only the RAW-ML auditor and print per-code buckets.
    Audit {
        /// Path to the note text file, or '-' for stdin.
        note: PathBuf,
    },
    /// Preflight: configuration, rule tables, schema, model bundle.
    Doctor,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn code_subcommand_parses() {
        let cli = Cli::parse_from(["procsuite", "code", "note.txt", "--pretty"]);
        match cli.command {
            Commands::Code { pretty, .. } => assert!(pretty),
            other => panic!("unexpected command {:?}", other),
        }
    }
}
