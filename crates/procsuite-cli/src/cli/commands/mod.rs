mod audit;
mod code;
mod doctor;
mod extract;

use super::args::{Cli, Commands};
use std::io::Read;
use std::path::Path;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Commands::Code {
            note,
            procedure_id,
            procedure_type,
            pretty,
        } => {
            let text = read_note(&note)?;
            code::run(&text, &procedure_id, procedure_type.as_deref(), pretty).await
        }
        Commands::Extract { note, pretty } => {
            let text = read_note(&note)?;
            extract::run(&text, pretty).await
        }
        Commands::Audit { note } => {
            let text = read_note(&note)?;
            audit::run(&text).await
        }
        Commands::Doctor => doctor::run(),
    }
}

fn read_note(path: &Path) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        return Ok(buffer);
    }
    std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read note {}: {}", path.display(), e))
}
