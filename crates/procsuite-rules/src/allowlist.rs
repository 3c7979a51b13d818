//! Pointer allow-list for self-correction patches.
//!
//! The built-in list is fixed at build time. The environment may replace
//! it with a comma-separated pointer list, but the replacement is capped
//! at [`MAX_POINTERS`] entries; a longer list is a configuration error.

use serde::{Deserialize, Serialize};

pub const BUILTIN_PATCH_ALLOWLIST: &str = include_str!("../tables/patch_allowlist.yaml");

/// Hard ceiling on allow-list size, env-provided lists included.
pub const MAX_POINTERS: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum AllowlistError {
    #[error("failed to parse allow-list: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("pointer '{0}' is not a JSON Pointer (must start with '/')")]
    NotAPointer(String),
    #[error("allow-list has {0} pointers, ceiling is {MAX_POINTERS}")]
    TooLarge(usize),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchAllowlist {
    pub pointers: Vec<String>,
}

impl PatchAllowlist {
    pub fn builtin() -> Result<Self, AllowlistError> {
        let list: PatchAllowlist = serde_yaml::from_str(BUILTIN_PATCH_ALLOWLIST)?;
        list.validate()?;
        Ok(list)
    }

    /// Build from a comma-separated pointer list (the env override form).
    pub fn from_csv(csv: &str) -> Result<Self, AllowlistError> {
        let pointers: Vec<String> = csv
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let list = PatchAllowlist { pointers };
        list.validate()?;
        Ok(list)
    }

    fn validate(&self) -> Result<(), AllowlistError> {
        if self.pointers.len() > MAX_POINTERS {
            return Err(AllowlistError::TooLarge(self.pointers.len()));
        }
        for ptr in &self.pointers {
            if !ptr.starts_with('/') {
                return Err(AllowlistError::NotAPointer(ptr.clone()));
            }
        }
        Ok(())
    }

    /// A patch path is permitted when it equals an allowed pointer or
    /// extends one across a `/` boundary.
    pub fn permits(&self, path: &str) -> bool {
        self.pointers.iter().any(|allowed| {
            path == allowed || path.strip_prefix(allowed.as_str()).is_some_and(|rest| {
                rest.starts_with('/')
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_allowlist_parses() {
        let list = PatchAllowlist::builtin().unwrap();
        assert!(list.pointers.len() <= MAX_POINTERS);
        assert!(list.permits("/procedures_performed/linear_ebus/performed"));
    }

    #[test]
    fn prefix_match_requires_separator() {
        let list = PatchAllowlist {
            pointers: vec!["/granular_data/tblb".into()],
        };
        assert!(list.permits("/granular_data/tblb"));
        assert!(list.permits("/granular_data/tblb/sites"));
        assert!(!list.permits("/granular_data/tblb_extra"));
        assert!(!list.permits("/demographics/age_band"));
    }

    #[test]
    fn env_override_is_capped() {
        let csv = (0..MAX_POINTERS + 1)
            .map(|i| format!("/p{}", i))
            .collect::<Vec<_>>()
            .join(",");
        assert!(matches!(
            PatchAllowlist::from_csv(&csv),
            Err(AllowlistError::TooLarge(_))
        ));
    }

    #[test]
    fn non_pointer_rejected() {
        assert!(matches!(
            PatchAllowlist::from_csv("procedures_performed.bal"),
            Err(AllowlistError::NotAPointer(_))
        ));
    }
}
