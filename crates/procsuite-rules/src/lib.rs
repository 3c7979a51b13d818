//! Data tables behind procsuite's CPT derivation and self-correction:
//! the prioritized CPT rule table, NCCI bundling pairs, per-code keyword
//! guards, and the patch pointer allow-list. Everything here is loaded
//! and validated once at startup; the pipeline never parses tables at
//! request time.

pub mod allowlist;
pub mod condition;
pub mod keywords;
pub mod ncci;
pub mod table;

pub use allowlist::{AllowlistError, PatchAllowlist, MAX_POINTERS};
pub use condition::{resolve_path, Condition};
pub use keywords::KeywordGuards;
pub use ncci::{NcciPair, NcciTable};
pub use table::{
    AnyBronchoscopy, CptRule, PrimaryRequirement, RuleCategory, RuleTable, TableError,
};

/// All rule tables bundled together, as the pipeline consumes them.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    pub rules: RuleTable,
    pub ncci: NcciTable,
    pub keywords: KeywordGuards,
    pub allowlist: PatchAllowlist,
    pub version: String,
}

impl KnowledgeBase {
    /// Built-in tables shipped with the crate.
    pub fn builtin() -> anyhow::Result<Self> {
        let rules = RuleTable::builtin()?;
        let version = rules.version.clone();
        Ok(Self {
            rules,
            ncci: NcciTable::builtin()?,
            keywords: KeywordGuards::builtin()?,
            allowlist: PatchAllowlist::builtin()?,
            version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_knowledge_base_loads() {
        let kb = KnowledgeBase::builtin().unwrap();
        assert_eq!(kb.version, kb.rules.version);
        assert!(!kb.ncci.pairs.is_empty());
    }
}
