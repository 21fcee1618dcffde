//! Per-source file exclusion.
//!
//! Upstream export tools drop scratch files and redundant "pass" copies next
//! to the canonical export. Which prefixes mark a redundant pass is a property
//! of each source and comes from its definition.

use dnr_core::{SourceFile, SourceFormat};
use std::fmt;
use std::path::Path;

/// Why a blob was not ingested
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionReason {
    /// Dot-files and editor/OS leftovers
    Hidden,
    /// Extension does not match the source format
    NotDataFile,
    /// Name starts with a configured duplicate-pass prefix
    DuplicatePass { prefix: String },
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionReason::Hidden => f.write_str("hidden file"),
            ExclusionReason::NotDataFile => f.write_str("not a data file"),
            ExclusionReason::DuplicatePass { prefix } => {
                write!(f, "duplicate export pass ({prefix}*)")
            }
        }
    }
}

/// Exclusion rules of one source
#[derive(Debug, Clone)]
pub struct ExclusionPolicy {
    format: SourceFormat,
    prefixes: Vec<String>,
}

impl ExclusionPolicy {
    pub fn new(format: SourceFormat, prefixes: Vec<String>) -> Self {
        Self { format, prefixes }
    }

    pub fn for_source(source: &SourceFile) -> Self {
        Self::new(source.format, source.exclude_prefixes.clone())
    }

    /// `None` when the file should be ingested
    pub fn check(&self, file_name: &str) -> Option<ExclusionReason> {
        if file_name.starts_with('.') || file_name.starts_with('~') {
            return Some(ExclusionReason::Hidden);
        }
        let has_data_ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                self.format
                    .extensions()
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            });
        if !has_data_ext {
            return Some(ExclusionReason::NotDataFile);
        }
        self.prefixes
            .iter()
            .find(|prefix| file_name.starts_with(prefix.as_str()))
            .map(|prefix| ExclusionReason::DuplicatePass {
                prefix: prefix.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ExclusionPolicy {
        ExclusionPolicy::new(
            SourceFormat::Csv,
            vec!["pass2_".to_string(), "pass3_".to_string()],
        )
    }

    #[test]
    fn test_canonical_pass_kept() {
        assert_eq!(policy().check("contacts_2024.csv"), None);
        assert_eq!(policy().check("CONTACTS.CSV"), None);
    }

    #[test]
    fn test_duplicate_pass_excluded() {
        assert_eq!(
            policy().check("pass2_contacts_2024.csv"),
            Some(ExclusionReason::DuplicatePass {
                prefix: "pass2_".to_string()
            })
        );
    }

    #[test]
    fn test_non_data_files() {
        assert_eq!(policy().check("README.md"), Some(ExclusionReason::NotDataFile));
        assert_eq!(policy().check("contacts"), Some(ExclusionReason::NotDataFile));
        assert_eq!(policy().check(".DS_Store"), Some(ExclusionReason::Hidden));
        assert_eq!(policy().check("~$contacts.csv"), Some(ExclusionReason::Hidden));
    }

    #[test]
    fn test_xml_format() {
        let policy = ExclusionPolicy::new(SourceFormat::Xml, Vec::new());
        assert_eq!(policy.check("export.xml"), None);
        assert_eq!(policy.check("export.csv"), Some(ExclusionReason::NotDataFile));
    }
}
