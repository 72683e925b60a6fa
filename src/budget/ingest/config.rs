use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::budget::ingest::chart::ChartColumns;
use crate::budget::ingest::classify::Columns;
use crate::budget::ingest::error::{IngestError, Result};
use crate::budget::ingest::registry::RegistryProfile;

/// One grouped budget sheet and the company it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetEntry {
    pub name: String,
    pub company: i64,
    /// Whether unit numbers may also appear in the internal-code column.
    #[serde(default = "enabled")]
    pub shifted_markers: bool,
}

fn enabled() -> bool {
    true
}

impl SheetEntry {
    pub fn new(name: impl Into<String>, company: i64) -> Self {
        Self {
            name: name.into(),
            company,
            shifted_markers: true,
        }
    }
}

/// Where the financial budget sheet is and how to read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinancialProfile {
    pub sheet: String,
    /// Company stamped on the records. The sheet covers the whole group, so
    /// the default `0` means none in particular.
    pub company: i64,
    pub columns: Columns,
}

impl Default for FinancialProfile {
    fn default() -> Self {
        Self {
            sheet: "BASE DO ORÇAMENTO FINANCEIRO".into(),
            company: 0,
            columns: Columns::financial(),
        }
    }
}

/// Settings of an import run. Every field has a default, so a configuration
/// file only needs to list what differs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub year: i32,
    pub record_type: String,
    pub history: String,
    pub user_id: i64,
    pub columns: Columns,
    pub sheets: Vec<SheetEntry>,
    pub chart: ChartColumns,
    pub registry: RegistryProfile,
    pub financial: FinancialProfile,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            year: 2026,
            record_type: "Saldo Inicial".into(),
            history: "Saldo inicial previsto".into(),
            user_id: 1,
            columns: Columns::default(),
            sheets: vec![
                SheetEntry::new("Base fixo Distribuidora", 1),
                SheetEntry::new("Base fixo Unibox", 2),
                SheetEntry::new("Base fixo industria Máscara", 3),
                SheetEntry::new("Base fixo Uniplast", 4),
                SheetEntry::new("Base fixo UNIPACK", 7),
            ],
            chart: ChartColumns::default(),
            registry: RegistryProfile::default(),
            financial: FinancialProfile::default(),
        }
    }
}

impl ImportConfig {
    /// Loads a JSON configuration file and checks it.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=9999).contains(&self.year) {
            return Err(IngestError::InvalidConfig(format!(
                "year {} is out of range",
                self.year
            )));
        }
        let mut seen = HashSet::new();
        for sheet in &self.sheets {
            if !seen.insert(sheet.name.as_str()) {
                return Err(IngestError::InvalidConfig(format!(
                    "sheet '{}' is listed twice",
                    sheet.name
                )));
            }
        }
        Ok(())
    }

    pub fn sheet(&self, name: &str) -> Option<&SheetEntry> {
        self.sheets.iter().find(|sheet| sheet.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_files_keep_defaults() {
        let config: ImportConfig = serde_json::from_str(
            r#"{ "year": 2027, "sheets": [{ "name": "Base fixo Unibox", "company": 2 }] }"#,
        )
        .unwrap();

        assert_eq!(config.year, 2027);
        assert_eq!(config.record_type, "Saldo Inicial");
        assert_eq!(config.columns.months[0], 5);
        assert_eq!(config.sheets.len(), 1);
        assert_eq!(config.financial.columns.months[11], 24);
        assert!(config.sheets[0].shifted_markers);
        assert_eq!(config.sheet("Base fixo Unibox").map(|sheet| sheet.company), Some(2));
    }

    #[test]
    fn defaults_cover_every_company_sheet() {
        let config = ImportConfig::default();
        assert_eq!(config.sheet("Base fixo UNIPACK").map(|sheet| sheet.company), Some(7));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn duplicate_sheets_are_rejected() {
        let mut config = ImportConfig::default();
        config.sheets.push(SheetEntry::new("Base fixo Unibox", 9));
        assert!(matches!(config.validate(), Err(IngestError::InvalidConfig(_))));
    }
}
