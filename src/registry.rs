//! The fixed registry of funds the report is expected to contain.
//!
//! The registry is configuration data, not inferred: each entry pairs the
//! stable fund identifier used in storage with the canonical name printed in
//! the PDF report. The extraction instruction enumerates exactly these
//! entries and the validator rejects any identifier outside them.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One known fund: storage identifier and the name printed in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownFund {
    pub id: String,
    pub name: String,
}

impl KnownFund {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Ordered set of known funds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FundRegistry {
    funds: Vec<KnownFund>,
}

impl Default for FundRegistry {
    /// The five funds published in the daily "Valor diario de la unidad"
    /// report.
    fn default() -> Self {
        Self::new(vec![
            KnownFund::new(
                "6073f1cf-40df-4999-9df3-0072a673d8d9",
                "FONDO DE INVERSION COLECTIVA ACCIVAL VISTA",
            ),
            KnownFund::new(
                "6073f1cf-40df-4999-9df3-0072a673d8d8",
                "FIC ACCICUENTA CONSERVADOR",
            ),
            KnownFund::new(
                "6073f1cf-40df-4999-9df3-0072a673d8d7",
                "FIC ACCICUENTA MODERADO",
            ),
            KnownFund::new(
                "6073f1cf-40df-4999-9df3-0072a673d8d6",
                "FIC ABIERTO ACCICUENTAMAYOR RIESGO",
            ),
            KnownFund::new(
                "6073f1cf-40df-4999-9df3-0072a673d8d5",
                "FONDO DE INVERSION COLECTIVA ACCIONES USA VOO",
            ),
        ])
    }
}

impl FundRegistry {
    /// Build a registry, dropping later duplicates of an identifier.
    pub fn new(funds: Vec<KnownFund>) -> Self {
        let mut unique: Vec<KnownFund> = Vec::with_capacity(funds.len());
        for fund in funds {
            if !unique.iter().any(|f| f.id == fund.id) {
                unique.push(fund);
            }
        }
        Self { funds: unique }
    }

    /// Load a registry from a JSON file of `[{"id": ..., "name": ...}]`.
    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let unreadable = |detail: String| PipelineError::RegistryUnreadable {
            path: path.to_path_buf(),
            detail,
        };
        let text = std::fs::read_to_string(path).map_err(|e| unreadable(e.to_string()))?;
        let funds: Vec<KnownFund> =
            serde_json::from_str(&text).map_err(|e| unreadable(e.to_string()))?;
        if funds.is_empty() {
            return Err(unreadable("registry contains no funds".into()));
        }
        Ok(Self::new(funds))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<&KnownFund> {
        self.funds.iter().find(|f| f.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &KnownFund> {
        self.funds.iter()
    }

    pub fn len(&self) -> usize {
        self.funds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funds.is_empty()
    }
}
