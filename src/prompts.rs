//! Instructions sent to the document-understanding backend.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — changing what the model is asked to
//!    extract requires editing exactly one place.
//!
//! 2. **Testability** — unit tests can build and inspect the instruction
//!    without calling a real model.
//!
//! The fund list inside the instruction is rendered from the
//! [`FundRegistry`], so the model is only ever told about funds the
//! validator will accept.

use crate::registry::FundRegistry;
use std::fmt::Write;

const INSTRUCTION_HEADER: &str = r#"Analyse this PDF. It contains a table with the daily unit value and returns of investment funds.

IMPORTANT: extract data ONLY for the funds listed below and return ONLY a JSON array, with no comments or descriptions.

Funds to look for, with their IDs:"#;

const INSTRUCTION_RULES: &str = r#"For every fund found, extract:
- The report date (from the document title)
- The unit value (second column, "Valor de la Unidad")

Return ONLY this JSON format (no additional text):"#;

const INSTRUCTION_FOOTER: &str = r#"IMPORTANT:
- Use the exact prices from the "Valor de la Unidad" column, with every decimal digit
- Use the exact date from the document title, formatted YYYY-MM-DD
- Return only the JSON array, without explanations
- If a fund is not found, omit it from the array"#;

/// Build the extraction instruction for the given registry.
///
/// The example array uses the real fund identifiers with placeholder values
/// so the model sees the exact key names (`fundId`, `date`, `price`) it must
/// emit.
pub fn extraction_instruction(registry: &FundRegistry) -> String {
    let mut out = String::with_capacity(1536);
    out.push_str(INSTRUCTION_HEADER);
    out.push('\n');
    for (i, fund) in registry.iter().enumerate() {
        let _ = writeln!(out, "{}. \"{}\" -> ID: \"{}\"", i + 1, fund.name, fund.id);
    }
    out.push('\n');
    out.push_str(INSTRUCTION_RULES);
    out.push_str("\n[\n");
    let count = registry.len();
    for (i, fund) in registry.iter().enumerate() {
        let sep = if i + 1 < count { "," } else { "" };
        let _ = writeln!(
            out,
            "  {{ \"fundId\": \"{}\", \"date\": \"2025-06-18\", \"price\": 1234.5489 }}{}",
            fund.id, sep
        );
    }
    out.push_str("]\n\n");
    out.push_str(INSTRUCTION_FOOTER);
    out
}

/// Trivial prompt used to confirm that backend credentials work.
pub const CONNECTION_CHECK_PROMPT: &str = "Reply with exactly: connection ok";
