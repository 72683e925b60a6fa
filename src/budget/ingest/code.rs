use once_cell::sync::Lazy;
use regex::Regex;

use crate::budget::ingest::model::{Cell, HierarchicalCode};

/// Number of digits in a level flag.
pub const FLAG_WIDTH: usize = 15;
/// Digits per level inside a level flag.
pub const FLAG_GROUP_WIDTH: usize = 3;

/// Dotted-digit run followed by a dash separator and the description.
///
/// Anchored at the start of the text: a code preceded by anything but
/// whitespace (`ref 4.1 - ajuste`) does not match, so such rows carry no code.
static FREE_TEXT_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*([0-9]+(?:\.[0-9]+)*)\s*-\s*(.*?)\s*$").expect("valid regex"));

/// Rule used to read a code out of a cell. The two encodings are unrelated:
/// `004.001.001 - PAYROLL` text and a 15-digit level flag such as
/// `4001001000000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeRule {
    /// `NNN.NNN.NNN - description` text.
    FreeText,
    /// Integer level flag of up to 15 digits.
    FixedWidth,
}

/// Normalizes a cell with the given rule. Returns `None` on any parse
/// failure.
pub fn normalize_code(input: &Cell, rule: CodeRule) -> Option<HierarchicalCode> {
    match rule {
        CodeRule::FreeText => match input {
            Cell::Text(text) => from_free_text(text),
            _ => None,
        },
        CodeRule::FixedWidth => from_level_flag(input.as_integer()?),
    }
}

/// Splits `"004.001.001 - PAYROLL"` into its raw code text and description.
///
/// The description keeps everything after the first dash that follows the
/// code, trimmed. Returns `None` when the text does not start with a dotted
/// digit run followed by a dash.
pub fn split_free_text(text: &str) -> Option<(&str, &str)> {
    let captures = FREE_TEXT_CODE.captures(text)?;
    let code = captures.get(1)?.as_str();
    let description = captures.get(2).map_or("", |found| found.as_str());
    Some((code, description))
}

/// Free-text rule: extracts the dotted-digit run opening the text and strips
/// leading zeros from each group. Text that does not start with the code,
/// or lacks the dash separator, yields `None`.
pub fn from_free_text(text: &str) -> Option<HierarchicalCode> {
    let (code, _) = split_free_text(text)?;
    HierarchicalCode::from_groups(code.split('.'))
}

/// Fixed-width rule: pads the flag to 15 digits, cuts it into five groups of
/// three and drops trailing `000` groups.
///
/// A flag made only of zero groups yields `None`. Negative flags and flags
/// wider than 15 digits are rejected as well.
pub fn from_level_flag(flag: i64) -> Option<HierarchicalCode> {
    if flag < 0 {
        return None;
    }
    let digits = format!("{flag:0>width$}", width = FLAG_WIDTH);
    if digits.len() != FLAG_WIDTH {
        return None;
    }

    let mut groups: Vec<&str> = (0..FLAG_WIDTH)
        .step_by(FLAG_GROUP_WIDTH)
        .map(|start| &digits[start..start + FLAG_GROUP_WIDTH])
        .collect();
    while groups.last().is_some_and(|group| *group == "000") {
        groups.pop();
    }

    HierarchicalCode::from_groups(groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_text_strips_leading_zeros() {
        let code = normalize_code(&Cell::from("004.001.001.001.003 - X"), CodeRule::FreeText);
        assert_eq!(code.unwrap().to_string(), "4.1.1.1.3");
    }

    #[test]
    fn free_text_tolerates_indentation() {
        let code = from_free_text("    04.01.01.01.04 - GRATIFICAÇÕES").unwrap();
        assert_eq!(code.to_string(), "4.1.1.1.4");
    }

    #[test]
    fn free_text_keeps_zero_groups() {
        assert_eq!(from_free_text("4.000.1 - x").unwrap().to_string(), "4.0.1");
    }

    #[test]
    fn free_text_requires_separator_and_leading_code() {
        assert_eq!(from_free_text("4.1.1 PAYROLL"), None);
        assert_eq!(from_free_text("Account 4.1 - x"), None);
        assert_eq!(from_free_text("ref 4.1 - ajuste"), None);
        assert_eq!(from_free_text("  4.1 - ajuste").map(|code| code.to_string()).as_deref(), Some("4.1"));
        assert_eq!(from_free_text("4..1 - x"), None);
        assert_eq!(normalize_code(&Cell::Number(4.1), CodeRule::FreeText), None);
    }

    #[test]
    fn split_returns_trimmed_description() {
        assert_eq!(
            split_free_text("001.002 -  PRÊMIOS - EXTRA  "),
            Some(("001.002", "PRÊMIOS - EXTRA"))
        );
    }

    #[test]
    fn level_flag_drops_trailing_zero_groups() {
        let code = from_level_flag(1_001_001_000_000).unwrap();
        assert_eq!(code.to_string(), "1.1.1");
        assert_eq!(code.padded(), "001.001.001");
    }

    #[test]
    fn level_flag_keeps_inner_zero_groups() {
        let code = from_level_flag(4_000_002_000_000).unwrap();
        assert_eq!(code.to_string(), "4.0.2");
    }

    #[test]
    fn level_flag_zero_is_absent() {
        assert_eq!(normalize_code(&Cell::Number(0.0), CodeRule::FixedWidth), None);
        assert_eq!(from_level_flag(-5), None);
        assert_eq!(from_level_flag(1_000_000_000_000_000), None);
    }

    #[test]
    fn level_flag_reads_text_cells() {
        let code = normalize_code(&Cell::from("004001000000000"), CodeRule::FixedWidth);
        assert_eq!(code.unwrap().to_string(), "4.1");
    }

    #[test]
    fn level_flag_restores_original_padding() {
        for flag in [
            1_i64,
            999_999_999_999_999,
            1_001_001_000_000,
            4_000_002_000_000,
            12_000_000_000_000,
            7_000,
        ] {
            let code = from_level_flag(flag).unwrap();
            let mut padded: Vec<String> = code.groups().map(|group| format!("{group:0>3}")).collect();
            padded.resize(FLAG_WIDTH / FLAG_GROUP_WIDTH, "000".to_string());
            assert_eq!(padded.concat(), format!("{flag:015}"));
        }
    }
}
