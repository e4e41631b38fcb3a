// Utility helpers for parsing, branch ordering and number formatting.
//
// This module centralizes all the "dirty" cell handling so the loaders can
// assume clean, typed values.
use num_format::{Locale, ToFormattedString};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Display order of branches. Anything not listed sorts after these.
pub const BRANCH_ORDER: [&str; 8] = [
    "중앙", "강북", "서대문", "고양", "의정부", "남양주", "강릉", "원주",
];

/// Literal suffix removed from branch names ("... 지사").
pub const BRANCH_SUFFIX: &str = "지사";

static BRANCH_RANK: Lazy<HashMap<&'static str, usize>> = Lazy::new(|| {
    BRANCH_ORDER
        .iter()
        .enumerate()
        .map(|(i, name)| (*name, i))
        .collect()
});

/// Position of `branch` in [`BRANCH_ORDER`], or `BRANCH_ORDER.len()` when
/// it is not listed.
pub fn branch_rank(branch: &str) -> usize {
    BRANCH_RANK
        .get(branch)
        .copied()
        .unwrap_or(BRANCH_ORDER.len())
}

/// Remove every occurrence of [`BRANCH_SUFFIX`]. Repeats until none is
/// left, so "A지지사사" ends as "A" and not "A지사".
pub fn strip_branch_suffix(raw: &str) -> String {
    let mut s = raw.to_string();
    while s.contains(BRANCH_SUFFIX) {
        s = s.replace(BRANCH_SUFFIX, "");
    }
    s
}

/// Parse a spreadsheet cell into `f64`, forgiving the formatting that shows
/// up in exported reports.
///
/// - Accepts `Option<&str>` so callers can pass through optional fields.
/// - Strips thousands separators (`,`) and percent signs (`%`).
/// - Returns `0.0` for anything missing, unparsable or non-finite.
pub fn parse_number_lenient(s: Option<&str>) -> f64 {
    parse_number(s).unwrap_or(0.0)
}

fn parse_number(s: Option<&str>) -> Option<f64> {
    let cleaned: String = s?.chars().filter(|c| *c != ',' && *c != '%').collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Monthly fees carry thousands separators only; `50%` is not a fee and
/// becomes `0.0`.
pub fn parse_fee(s: &str) -> f64 {
    let cleaned: String = s.chars().filter(|c| *c != ',').collect();
    cleaned
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Coordinates are plain decimals; anything else becomes the `0.0`
/// "no location" sentinel.
pub fn parse_coordinate(s: Option<&str>) -> f64 {
    s.and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Counts are whole and non-negative.
pub fn to_count(v: f64) -> u64 {
    if v <= 0.0 {
        0
    } else {
        v.round() as u64
    }
}

/// Drop the `.0` that numeric round-tripping leaves on identifiers.
pub fn normalize_contract_id(raw: &str) -> String {
    let s = raw.trim();
    s.strip_suffix(".0").unwrap_or(s).to_string()
}

pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

pub fn average(v: &[f64]) -> f64 {
    // Arithmetic mean; returns 0 for an empty slice to avoid NaNs.
    if v.is_empty() {
        return 0.0;
    }
    let sum: f64 = v.iter().copied().sum();
    sum / v.len() as f64
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Format a floating-point value with:
    // - a fixed number of decimal places, and
    // - thousands separators (e.g., `1,234,567.89`).
    let neg = n.is_sign_negative() && n != 0.0;
    let s = format!("{:.*}", decimals, n.abs());
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        if decimals > 0 {
            res.push('.');
            res.push_str(frac);
        }
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    // Counts in console messages (e.g., `9,855 rows loaded`).
    n.to_formatted_string(&Locale::en)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lenient_parse_strips_separators_and_percent() {
        assert_eq!(parse_number_lenient(Some("1,000")), 1000.0);
        assert_eq!(parse_number_lenient(Some(" 5% ")), 5.0);
        assert_eq!(parse_number_lenient(Some("1,234.5")), 1234.5);
        assert_eq!(parse_number_lenient(Some("0.05")), 0.05);
    }

    #[test]
    fn lenient_parse_defaults_to_zero() {
        assert_eq!(parse_number_lenient(None), 0.0);
        assert_eq!(parse_number_lenient(Some("")), 0.0);
        assert_eq!(parse_number_lenient(Some("n/a")), 0.0);
        assert_eq!(parse_number_lenient(Some("NaN")), 0.0);
        assert_eq!(parse_number_lenient(Some("inf")), 0.0);
    }

    #[test]
    fn fees_only_lose_thousands_separators() {
        assert_eq!(parse_fee("150,000"), 150000.0);
        assert_eq!(parse_fee(" 1,200,000 "), 1200000.0);
        assert_eq!(parse_fee("50%"), 0.0);
        assert_eq!(parse_fee(""), 0.0);
        assert_eq!(parse_fee("문의"), 0.0);
    }

    #[test]
    fn coordinates_fall_back_to_sentinel() {
        assert_eq!(parse_coordinate(Some("37.56")), 37.56);
        assert_eq!(parse_coordinate(Some("north")), 0.0);
        assert_eq!(parse_coordinate(None), 0.0);
    }

    #[test]
    fn branch_suffix_is_stripped_everywhere() {
        assert_eq!(strip_branch_suffix("중앙지사"), "중앙");
        assert_eq!(strip_branch_suffix("강북"), "강북");
        assert_eq!(strip_branch_suffix("지사고양지사"), "고양");
        let nested = strip_branch_suffix("원주지지사사");
        assert!(!nested.contains(BRANCH_SUFFIX));
        assert_eq!(strip_branch_suffix(&nested), nested);
    }

    #[test]
    fn unlisted_branches_rank_last() {
        assert_eq!(branch_rank("중앙"), 0);
        assert_eq!(branch_rank("원주"), 7);
        assert_eq!(branch_rank("부산"), BRANCH_ORDER.len());
        assert_eq!(branch_rank(""), BRANCH_ORDER.len());
    }

    #[test]
    fn contract_id_loses_float_artifact() {
        assert_eq!(normalize_contract_id("52308742.0"), "52308742");
        assert_eq!(normalize_contract_id("52308742"), "52308742");
        assert_eq!(normalize_contract_id("1.05"), "1.05");
    }

    #[test]
    fn counts_are_clamped_and_rounded() {
        assert_eq!(to_count(-3.0), 0);
        assert_eq!(to_count(49.6), 50);
    }

    #[test]
    fn number_formatting_uses_thousands_separators() {
        assert_eq!(format_number(1234567.891, 2), "1,234,567.89");
        assert_eq!(format_number(-1500.0, 0), "-1,500");
        assert_eq!(format_number(0.0, 1), "0.0");
        assert_eq!(format_int(9855_u64), "9,855");
    }
}
