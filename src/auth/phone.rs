// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Kenyan phone number canonicalization (`2547XXXXXXXX`).

const COUNTRY_CODE: &str = "254";

/// Canonical form of a Kenyan number.
///
/// - `+254712345678` / `254712345678` → `254712345678`
/// - `0712345678` → `254712345678`
/// - `712345678` / `112345678` → `254…`
///
/// Separators (spaces, dashes, parentheses) are dropped. Other shapes come
/// back without separators and simply miss on lookup.
pub fn normalize_phone(input: &str) -> String {
    let digits: String = input
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '+'))
        .collect();

    if let Some(local) = digits.strip_prefix('0') {
        if local.len() == 9 {
            return format!("{COUNTRY_CODE}{local}");
        }
    }
    if digits.len() == 9 && (digits.starts_with('7') || digits.starts_with('1')) {
        return format!("{COUNTRY_CODE}{digits}");
    }
    digits
}
