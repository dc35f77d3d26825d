//! Parser du résumé des groupes :
//!
//! ```text
//! 🟠 59% 🔴 🟠 🟠 🟠 🟠 🟠
//!
//! Група 1: 31% 11:37 📈
//! Група 2: 51% 12:06
//! ```
//!
//! Seuls l'en-tête (pourcentage global) et le couple groupe/pourcentage de
//! chaque ligne sont extraits. Flèches, heures et emojis sont ignorés.

use crate::models::GroupsSummary;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::ops::Range;

static HEADER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([0-9]{1,3})\s*%").unwrap());

static GROUP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?mi)групп?а\s*([0-9]+(?:\.[0-9]+)?)\s*:\s*([0-9]{1,3})\s*%").unwrap());

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupsSummaryParser;

impl GroupsSummaryParser {
    pub fn parse(&self, text: &str) -> Option<GroupsSummary> {
        let mut groups = BTreeMap::new();
        let mut spans: Vec<Range<usize>> = Vec::new();

        for caps in GROUP_RE.captures_iter(text) {
            let (Some(whole), Some(key), Some(pct)) = (caps.get(0), caps.get(1), caps.get(2)) else {
                continue;
            };
            let Ok(pct) = pct.as_str().parse::<u16>() else { continue };
            groups.insert(key.as_str().to_string(), pct);
            spans.push(whole.range());
        }

        GroupsSummary::new(header_percent(text, &spans), groups)
    }
}

/// Premier pourcentage hors des lignes de groupe
fn header_percent(text: &str, group_spans: &[Range<usize>]) -> Option<u16> {
    HEADER_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .find(|m| !group_spans.iter().any(|span| span.contains(&m.start())))
        .and_then(|m| m.as_str().parse().ok())
}
