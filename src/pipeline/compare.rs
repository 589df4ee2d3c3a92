//! Candidate comparison: normalise model output, group agreeing candidates,
//! and attribute the judge's answer back to the option it copied.
//!
//! Nothing here changes what callers receive: the selected text is always
//! the judge's response verbatim. Normalisation only decides *equality*,
//! so that a candidate wrapped in a ```` ```latex ```` fence by one model and
//! bare in the judge's reply still count as the same table.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\n(.*?)\n?```$").unwrap());

static RE_TRAILING_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)[ \t]+$").unwrap());

static RE_TABLE_ENV: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\begin\{(?:tabular\*?|tabularx|longtable|table)\}").unwrap());

/// Canonical form used for comparisons.
///
/// 1. CRLF → LF
/// 2. Strip one outer code fence (with or without a language tag)
/// 3. Trim trailing whitespace on every line
/// 4. Trim leading/trailing blank space of the whole text
pub fn normalize(text: &str) -> String {
    let s = text.replace("\r\n", "\n").replace('\r', "\n");
    let s = s.trim();
    let s = match RE_OUTER_FENCES.captures(s) {
        Some(caps) => caps[1].to_string(),
        None => s.to_string(),
    };
    RE_TRAILING_WS.replace_all(&s, "").trim().to_string()
}

/// Whether the text is blank once normalised (e.g. `""`, `"  \n"`, an empty fence).
pub fn is_blank(text: &str) -> bool {
    normalize(text).is_empty()
}

/// Whether the text contains a LaTeX table environment.
pub fn looks_like_table(text: &str) -> bool {
    RE_TABLE_ENV.is_match(text)
}

/// Find which candidate (0-based) the judge's answer reproduces.
///
/// Exact normalised equality wins; otherwise the first candidate that
/// contains the answer, or is contained in it, is taken. Blank answers and
/// blank candidates never match.
pub fn attribute<S: AsRef<str>>(selected: &str, candidates: &[S]) -> Option<usize> {
    let selected = normalize(selected);
    if selected.is_empty() {
        return None;
    }
    let normalized: Vec<String> = candidates.iter().map(|c| normalize(c.as_ref())).collect();

    if let Some(i) = normalized.iter().position(|c| *c == selected) {
        return Some(i);
    }
    normalized
        .iter()
        .position(|c| !c.is_empty() && (c.contains(&selected) || selected.contains(c.as_str())))
}

/// Group candidates whose normalised text is identical.
///
/// Groups are ordered by first occurrence; indices inside a group ascend.
pub fn agreement_groups<S: AsRef<str>>(candidates: &[S]) -> Vec<Vec<usize>> {
    let mut keys: Vec<String> = Vec::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (i, c) in candidates.iter().enumerate() {
        let key = normalize(c.as_ref());
        match keys.iter().position(|k| *k == key) {
            Some(g) => groups[g].push(i),
            None => {
                keys.push(key);
                groups.push(vec![i]);
            }
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\\begin{tabular}{|l|l|r|}\n\\hline\nItem Code & Item Name & Item Price \\\\\n\\hline\n\\end{tabular}";

    #[test]
    fn strips_latex_fence() {
        let fenced = format!("```latex\n{TABLE}\n```\n");
        assert_eq!(normalize(&fenced), TABLE);
    }

    #[test]
    fn strips_bare_fence_and_crlf() {
        let fenced = format!("```\r\n{}\r\n```", TABLE.replace('\n', "\r\n"));
        assert_eq!(normalize(&fenced), TABLE);
    }

    #[test]
    fn inner_fences_are_kept() {
        let s = "intro\n```\ncode\n```";
        assert_eq!(normalize(s), s);
    }

    #[test]
    fn trailing_whitespace_ignored() {
        assert_eq!(normalize("a  \nb\t\n\n"), "a\nb");
    }

    #[test]
    fn blank_detection() {
        assert!(is_blank(""));
        assert!(is_blank("  \n\t"));
        assert!(is_blank("```\n```"));
        assert!(!is_blank("x"));
    }

    #[test]
    fn table_detection() {
        assert!(looks_like_table(TABLE));
        assert!(looks_like_table("\\begin{longtable}{ll}"));
        assert!(!looks_like_table("Request failed with status code 500: error"));
    }

    #[test]
    fn attribute_exact_match_through_fence() {
        let candidates = vec![
            "\\begin{tabular}{l}A\\end{tabular}".to_string(),
            format!("```latex\n{TABLE}\n```"),
        ];
        assert_eq!(attribute(TABLE, &candidates), Some(1));
    }

    #[test]
    fn attribute_prefers_exact_over_containment() {
        let candidates = ["Item A 1.00 EUR\nTotal 1.00", "Item A 1.00 EUR"];
        assert_eq!(attribute("Item A 1.00 EUR", &candidates), Some(1));
    }

    #[test]
    fn attribute_falls_back_to_containment() {
        let candidates = ["noise", "Here is the table:\n\\begin{tabular}{l}X\\end{tabular}"];
        assert_eq!(
            attribute("\\begin{tabular}{l}X\\end{tabular}", &candidates),
            Some(1)
        );
    }

    #[test]
    fn attribute_blank_answer_is_none() {
        assert_eq!(attribute("   ", &["a", "b"]), None);
        assert_eq!(attribute("zzz", &["", "a"]), None);
    }

    #[test]
    fn groups_identical_outputs() {
        let groups = agreement_groups(&["A", "B", "```\nA\n```", "B ", "C"]);
        assert_eq!(groups, vec![vec![0, 2], vec![1, 3], vec![4]]);
    }
}
