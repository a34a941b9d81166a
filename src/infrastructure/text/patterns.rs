//! Obfuscation-tolerant moderation patterns
//!
//! Keyword patterns match leet-speak substitutions ("h@rass"), separator
//! stuffing ("h.a.r.a.s.s"), and an optional trailing token ("harassment"),
//! while refusing matches inside longer alphanumeric runs.

use once_cell::sync::Lazy;
use regex_lite::{Regex, RegexBuilder};
use tracing::warn;

/// Matches when nothing alphanumeric precedes, mirroring a word boundary.
const BOUNDARY_START: &str = "(?:^|[^0-9a-zA-Z])";
const BOUNDARY_END: &str = "(?:[^0-9a-zA-Z]|$)";
const SEPARATORS: &str = "[^0-9a-zA-Z]*";

static MINOR_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(minor|underage|child|kid|teen|13|14|15|16|17)\b").unwrap()
});
static ADULT_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(adult|18\+|18\s*plus|over\s*18|18\s*\+)\b").unwrap());
static RELATIONSHIP_CONTEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(cuddle|cuddling|dating|relationship|boyfriend|girlfriend|bf|gf|romantic|flirt|kiss|sexual|dm|dms|messages|screenshots|evidence|proof|gifting|gifted)\b",
    )
    .unwrap()
});

/// Compiles a scan keyword into an obfuscation-tolerant pattern.
/// Returns `None` for blank keywords or patterns that fail to build.
pub fn compile_keyword_pattern(term: &str) -> Option<Regex> {
    let characters: Vec<char> = term.trim().chars().filter(|c| !c.is_whitespace()).collect();
    if characters.is_empty() {
        return None;
    }
    let mut regex = String::from(BOUNDARY_START);
    for (index, c) in characters.iter().enumerate() {
        push_char_pattern(&mut regex, *c);
        if index < characters.len() - 1 {
            regex.push_str(SEPARATORS);
        }
    }
    // Allow one inflected or compound token after the keyword.
    regex.push_str("(?:");
    regex.push_str(SEPARATORS);
    regex.push_str("[0-9a-zA-Z]+)?");
    regex.push_str(BOUNDARY_END);
    build_case_insensitive(&regex, term)
}

/// Compiles a configured blocked-pattern regex, case-insensitively.
pub fn compile_config_pattern(source: &str) -> Option<Regex> {
    let trimmed = source.trim();
    if trimmed.is_empty() {
        return None;
    }
    build_case_insensitive(trimmed, trimmed)
}

fn build_case_insensitive(regex: &str, origin: &str) -> Option<Regex> {
    match RegexBuilder::new(regex).case_insensitive(true).build() {
        Ok(compiled) => Some(compiled),
        Err(e) => {
            warn!("Invalid moderation pattern ignored: {} ({})", origin, e);
            None
        }
    }
}

/// Common leet-speak substitutions; other characters match literally.
fn push_char_pattern(regex: &mut String, c: char) {
    match c.to_ascii_lowercase() {
        'a' => regex.push_str("[a@]"),
        'e' => regex.push_str("[e3]"),
        'i' => regex.push_str("[i1!]"),
        'o' => regex.push_str("[o0]"),
        's' => regex.push_str("[s5$]"),
        't' => regex.push_str("[t7]"),
        c if c.is_ascii_punctuation() => {
            regex.push('\\');
            regex.push(c);
        }
        c => regex.push(c),
    }
}

/// True when the pattern finds a match in any non-blank candidate.
pub fn matches_any(pattern: &Regex, candidates: &[&str]) -> bool {
    candidates
        .iter()
        .any(|candidate| !candidate.trim().is_empty() && pattern.is_match(candidate))
}

/// Flags messages pairing a minor reference with an adult reference in a
/// relationship context, which no single keyword catches.
pub fn is_age_gap_concern(content: &str, normalized: &str, expanded: &str) -> bool {
    let candidates = [content, normalized, expanded];
    matches_any(&MINOR_REFERENCE, &candidates)
        && matches_any(&ADULT_REFERENCE, &candidates)
        && matches_any(&RELATIONSHIP_CONTEXT, &candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_matches_plain_and_obfuscated_forms() {
        let pattern = compile_keyword_pattern("harass").unwrap();
        assert!(pattern.is_match("please don't harass people"));
        assert!(pattern.is_match("H@RASS"));
        assert!(pattern.is_match("h.a.r.a.s.s"));
    }

    #[test]
    fn keyword_allows_suffix_token() {
        let pattern = compile_keyword_pattern("groom").unwrap();
        assert!(pattern.is_match("grooming behavior"));
        assert!(pattern.is_match("groom"));
    }

    #[test]
    fn keyword_requires_a_boundary_before_the_term() {
        let pattern = compile_keyword_pattern("rat").unwrap();
        assert!(pattern.is_match("sent a rat tool"));
        assert!(!pattern.is_match("celebrate"));
    }

    #[test]
    fn multiword_keyword_tolerates_separators() {
        let pattern = compile_keyword_pattern("free nitro").unwrap();
        assert!(pattern.is_match("FREE-NITRO here"));
        assert!(pattern.is_match("free nitro"));
    }

    #[test]
    fn blank_and_invalid_patterns_are_rejected() {
        assert!(compile_keyword_pattern("   ").is_none());
        assert!(compile_config_pattern("(unclosed").is_none());
        assert!(compile_config_pattern(r"www\.").is_some());
    }

    #[test]
    fn age_gap_heuristic_needs_all_three_signals() {
        assert!(is_age_gap_concern(
            "he is an adult dating a minor, I have screenshots",
            "",
            ""
        ));
        assert!(!is_age_gap_concern("adults only event tonight", "", ""));
        assert!(!is_age_gap_concern("my kid loves this game", "", ""));
    }
}
