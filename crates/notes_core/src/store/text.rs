//! `$search` string to FTS5 match expression.
//!
//! # Invariants
//! - Plain terms are OR-ed; any one of them is enough to match.
//! - Quoted phrases are all required.
//! - `-term` and `-"phrase"` exclude matching documents.
//! - Every emitted token is double-quoted, so user input never reaches the
//!   FTS5 grammar as an operator.

#[derive(Debug, Default, PartialEq, Eq)]
struct ParsedSearch {
    terms: Vec<String>,
    phrases: Vec<String>,
    negated: Vec<String>,
}

/// Builds the FTS5 expression for `search`.
///
/// Returns `None` when nothing can match (blank input, or only negations).
pub(crate) fn build_match_expression(search: &str) -> Option<String> {
    let parsed = parse_search(search);

    let mut required = Vec::new();
    if !parsed.terms.is_empty() {
        let any_term = parsed
            .terms
            .iter()
            .map(|term| quote_fts(term))
            .collect::<Vec<_>>()
            .join(" OR ");
        required.push(format!("({any_term})"));
    }
    required.extend(parsed.phrases.iter().map(|phrase| quote_fts(phrase)));

    if required.is_empty() {
        return None;
    }

    let mut expression = format!("({})", required.join(" AND "));
    for excluded in &parsed.negated {
        expression.push_str(" NOT ");
        expression.push_str(&quote_fts(excluded));
    }
    Some(expression)
}

fn parse_search(search: &str) -> ParsedSearch {
    let mut parsed = ParsedSearch::default();
    let mut chars = search.chars().peekable();

    while let Some(&next) = chars.peek() {
        if next.is_whitespace() {
            chars.next();
            continue;
        }

        let negate = next == '-';
        if negate {
            chars.next();
        }

        if chars.peek() == Some(&'"') {
            chars.next();
            let phrase: String = chars.by_ref().take_while(|c| *c != '"').collect();
            let phrase = phrase.split_whitespace().collect::<Vec<_>>().join(" ");
            if phrase.is_empty() {
                continue;
            }
            if negate {
                parsed.negated.push(phrase);
            } else {
                parsed.phrases.push(phrase);
            }
            continue;
        }

        let mut term = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() || c == '"' {
                break;
            }
            term.push(c);
            chars.next();
        }
        if term.is_empty() {
            continue;
        }
        if negate {
            parsed.negated.push(term);
        } else {
            parsed.terms.push(term);
        }
    }

    parsed
}

fn quote_fts(raw: &str) -> String {
    let escaped = raw.replace('"', "\"\"");
    format!("\"{escaped}\"")
}
