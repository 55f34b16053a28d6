//! Expression cleanup for plan text.
//!
//! PostgreSQL prints plan expressions fully qualified, with explicit casts and
//! its internal pattern operators. These helpers bring them back to the shape
//! a person would write, and map expressions onto projection aliases.

use regex::Regex;
use std::sync::OnceLock;

fn qualifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\b(?:[A-Za-z_][A-Za-z0-9_$]*\.)+([A-Za-z_"*])"#).expect("valid regex")
    })
}

fn cast_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?i)::\s*(?:"[^"]*"|[a-z_][a-z0-9_]*)(?:\s+(?:varying|precision|without\s+time\s+zone|with\s+time\s+zone))?(?:\s*\([0-9,\s]*\))?(?:\[\])*"#,
        )
        .expect("valid regex")
    })
}

fn ident_parens_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(^|[^A-Za-z0-9_])\(([A-Za-z_][A-Za-z0-9_]*)\)").expect("valid regex")
    })
}

/// Pattern operators in replacement order (longest first).
const PATTERN_OPERATORS: [(&str, &str); 4] = [
    ("!~~*", "NOT ILIKE"),
    ("~~*", "ILIKE"),
    ("!~~", "NOT LIKE"),
    ("~~", "LIKE"),
];

/// Applies `f` to the parts of `text` that are outside single-quoted literals.
fn map_outside_literals(text: &str, f: impl Fn(&str) -> String) -> String {
    text.split('\'')
        .enumerate()
        .map(|(i, part)| if i % 2 == 0 { f(part) } else { part.to_string() })
        .collect::<Vec<_>>()
        .join("'")
}

/// Removes table qualifiers: `customer.c_custkey` → `c_custkey`.
pub fn strip_qualifiers(text: &str) -> String {
    map_outside_literals(text, |part| {
        qualifier_re().replace_all(part, "$1").into_owned()
    })
}

/// Removes type casts: `'100'::numeric` → `'100'`.
pub fn strip_casts(text: &str) -> String {
    map_outside_literals(text, |part| cast_re().replace_all(part, "").into_owned())
}

/// Unwraps parentheses around a lone identifier: `(c_mktsegment)` → `c_mktsegment`.
fn strip_ident_parens(text: &str) -> String {
    map_outside_literals(text, |part| {
        ident_parens_re().replace_all(part, "$1$2").into_owned()
    })
}

/// Rewrites PostgreSQL's `~~` family into LIKE/ILIKE.
pub fn normalize_operators(text: &str) -> String {
    map_outside_literals(text, |part| {
        PATTERN_OPERATORS
            .iter()
            .fold(part.to_string(), |acc, (op, keyword)| acc.replace(op, keyword))
    })
}

/// Removes parentheses that wrap the whole expression.
pub fn strip_outer_parens(text: &str) -> String {
    let mut current = text.trim();
    while current.starts_with('(') && current.ends_with(')') && wraps_whole(current) {
        current = current[1..current.len() - 1].trim();
    }
    current.to_string()
}

/// Returns true when the opening parenthesis closes at the very end.
fn wraps_whole(text: &str) -> bool {
    let mut depth = 0i32;
    let mut in_literal = false;
    for (i, c) in text.char_indices() {
        match c {
            '\'' => in_literal = !in_literal,
            '(' if !in_literal => depth += 1,
            ')' if !in_literal => {
                depth -= 1;
                if depth == 0 && i != text.len() - 1 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// Full cleanup for conditions (filters, join conditions, index conditions).
pub fn clean_condition(text: &str) -> String {
    let text = strip_qualifiers(text);
    let text = strip_casts(&text);
    let text = strip_ident_parens(&text);
    let text = normalize_operators(&text);
    strip_outer_parens(&text)
}

/// Splits a sort key into its expression and its ordering suffix.
///
/// `(count(*)) DESC NULLS LAST` → (`(count(*))`, ` DESC NULLS LAST`)
pub fn split_sort_key(key: &str) -> (&str, &str) {
    let key = key.trim();
    let upper = key.to_ascii_uppercase();
    let mut cut = key.len();

    for suffix in [" NULLS FIRST", " NULLS LAST"] {
        if upper[..cut].ends_with(suffix) {
            cut -= suffix.len();
            break;
        }
    }
    for suffix in [" DESC", " ASC"] {
        if upper[..cut].ends_with(suffix) {
            cut -= suffix.len();
            break;
        }
    }
    if let Some(pos) = upper[..cut].rfind(" USING ") {
        cut = pos;
    }

    (&key[..cut], &key[cut..])
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Splits a window call at OVER: `rank() OVER (?)` → (`rank()`, `(?)`).
fn split_window(expr: &str) -> Option<(&str, &str)> {
    let lower = expr.to_ascii_lowercase();
    let pos = lower.find(" over ").or_else(|| lower.find(" over("))?;
    Some((expr[..pos].trim(), expr[pos + " over".len()..].trim()))
}

/// Comparison form: lowercase with whitespace collapsed.
fn comparable(expr: &str) -> String {
    expr.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}

/// Plans print window definitions as `OVER (?)` or by window name.
fn opaque_window(expr: &str) -> Option<String> {
    let (call, window) = split_window(expr)?;
    (window == "(?)" || !window.contains('(')).then(|| comparable(call))
}

/// Replaces whole-term, case-insensitive occurrences of `needle` with `replacement`.
pub fn replace_term(haystack: &str, needle: &str, replacement: &str) -> String {
    if needle.is_empty() {
        return haystack.to_string();
    }
    let lower_hay = haystack.to_ascii_lowercase();
    let lower_needle = needle.to_ascii_lowercase();
    let check_start = needle.starts_with(is_ident_char);
    let check_end = needle.ends_with(is_ident_char);

    let mut out = String::with_capacity(haystack.len());
    let mut last = 0;
    let mut from = 0;
    while let Some(found) = lower_hay[from..].find(&lower_needle) {
        let start = from + found;
        let end = start + lower_needle.len();
        let boundary_before = !check_start || !haystack[..start].ends_with(is_ident_char);
        let boundary_after = !check_end || !haystack[end..].starts_with(is_ident_char);
        if boundary_before && boundary_after {
            out.push_str(&haystack[last..start]);
            out.push_str(replacement);
            last = end;
            from = end;
        } else {
            from = start + 1;
            while !haystack.is_char_boundary(from) {
                from += 1;
            }
        }
    }
    out.push_str(&haystack[last..]);
    out
}

/// Ordered mapping from output aliases to the expressions they name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasMap {
    entries: Vec<(String, String)>,
}

impl AliasMap {
    /// Creates an empty alias map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `alias` as a name for `expr`. Identity aliases are ignored and
    /// the first definition of an alias wins.
    pub fn insert(&mut self, alias: impl Into<String>, expr: impl Into<String>) {
        let alias = alias.into();
        let expr = expr.into();
        if alias.eq_ignore_ascii_case(&expr) || self.contains_alias(&alias) {
            return;
        }
        self.entries.push((alias, expr));
    }

    /// Returns true if `alias` has been recorded.
    pub fn contains_alias(&self, alias: &str) -> bool {
        self.entries.iter().any(|(a, _)| a.eq_ignore_ascii_case(alias))
    }

    /// Returns the expression recorded for `alias`.
    pub fn expression(&self, alias: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(a, _)| a.eq_ignore_ascii_case(alias))
            .map(|(_, e)| e.as_str())
    }

    /// Finds the alias whose expression matches `expr`.
    ///
    /// A window call whose definition the plan hides matches by function
    /// call alone, and only when a single window item has that call.
    pub fn lookup(&self, expr: &str) -> Option<&str> {
        let wanted = comparable(expr);
        if let Some((alias, _)) = self.entries.iter().find(|(_, e)| comparable(e) == wanted) {
            return Some(alias);
        }

        let call = opaque_window(expr)?;
        let mut candidates = self.entries.iter().filter(|(_, e)| {
            split_window(e).is_some_and(|(c, _)| comparable(c) == call)
        });
        match (candidates.next(), candidates.next()) {
            (Some((alias, _)), None) => Some(alias),
            _ => None,
        }
    }

    /// Replaces expressions in `text` with their aliases.
    ///
    /// An exact match wins; otherwise every whole-term occurrence of a
    /// non-trivial aliased expression is replaced, longest expression first.
    pub fn substitute(&self, text: &str) -> String {
        if let Some(alias) = self.lookup(text) {
            return alias.to_string();
        }

        let mut by_length: Vec<&(String, String)> = self
            .entries
            .iter()
            .filter(|(_, e)| !e.chars().all(is_ident_char))
            .collect();
        by_length.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

        by_length
            .into_iter()
            .fold(text.to_string(), |acc, (alias, expr)| {
                replace_term(&acc, expr, alias)
            })
    }

    /// Iterates over (alias, expression) pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(a, e)| (a.as_str(), e.as_str()))
    }

    /// Returns true if no aliases are recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
