//! Compiles the free-text search DSL into a [`Filter`].
//!
//! Terms are whitespace separated. `group:value` terms (lowercase letters,
//! digits and dashes on both sides) form one group per prefix; every other
//! term joins the uncategorized group. A leading `+` makes a term required,
//! otherwise it is one of the group's alternatives.

use std::sync::LazyLock;

use common::storage::filter::{Filter, TextField};
use regex::Regex;

const MIN_TERM_CHARS: usize = 2;
const EXACT_PREFIX: char = '+';

static CATEGORY_TERM: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9-]+:[a-z0-9-]+$").ok());

#[derive(Debug, Clone, PartialEq, Eq)]
struct Term<'a> {
    value: &'a str,
    exact: bool,
}

#[derive(Debug, Default)]
struct Group<'a> {
    /// `None` for the uncategorized group.
    category: Option<&'a str>,
    terms: Vec<Term<'a>>,
}

fn category_of(value: &str) -> Option<&str> {
    let pattern = CATEGORY_TERM.as_ref()?;
    if pattern.is_match(value) {
        value.split(':').next()
    } else {
        None
    }
}

fn parse_term(raw: &str) -> Option<Term<'_>> {
    // A lone `+` survives the length rule and asks for an exact match on the
    // empty string, which every package satisfies.
    if raw == "+" {
        return Some(Term {
            value: "",
            exact: true,
        });
    }
    if raw.chars().count() < MIN_TERM_CHARS {
        return None;
    }
    Some(match raw.strip_prefix(EXACT_PREFIX) {
        Some(value) => Term { value, exact: true },
        None => Term {
            value: raw,
            exact: false,
        },
    })
}

fn term_clause(category: Option<&str>, value: &str) -> Filter {
    match category {
        Some(_) => Filter::tag(value),
        None => Filter::Or(vec![
            Filter::text(TextField::Name, value),
            Filter::text(TextField::Description, value),
            Filter::text(TextField::Author, value),
            Filter::tag(value),
        ]),
    }
}

fn group_terms(query: &str) -> Vec<Group<'_>> {
    let mut groups: Vec<Group<'_>> = Vec::new();

    for term in query.split_whitespace().filter_map(parse_term) {
        let category = category_of(term.value);
        match groups.iter_mut().find(|group| group.category == category) {
            Some(group) => group.terms.push(term),
            None => groups.push(Group {
                category,
                terms: vec![term],
            }),
        }
    }
    groups
}

/// Compiles `query` into an AND of required clauses.
///
/// Each exact term is its own conjunct; a group's optional terms are OR-ed
/// into one conjunct. An empty query matches everything.
pub fn compile(query: &str) -> Filter {
    // `*` is the backend wildcard and never user-controlled.
    let query = query.replace('*', " ");
    let mut clauses = Vec::new();

    for group in group_terms(&query) {
        clauses.extend(
            group
                .terms
                .iter()
                .filter(|term| term.exact)
                .map(|term| term_clause(group.category, term.value)),
        );

        let optional: Vec<Filter> = group
            .terms
            .iter()
            .filter(|term| !term.exact)
            .map(|term| term_clause(group.category, term.value))
            .collect();
        if !optional.is_empty() {
            clauses.push(Filter::Or(optional));
        }
    }

    Filter::all(clauses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn uncategorized(value: &str) -> String {
        format!("OR(name~{value}, description~{value}, author~{value}, tags CONTAINS {value})")
    }

    #[test]
    fn mixed_query_groups_terms() {
        let filter = compile("+alpha platform:endstone beta");

        assert_eq!(
            filter.to_string(),
            format!(
                "AND({}, OR({}), OR(tags CONTAINS platform:endstone))",
                uncategorized("alpha"),
                uncategorized("beta")
            )
        );
    }

    #[test]
    fn empty_or_blank_query_matches_everything() {
        assert_eq!(compile(""), Filter::MatchAll);
        assert_eq!(compile("   \t "), Filter::MatchAll);
        assert_eq!(compile("* a"), Filter::MatchAll);
    }

    #[test]
    fn short_terms_are_dropped() {
        assert_eq!(
            compile("x ab").to_string(),
            format!("AND(OR({}))", uncategorized("ab"))
        );
    }

    #[test]
    fn exact_category_term_is_a_single_tag_clause() {
        assert_eq!(
            compile("+type:mod").to_string(),
            "AND(tags CONTAINS type:mod)"
        );
    }

    #[test]
    fn optional_terms_of_one_category_share_a_disjunction() {
        assert_eq!(
            compile("type:mod platform:endstone type:addon +type:world").to_string(),
            "AND(tags CONTAINS type:world, OR(tags CONTAINS type:mod, tags CONTAINS type:addon), \
             OR(tags CONTAINS platform:endstone))"
        );
    }

    #[test]
    fn duplicate_terms_are_kept() {
        let Filter::And(clauses) = compile("beta beta") else {
            panic!("expected a conjunction");
        };
        assert_eq!(
            clauses,
            vec![Filter::Or(vec![
                term_clause(None, "beta"),
                term_clause(None, "beta")
            ])]
        );
    }

    #[test]
    fn wildcards_split_terms() {
        assert_eq!(compile("al*ph"), compile("al ph"));
    }

    #[test]
    fn uppercase_prefix_is_not_a_category() {
        assert_eq!(
            compile("Type:mod").to_string(),
            format!("AND(OR({}))", uncategorized("Type:mod"))
        );
    }

    #[test]
    fn lone_plus_requires_the_empty_string() {
        assert_eq!(
            compile("+").to_string(),
            format!("AND({})", uncategorized(""))
        );
    }
}
