use std::cmp::Ordering;

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

use crate::metacard::{self, AttributeValue, Metacard};

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const RELEVANCE: &str = "RELEVANCE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    Include,
    Exclude,
    Equal {
        attribute: String,
        value: AttributeValue,
    },
    /// Wildcard match: `*` is any run of characters, `?` a single character.
    Like {
        attribute: String,
        pattern: String,
        #[serde(default)]
        case_sensitive: bool,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn equal(attribute: &str, value: impl Into<AttributeValue>) -> Self {
        Filter::Equal {
            attribute: attribute.to_string(),
            value: value.into(),
        }
    }

    pub fn like(attribute: &str, pattern: &str) -> Self {
        Filter::Like {
            attribute: attribute.to_string(),
            pattern: pattern.to_string(),
            case_sensitive: false,
        }
    }

    /// `OR` of equality filters; no values yields a filter that matches nothing.
    pub fn any_of<I>(attribute: &str, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<AttributeValue>,
    {
        let mut filters = values
            .into_iter()
            .map(|value| Filter::equal(attribute, value))
            .collect::<Vec<_>>();
        match filters.len() {
            0 => Filter::Exclude,
            1 => filters.remove(0),
            _ => Filter::Or(filters),
        }
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::And(mut filters) => {
                filters.push(other);
                Filter::And(filters)
            }
            Filter::Include => other,
            current => Filter::And(vec![current, other]),
        }
    }

    pub fn matches(&self, metacard: &Metacard) -> bool {
        match self {
            Filter::Include => true,
            Filter::Exclude => false,
            Filter::Equal { attribute, value } => values_of(metacard, attribute)
                .iter()
                .any(|candidate| candidate.loosely_equals(value)),
            Filter::Like {
                attribute,
                pattern,
                case_sensitive,
            } => {
                let Some(regex) = wildcard_regex(pattern, *case_sensitive) else {
                    return false;
                };
                values_of(metacard, attribute)
                    .iter()
                    .any(|candidate| regex.is_match(&candidate.to_string()))
            }
            Filter::And(filters) => filters.iter().all(|filter| filter.matches(metacard)),
            Filter::Or(filters) => filters.iter().any(|filter| filter.matches(metacard)),
            Filter::Not(filter) => !filter.matches(metacard),
        }
    }

    /// Tag values this filter tests for with equality, anywhere in the tree.
    pub fn tag_values(&self) -> Vec<String> {
        match self {
            Filter::Equal { attribute, value } if attribute == metacard::TAGS => {
                value.as_str().map(|tag| vec![tag.to_string()]).unwrap_or_default()
            }
            Filter::Like {
                attribute, pattern, ..
            } if attribute == metacard::TAGS => vec![pattern.clone()],
            Filter::And(filters) | Filter::Or(filters) => {
                filters.iter().flat_map(Filter::tag_values).collect()
            }
            Filter::Not(filter) => filter.tag_values(),
            _ => Vec::new(),
        }
    }
}

/// Untagged metacards count as carrying the default resource tag.
fn values_of(metacard: &Metacard, attribute: &str) -> Vec<AttributeValue> {
    match metacard.attribute(attribute) {
        Some(values) if !values.is_empty() => values.to_vec(),
        _ if attribute == metacard::TAGS => vec![AttributeValue::from(metacard::DEFAULT_TAG)],
        _ => Vec::new(),
    }
}

fn wildcard_regex(pattern: &str, case_sensitive: bool) -> Option<regex::Regex> {
    let mut expression = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => expression.push_str(".*"),
            '?' => expression.push('.'),
            other => expression.push_str(&regex::escape(&other.to_string())),
        }
    }
    expression.push('$');
    RegexBuilder::new(&expression)
        .case_insensitive(!case_sensitive)
        .build()
        .ok()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortBy {
    pub attribute: String,
    #[serde(default = "default_ascending")]
    pub ascending: bool,
}

fn default_ascending() -> bool {
    true
}

impl SortBy {
    pub fn relevance() -> Self {
        Self {
            attribute: RELEVANCE.to_string(),
            ascending: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub filter: Filter,
    /// One-based index of the first result to return.
    pub start_index: usize,
    /// Zero means no limit.
    pub page_size: usize,
    #[serde(default)]
    pub sort_by: Option<SortBy>,
    #[serde(default)]
    pub requests_total_count: bool,
}

impl Query {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            start_index: 1,
            page_size: DEFAULT_PAGE_SIZE,
            sort_by: None,
            requests_total_count: false,
        }
    }

    pub fn unpaged(filter: Filter) -> Self {
        Self {
            page_size: 0,
            ..Self::new(filter)
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_sort(mut self, sort_by: SortBy) -> Self {
        self.sort_by = Some(sort_by);
        self
    }

    /// Filters, sorts and pages `metacards`; returns the page and the total hit count.
    pub fn apply(&self, metacards: impl IntoIterator<Item = Metacard>) -> (Vec<QueryResult>, u64) {
        let mut results = metacards
            .into_iter()
            .filter(|metacard| self.filter.matches(metacard))
            .map(QueryResult::new)
            .collect::<Vec<_>>();
        let hits = results.len() as u64;
        sort_results(&mut results, self.sort_by.as_ref());
        (self.page(results), hits)
    }

    pub fn page(&self, results: Vec<QueryResult>) -> Vec<QueryResult> {
        let skip = self.start_index.saturating_sub(1);
        let iter = results.into_iter().skip(skip);
        if self.page_size == 0 {
            iter.collect()
        } else {
            iter.take(self.page_size).collect()
        }
    }
}

pub fn sort_results(results: &mut [QueryResult], sort_by: Option<&SortBy>) {
    let Some(sort_by) = sort_by else {
        return;
    };
    results.sort_by(|a, b| {
        let ordering = if sort_by.attribute == RELEVANCE {
            a.relevance
                .unwrap_or(0.0)
                .partial_cmp(&b.relevance.unwrap_or(0.0))
                .unwrap_or(Ordering::Equal)
        } else {
            match (
                a.metacard.first(&sort_by.attribute),
                b.metacard.first(&sort_by.attribute),
            ) {
                (Some(x), Some(y)) => x.compare(y).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        };
        if sort_by.ascending {
            ordering
        } else {
            ordering.reverse()
        }
    });
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub metacard: Metacard,
    #[serde(default)]
    pub relevance: Option<f64>,
    #[serde(default)]
    pub distance_meters: Option<f64>,
}

impl QueryResult {
    pub fn new(metacard: Metacard) -> Self {
        Self {
            metacard,
            relevance: None,
            distance_meters: None,
        }
    }
}
