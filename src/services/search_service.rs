use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::db::{CourseFilter, CourseQuery, CourseStore};
use crate::error::AppError;
use crate::models::Course;
use crate::text::{
    first_alphabetic_substring, first_numeric_substring, normalize_term, query_tokens,
};

/// The match stages of a course search, from most to least specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStage {
    /// Subject code and/or catalog number, e.g. "CS 2110".
    SubjectNumber,
    /// Title contains the whole query.
    ExactTitle,
    /// Title contains every token of the query.
    TitleTokens,
    /// Description contains every token of the query.
    DescriptionTokens,
}

impl MatchStage {
    pub const ALL: [MatchStage; 4] = [
        MatchStage::SubjectNumber,
        MatchStage::ExactTitle,
        MatchStage::TitleTokens,
        MatchStage::DescriptionTokens,
    ];

    /// The conjunctive filters for this stage, or `None` when the stage does
    /// not apply to `query`. `query` is expected to be trimmed.
    pub fn filters(self, query: &str) -> Option<Vec<CourseFilter>> {
        match self {
            MatchStage::SubjectNumber => {
                let mut filters = Vec::with_capacity(2);
                if let Some(alpha) = first_alphabetic_substring(query) {
                    filters.push(CourseFilter::Subject(alpha.to_string()));
                }
                if let Some(number) = first_numeric_substring(query) {
                    filters.push(CourseFilter::CatalogNbr(number.to_string()));
                }
                (!filters.is_empty()).then_some(filters)
            }
            MatchStage::ExactTitle => Some(vec![CourseFilter::Title(query.to_string())]),
            MatchStage::TitleTokens => {
                let tokens = query_tokens(query);
                // A single token is the exact title stage again.
                if tokens.len() < 2 {
                    return None;
                }
                Some(
                    tokens
                        .into_iter()
                        .map(|t| CourseFilter::Title(t.to_string()))
                        .collect(),
                )
            }
            MatchStage::DescriptionTokens => Some(
                query_tokens(query)
                    .into_iter()
                    .map(|t| CourseFilter::Description(t.to_string()))
                    .collect(),
            ),
        }
    }
}

/// Ranked course search within one term.
#[derive(Clone)]
pub struct SearchService {
    store: Arc<dyn CourseStore>,
}

impl SearchService {
    pub fn new(store: Arc<dyn CourseStore>) -> Self {
        Self { store }
    }

    /// Runs the match stages in order, appending each stage's new matches
    /// until `limit` courses are collected. Earlier stages rank higher and no
    /// course appears twice. A failing stage fails the whole search.
    pub async fn search(
        &self,
        term: &str,
        query_text: &str,
        limit: usize,
        skip_related: bool,
    ) -> Result<Vec<Course>, AppError> {
        let term = normalize_term(term);
        let query_text = query_text.trim();

        if term.is_empty() || query_text.is_empty() {
            return Err(AppError::BadRequest(
                "Provide semester and query parameters with this route.".to_string(),
            ));
        }
        if limit == 0 {
            return Err(AppError::BadRequest("limit must be greater than zero".to_string()));
        }

        let mut results: Vec<Course> = Vec::with_capacity(limit);
        let mut seen: HashSet<i64> = HashSet::with_capacity(limit);

        for stage in MatchStage::ALL {
            let remaining = limit - results.len();
            if remaining == 0 {
                break;
            }
            let Some(filters) = stage.filters(query_text) else {
                continue;
            };

            let query = CourseQuery {
                term: term.clone(),
                filters,
                exclude_ids: results.iter().map(|c| c.id).collect(),
                limit: remaining,
                with_related: !skip_related,
            };
            let found = self.store.find_courses(&query).await?;
            debug!(?stage, found = found.len(), remaining, "search stage finished");

            results.extend(
                found
                    .into_iter()
                    .filter(|c| seen.insert(c.id))
                    .take(remaining),
            );
        }

        Ok(results)
    }

    /// [`SearchService::search`] bounded by `timeout`.
    pub async fn search_with_timeout(
        &self,
        timeout: Duration,
        term: &str,
        query_text: &str,
        limit: usize,
        skip_related: bool,
    ) -> Result<Vec<Course>, AppError> {
        tokio::time::timeout(timeout, self.search(term, query_text, limit, skip_related))
            .await
            .map_err(|_| AppError::Timeout)?
    }
}
