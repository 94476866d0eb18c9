//! Query parameters of the leads table and the pagination arithmetic derived
//! from them.

use shared::{
    domain::{LeadStatus, PageSize, SortKey},
    protocol::LeadListParams,
};

use crate::error::{ClientError, ClientResult};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeadFilters {
    pub job: Option<String>,
    pub min_score: Option<f64>,
    pub min_age: Option<u32>,
    pub max_age: Option<u32>,
    pub status: Option<LeadStatus>,
}

impl LeadFilters {
    pub fn apply(&mut self, filter: LeadFilter) {
        match filter {
            LeadFilter::Job(value) => {
                self.job = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
            }
            LeadFilter::MinScore(value) => self.min_score = value,
            LeadFilter::MinAge(value) => self.min_age = value,
            LeadFilter::MaxAge(value) => self.max_age = value,
            LeadFilter::Status(value) => self.status = value,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == LeadFilters::default()
    }
}

/// A single filter assignment. `None` clears the filter.
#[derive(Debug, Clone, PartialEq)]
pub enum LeadFilter {
    Job(Option<String>),
    MinScore(Option<f64>),
    MinAge(Option<u32>),
    MaxAge(Option<u32>),
    Status(Option<LeadStatus>),
}

impl LeadFilter {
    pub const NAMES: [&'static str; 5] = ["job", "min_score", "min_age", "max_age", "status"];

    /// Parses `name=value` style input; an empty value clears the filter.
    pub fn parse(name: &str, raw: &str) -> ClientResult<Self> {
        let raw = raw.trim();
        let value = (!raw.is_empty()).then_some(raw);
        let filter = match name.trim() {
            "job" => LeadFilter::Job(value.map(str::to_string)),
            "min_score" => LeadFilter::MinScore(value.map(parse_score).transpose()?),
            "min_age" => LeadFilter::MinAge(value.map(|v| parse_age(name, v)).transpose()?),
            "max_age" => LeadFilter::MaxAge(value.map(|v| parse_age(name, v)).transpose()?),
            "status" => LeadFilter::Status(
                value
                    .map(|v| v.parse::<LeadStatus>())
                    .transpose()
                    .map_err(|e| ClientError::InvalidInput(e.to_string()))?,
            ),
            other => {
                return Err(ClientError::InvalidInput(format!(
                    "unknown filter '{other}' (expected one of {})",
                    Self::NAMES.join(", ")
                )))
            }
        };
        Ok(filter)
    }
}

fn parse_score(raw: &str) -> ClientResult<f64> {
    let score = raw
        .parse::<f64>()
        .map_err(|_| ClientError::InvalidInput(format!("min_score '{raw}' is not a number")))?;
    if !(0.0..=1.0).contains(&score) {
        return Err(ClientError::InvalidInput(format!(
            "min_score {score} is outside 0..=1"
        )));
    }
    Ok(score)
}

fn parse_age(name: &str, raw: &str) -> ClientResult<u32> {
    raw.parse::<u32>()
        .map_err(|_| ClientError::InvalidInput(format!("{name} '{raw}' is not a whole number")))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryState {
    pub page: u64,
    pub limit: PageSize,
    pub sort: SortKey,
    pub filters: LeadFilters,
}

impl QueryState {
    pub fn skip(&self) -> u64 {
        self.page.saturating_mul(self.limit.get())
    }

    pub fn set_filter(&mut self, filter: LeadFilter) {
        self.filters.apply(filter);
        self.page = 0;
    }

    pub fn set_sort(&mut self, sort: SortKey) {
        self.sort = sort;
        self.page = 0;
    }

    pub fn set_limit(&mut self, limit: PageSize) {
        self.limit = limit;
        self.page = 0;
    }

    pub fn to_params(&self) -> LeadListParams {
        LeadListParams {
            skip: self.skip(),
            limit: self.limit.get(),
            sort_by: self.sort,
            job: self.filters.job.clone(),
            min_score: self.filters.min_score,
            min_age: self.filters.min_age,
            max_age: self.filters.max_age,
            status: self.filters.status,
        }
    }
}

/// Visible row range of the table footer ("Showing 21-25 of 25").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub start: u64,
    pub end: u64,
}

impl PageWindow {
    pub fn new(page: u64, limit: PageSize, total: u64) -> Self {
        let limit = limit.get();
        let page = page.min(last_page(limit, total));
        let start = page * limit + 1;
        let end = ((page + 1) * limit).min(total);
        Self {
            page,
            limit,
            total,
            start,
            end,
        }
    }

    pub fn has_next(&self) -> bool {
        self.end < self.total
    }

    pub fn has_previous(&self) -> bool {
        self.page > 0
    }

    pub fn last_page(&self) -> u64 {
        last_page(self.limit, self.total)
    }
}

pub(crate) fn last_page(limit: u64, total: u64) -> u64 {
    if total == 0 || limit == 0 {
        0
    } else {
        (total - 1) / limit
    }
}

#[cfg(test)]
#[path = "tests/query_tests.rs"]
mod tests;
