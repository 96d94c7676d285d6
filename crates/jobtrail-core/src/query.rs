//! Read-side query values: filters, ordering, limits.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{JobStatus, SCORE_MAX, SCORE_MIN};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("unknown order field `{0}`")]
    UnknownField(String),
    #[error("unknown sort direction `{0}` (expected ASC or DESC)")]
    UnknownDirection(String),
    #[error("unknown filter `{0}`")]
    UnknownFilter(String),
    #[error("invalid value {value:?} for filter `{field}`")]
    InvalidValue { field: String, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderField {
    CreatedAt,
    UpdatedAt,
    PostedDate,
    Score,
    Status,
    Title,
    Url,
}

impl OrderField {
    pub const ALL: &'static [OrderField] = &[
        OrderField::CreatedAt,
        OrderField::UpdatedAt,
        OrderField::PostedDate,
        OrderField::Score,
        OrderField::Status,
        OrderField::Title,
        OrderField::Url,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderField::CreatedAt => "created_at",
            OrderField::UpdatedAt => "updated_at",
            OrderField::PostedDate => "posted_date",
            OrderField::Score => "score",
            OrderField::Status => "status",
            OrderField::Title => "title",
            OrderField::Url => "url",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// `"<field> [ASC|DESC]"`, ascending when the direction is omitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: OrderField,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(field: OrderField) -> Self {
        Self {
            field,
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: OrderField) -> Self {
        Self {
            field,
            direction: Direction::Desc,
        }
    }
}

impl Default for OrderBy {
    fn default() -> Self {
        OrderBy::desc(OrderField::CreatedAt)
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field.as_str(), self.direction.as_sql())
    }
}

impl FromStr for OrderBy {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let field_text = parts
            .next()
            .ok_or_else(|| QueryError::UnknownField(s.to_string()))?;
        let field = OrderField::ALL
            .iter()
            .copied()
            .find(|f| f.as_str().eq_ignore_ascii_case(field_text))
            .ok_or_else(|| QueryError::UnknownField(field_text.to_string()))?;
        let direction = match parts.next() {
            None => Direction::Asc,
            Some(d) if d.eq_ignore_ascii_case("asc") => Direction::Asc,
            Some(d) if d.eq_ignore_ascii_case("desc") => Direction::Desc,
            Some(d) => return Err(QueryError::UnknownDirection(d.to_string())),
        };
        if let Some(extra) = parts.next() {
            return Err(QueryError::UnknownDirection(extra.to_string()));
        }
        Ok(OrderBy { field, direction })
    }
}

/// Selection over stored jobs. Unset filters do not constrain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub min_score: Option<f64>,
    pub source: Option<String>,
    pub order_by: OrderBy,
    pub limit: Option<u32>,
}

impl JobFilter {
    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = Some(min_score);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn ordered_by(mut self, order_by: OrderBy) -> Self {
        self.order_by = order_by;
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Builds a filter from loose key/value pairs (query strings, CLI).
    /// Empty values are treated as unset.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut filter = JobFilter::default();
        for (key, value) in pairs {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            let invalid = || QueryError::InvalidValue {
                field: key.to_string(),
                value: value.to_string(),
            };
            match key {
                "status" => filter.status = Some(value.parse().map_err(|_| invalid())?),
                "min_score" => {
                    let score: f64 = value.parse().map_err(|_| invalid())?;
                    if !(SCORE_MIN..=SCORE_MAX).contains(&score) {
                        return Err(invalid());
                    }
                    filter.min_score = Some(score);
                }
                "source" => filter.source = Some(value.to_string()),
                "order_by" => filter.order_by = value.parse()?,
                "limit" => filter.limit = Some(value.parse().map_err(|_| invalid())?),
                other => return Err(QueryError::UnknownFilter(other.to_string())),
            }
        }
        Ok(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_field_and_direction() {
        assert_eq!(
            "score DESC".parse::<OrderBy>().unwrap(),
            OrderBy::desc(OrderField::Score)
        );
        assert_eq!(
            "title".parse::<OrderBy>().unwrap(),
            OrderBy::asc(OrderField::Title)
        );
        assert_eq!(
            "Posted_Date asc".parse::<OrderBy>().unwrap(),
            OrderBy::asc(OrderField::PostedDate)
        );
    }

    #[test]
    fn rejects_unknown_fields_and_directions() {
        assert_eq!(
            "salary DESC".parse::<OrderBy>().unwrap_err(),
            QueryError::UnknownField("salary".into())
        );
        assert_eq!(
            "score sideways".parse::<OrderBy>().unwrap_err(),
            QueryError::UnknownDirection("sideways".into())
        );
        assert!("score DESC; DROP TABLE jobs".parse::<OrderBy>().is_err());
        assert!("".parse::<OrderBy>().is_err());
    }

    #[test]
    fn default_order_is_newest_first() {
        assert_eq!(OrderBy::default().to_string(), "created_at DESC");
    }

    #[test]
    fn filter_from_pairs() {
        let filter = JobFilter::from_pairs([
            ("status", "applied"),
            ("min_score", "7"),
            ("source", "builtin.com"),
            ("order_by", "score DESC"),
            ("limit", "5"),
        ])
        .unwrap();
        assert_eq!(filter.status, Some(JobStatus::Applied));
        assert_eq!(filter.min_score, Some(7.0));
        assert_eq!(filter.source.as_deref(), Some("builtin.com"));
        assert_eq!(filter.order_by, OrderBy::desc(OrderField::Score));
        assert_eq!(filter.limit, Some(5));
    }

    #[test]
    fn filter_from_pairs_rejects_unknown_keys_and_bad_values() {
        assert_eq!(
            JobFilter::from_pairs([("salary", "100")]).unwrap_err(),
            QueryError::UnknownFilter("salary".into())
        );
        assert!(matches!(
            JobFilter::from_pairs([("status", "bogus")]).unwrap_err(),
            QueryError::InvalidValue { .. }
        ));
        assert!(matches!(
            JobFilter::from_pairs([("limit", "-1")]).unwrap_err(),
            QueryError::InvalidValue { .. }
        ));
        for score in ["NaN", "inf", "-inf", "10.5", "-1"] {
            assert!(
                matches!(
                    JobFilter::from_pairs([("min_score", score)]).unwrap_err(),
                    QueryError::InvalidValue { .. }
                ),
                "min_score={score}"
            );
        }
        assert_eq!(
            JobFilter::from_pairs([("min_score", "10")]).unwrap().min_score,
            Some(10.0)
        );
    }

    #[test]
    fn empty_values_leave_filters_unset() {
        let filter = JobFilter::from_pairs([("status", ""), ("source", " ")]).unwrap();
        assert_eq!(filter, JobFilter::default());
    }
}
