//! Query-key composition.
//!
//! A [`QueryKey`] is the identity of one search/filter/sort state. Two
//! states that would send different queries to the server get different
//! keys; two states that would send the same query compare equal. Listings
//! use the key as their invalidation boundary: when it changes, every loaded
//! page is discarded and pagination restarts from the first page.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use jiff::Span;
use jiff::civil::Date;

use crate::error::DocketError;

use super::sort::SortSpec;

/// Upper bound for `last-N-days` presets.
const MAX_PRESET_DAYS: u32 = 36_500;

/// Inclusive date range on a listing's date column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DateRange {
    pub from: Option<Date>,
    pub to: Option<Date>,
}

impl DateRange {
    pub fn new(from: Option<Date>, to: Option<Date>) -> Self {
        Self { from, to }
    }

    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    pub fn contains(&self, date: Date) -> bool {
        self.from.is_none_or(|from| date >= from) && self.to.is_none_or(|to| date <= to)
    }
}

/// Relative date selections offered by the filter UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DatePreset {
    #[default]
    Any,
    LastDays(u32),
    Year(i16),
}

impl DatePreset {
    /// Resolve against `today` into a concrete range, `None` for [`DatePreset::Any`].
    pub fn resolve(self, today: Date) -> Option<DateRange> {
        match self {
            DatePreset::Any => None,
            DatePreset::LastDays(days) => {
                let days = i64::from(days.min(MAX_PRESET_DAYS));
                let from = today.saturating_sub(Span::new().days(days));
                Some(DateRange::new(Some(from), Some(today)))
            }
            DatePreset::Year(year) => {
                let from = Date::new(year, 1, 1).ok()?;
                let to = Date::new(year, 12, 31).ok()?;
                Some(DateRange::new(Some(from), Some(to)))
            }
        }
    }
}

impl fmt::Display for DatePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatePreset::Any => write!(f, "any"),
            DatePreset::LastDays(days) => write!(f, "last-{days}-days"),
            DatePreset::Year(year) => write!(f, "year:{year}"),
        }
    }
}

impl FromStr for DatePreset {
    type Err = DocketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        let invalid = || DocketError::InvalidDatePreset(s.to_string());

        if lower == "any" {
            return Ok(DatePreset::Any);
        }
        if let Some(days) = lower
            .strip_prefix("last-")
            .and_then(|rest| rest.strip_suffix("-days"))
        {
            let days: u32 = days.parse().map_err(|_| invalid())?;
            if days == 0 || days > MAX_PRESET_DAYS {
                return Err(invalid());
            }
            return Ok(DatePreset::LastDays(days));
        }
        if let Some(year) = lower.strip_prefix("year:") {
            let year: i16 = year.parse().map_err(|_| invalid())?;
            if !(1..=9999).contains(&year) {
                return Err(invalid());
            }
            return Ok(DatePreset::Year(year));
        }
        Err(invalid())
    }
}

/// The user-controlled state behind one listing.
///
/// `filters` maps a category column to the set of accepted values. An empty
/// set means "no restriction" and is dropped when the key is composed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingParams {
    pub search: String,
    pub filters: BTreeMap<String, BTreeSet<String>>,
    pub sort: SortSpec,
    pub date_range: Option<DateRange>,
}

impl ListingParams {
    pub fn with_search(mut self, search: &str) -> Self {
        self.search = search.to_string();
        self
    }

    pub fn with_filter<I, S>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_filter(column, values);
        self
    }

    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_date_range(mut self, range: Option<DateRange>) -> Self {
        self.date_range = range;
        self
    }

    /// Replace the accepted values for `column`.
    pub fn set_filter<I, S>(&mut self, column: &str, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            self.filters.remove(column);
        } else {
            self.filters.insert(column.to_string(), values);
        }
    }

    /// Non-empty filter selections in column order.
    pub fn active_filters(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.filters
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(column, values)| (column.as_str(), values))
    }
}

/// Value-equality identity of one listing state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    relation: String,
    search: String,
    filters: Vec<(String, Vec<String>)>,
    sort: SortSpec,
    date_range: Option<DateRange>,
}

impl QueryKey {
    /// Compose the key for `params` against `relation`. Performs no I/O.
    pub fn compose(relation: &str, params: &ListingParams) -> Self {
        let filters = params
            .active_filters()
            .map(|(column, values)| (column.to_string(), values.iter().cloned().collect()))
            .collect();

        Self {
            relation: relation.to_string(),
            search: params.search.trim().to_string(),
            filters,
            sort: params.sort,
            date_range: params.date_range.filter(|r| !r.is_unbounded()),
        }
    }

    pub fn relation(&self) -> &str {
        &self.relation
    }

    pub fn search(&self) -> &str {
        &self.search
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[sort={}", self.relation, self.sort)?;
        if !self.search.is_empty() {
            write!(f, " search={:?}", self.search)?;
        }
        for (column, values) in &self.filters {
            write!(f, " {column}={}", values.join("|"))?;
        }
        if let Some(range) = &self.date_range {
            let from = range.from.map(|d| d.to_string()).unwrap_or_default();
            let to = range.to.map(|d| d.to_string()).unwrap_or_default();
            write!(f, " date={from}..{to}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use jiff::civil::date;

    use super::*;
    use crate::query::sort::{SortDirection, SortField};

    fn electric() -> ListingParams {
        ListingParams::default()
            .with_filter("industry", ["Electric"])
            .with_sort(SortSpec::new(SortField::OpenedDate, SortDirection::Desc))
    }

    #[test]
    fn test_identical_states_compose_equal_keys() {
        assert_eq!(
            QueryKey::compose("dockets", &electric()),
            QueryKey::compose("dockets", &electric())
        );
    }

    #[test]
    fn test_selection_order_does_not_matter() {
        let a = ListingParams::default().with_filter("industry", ["Gas", "Electric"]);
        let b = ListingParams::default().with_filter("industry", ["Electric", "Gas"]);
        assert_eq!(
            QueryKey::compose("dockets", &a),
            QueryKey::compose("dockets", &b)
        );
    }

    #[test]
    fn test_empty_selection_equals_no_selection() {
        let mut params = ListingParams::default();
        params
            .filters
            .insert("industry".to_string(), BTreeSet::new());
        assert_eq!(
            QueryKey::compose("dockets", &params),
            QueryKey::compose("dockets", &ListingParams::default())
        );
    }

    #[test]
    fn test_each_component_changes_the_key() {
        let base = QueryKey::compose("dockets", &electric());

        let searched = electric().with_search("Con Edison");
        assert_ne!(base, QueryKey::compose("dockets", &searched));

        let resorted = electric().with_sort(SortSpec::new(SortField::OpenedDate, SortDirection::Asc));
        assert_ne!(base, QueryKey::compose("dockets", &resorted));

        let dated = electric().with_date_range(Some(DateRange::new(Some(date(2024, 1, 1)), None)));
        assert_ne!(base, QueryKey::compose("dockets", &dated));

        assert_ne!(base, QueryKey::compose("filings", &electric()));
    }

    #[test]
    fn test_unbounded_range_equals_no_range() {
        let unbounded = electric().with_date_range(Some(DateRange::default()));
        assert_eq!(
            QueryKey::compose("dockets", &unbounded),
            QueryKey::compose("dockets", &electric())
        );
    }

    #[test]
    fn test_key_display() {
        let key = QueryKey::compose("dockets", &electric().with_search("grid"));
        assert_eq!(
            key.to_string(),
            "dockets[sort=opened_date:desc search=\"grid\" industry=Electric]"
        );
    }

    #[test]
    fn test_date_preset_parse_and_resolve() {
        let today = date(2024, 6, 15);

        let preset: DatePreset = "last-30-days".parse().unwrap();
        assert_eq!(
            preset.resolve(today),
            Some(DateRange::new(Some(date(2024, 5, 16)), Some(today)))
        );

        let preset: DatePreset = "year:2023".parse().unwrap();
        assert_eq!(
            preset.resolve(today),
            Some(DateRange::new(Some(date(2023, 1, 1)), Some(date(2023, 12, 31))))
        );

        assert_eq!("any".parse::<DatePreset>().unwrap().resolve(today), None);
        assert!("last-0-days".parse::<DatePreset>().is_err());
        assert!("yesterday".parse::<DatePreset>().is_err());
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let range = DateRange::new(Some(date(2024, 1, 1)), Some(date(2024, 1, 31)));
        assert!(range.contains(date(2024, 1, 1)));
        assert!(range.contains(date(2024, 1, 31)));
        assert!(!range.contains(date(2024, 2, 1)));
    }
}
