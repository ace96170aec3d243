//! Sort fields and directions for listings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DocketError;

/// Sort field for docket, filing and organization listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    OpenedDate,
    ClosedDate,
    Title,
    DocketId,
    FiledDate,
    Name,
    /// Derived per-organization count, never sortable server-side
    DocketCount,
}

impl SortField {
    /// All valid string representations of this enum.
    pub const ALL_STRINGS: &[&str] = &[
        "opened_date",
        "closed_date",
        "title",
        "docket_id",
        "filed_date",
        "name",
        "docket_count",
    ];

    /// Column the server sorts by, `None` for client-side aggregates.
    pub fn column(self) -> Option<&'static str> {
        match self {
            SortField::OpenedDate => Some("opened_date"),
            SortField::ClosedDate => Some("closed_date"),
            SortField::Title => Some("docket_title"),
            SortField::DocketId => Some("docket_govid"),
            SortField::FiledDate => Some("filed_date"),
            SortField::Name => Some("name"),
            SortField::DocketCount => None,
        }
    }

    /// Direction used when the user picks this field without one.
    pub fn default_direction(self) -> SortDirection {
        match self {
            SortField::OpenedDate
            | SortField::ClosedDate
            | SortField::FiledDate
            | SortField::DocketCount => SortDirection::Desc,
            SortField::Title | SortField::DocketId | SortField::Name => SortDirection::Asc,
        }
    }
}

enum_display_fromstr!(
    SortField,
    DocketError::invalid_sort_field,
    {
        OpenedDate => "opened_date" | "opened",
        ClosedDate => "closed_date" | "closed",
        Title => "title",
        DocketId => "docket_id" | "govid",
        FiledDate => "filed_date" | "filed",
        Name => "name",
        DocketCount => "docket_count" | "count",
    }
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn reversed(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

enum_display_fromstr!(
    SortDirection,
    DocketError::invalid_sort_direction,
    {
        Asc => "asc" | "ascending",
        Desc => "desc" | "descending",
    }
);

/// Resolved sort: a field plus a direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    /// Sort by `field` in its natural direction.
    pub fn by(field: SortField) -> Self {
        Self::new(field, field.default_direction())
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.field, self.direction)
    }
}

/// Parses `field` or `field:direction`.
impl FromStr for SortSpec {
    type Err = DocketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((field, direction)) => Ok(Self::new(field.parse()?, direction.parse()?)),
            None => Ok(Self::by(s.parse()?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_field_from_str() {
        assert_eq!(
            SortField::from_str("opened_date").unwrap(),
            SortField::OpenedDate
        );
        assert_eq!(SortField::from_str("COUNT").unwrap(), SortField::DocketCount);
        assert_eq!(SortField::from_str("Name").unwrap(), SortField::Name);
    }

    #[test]
    fn test_sort_field_from_str_invalid() {
        assert!(SortField::from_str("priority").is_err());
        assert!(SortField::from_str("").is_err());
    }

    #[test]
    fn test_sort_field_display_matches_all_strings() {
        let displayed = [
            SortField::OpenedDate,
            SortField::ClosedDate,
            SortField::Title,
            SortField::DocketId,
            SortField::FiledDate,
            SortField::Name,
            SortField::DocketCount,
        ]
        .map(|f| f.to_string());
        assert_eq!(displayed.as_slice(), SortField::ALL_STRINGS);
    }

    #[test]
    fn test_docket_count_has_no_server_column() {
        assert_eq!(SortField::DocketCount.column(), None);
        assert_eq!(SortField::Title.column(), Some("docket_title"));
    }

    #[test]
    fn test_sort_spec_parse() {
        let spec: SortSpec = "opened_date:asc".parse().unwrap();
        assert_eq!(spec, SortSpec::new(SortField::OpenedDate, SortDirection::Asc));

        let natural: SortSpec = "name".parse().unwrap();
        assert_eq!(natural.direction, SortDirection::Asc);

        assert!("name:sideways".parse::<SortSpec>().is_err());
    }

    #[test]
    fn test_sort_spec_display_roundtrips() {
        let spec = SortSpec::new(SortField::FiledDate, SortDirection::Desc);
        assert_eq!(spec.to_string(), "filed_date:desc");
        assert_eq!(spec.to_string().parse::<SortSpec>().unwrap(), spec);
    }

    #[test]
    fn test_default_sort_is_newest_first() {
        let spec = SortSpec::default();
        assert_eq!(spec.field, SortField::OpenedDate);
        assert_eq!(spec.direction, SortDirection::Desc);
    }
}
