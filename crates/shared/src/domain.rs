use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(TodoId);

/// One row of the `todos` table. All three fields are always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoRecord {
    pub id: TodoId,
    pub title: String,
    pub done: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Id,
    Title,
    Done,
}

impl Column {
    pub const ALL: [Column; 3] = [Column::Id, Column::Title, Column::Done];

    pub fn as_str(self) -> &'static str {
        match self {
            Column::Id => "id",
            Column::Title => "title",
            Column::Done => "done",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown column '{0}' (expected id, title or done)")]
pub struct UnknownColumn(pub String);

impl FromStr for Column {
    type Err = UnknownColumn;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "id" => Ok(Column::Id),
            "title" => Ok(Column::Title),
            "done" => Ok(Column::Done),
            _ => Err(UnknownColumn(s.to_string())),
        }
    }
}

/// Parses the textual value of a `done` cell.
pub fn parse_done(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" | "x" | "done" => Some(true),
        "false" | "no" | "n" | "0" | "open" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn todo_record_serializes_with_flat_id() {
        let record = TodoRecord {
            id: TodoId(7),
            title: "buy milk".into(),
            done: false,
        };
        let json = serde_json::to_value(&record).expect("json");
        assert_eq!(json["id"], 7);
        assert_eq!(json["title"], "buy milk");
        assert_eq!(json["done"], false);
    }

    #[test]
    fn parses_columns_case_insensitively() {
        assert_eq!("Title".parse::<Column>(), Ok(Column::Title));
        assert_eq!(" done ".parse::<Column>(), Ok(Column::Done));
        assert!("priority".parse::<Column>().is_err());
    }

    #[test]
    fn parses_done_values() {
        assert_eq!(parse_done("TRUE"), Some(true));
        assert_eq!(parse_done("0"), Some(false));
        assert_eq!(parse_done("maybe"), None);
    }
}
