//! Line-oriented commands typed at the `todo>` prompt.

use client_core::SortDirection;
use shared::domain::{parse_done, Column, TodoId, UnknownColumn};
use thiserror::Error;

pub const HELP: &str = "\
commands:
  add <title>                  create a todo (empty title is ignored)
  list                         show the current page
  select <id>...               select rows
  unselect <id>...             deselect rows
  select-all                   select every row on the current page
  clear                        clear the selection
  toggle                       flip done on every selected row
  remove                       delete every selected row
  edit <id> <column> <value>   edit a cell (title or done)
  sort <column> [asc|desc]     sort by id, title or done
  unsort                       back to insertion order
  filter [text]                filter titles; no text clears the filter
  filter-done <true|false|any> filter by done
  page <n>                     jump to page n (1-based)
  help                         show this help
  quit                         exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add(String),
    List,
    Select(Vec<TodoId>),
    Unselect(Vec<TodoId>),
    SelectAll,
    ClearSelection,
    Toggle,
    Remove,
    Edit {
        id: TodoId,
        column: Column,
        value: String,
    },
    Sort {
        column: Column,
        direction: SortDirection,
    },
    Unsort,
    Filter(Option<String>),
    FilterDone(Option<bool>),
    Page(usize),
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),
    #[error("'{command}' needs {argument}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },
    #[error("'{0}' is not a todo id")]
    InvalidId(String),
    #[error(transparent)]
    InvalidColumn(#[from] UnknownColumn),
    #[error("'{0}' is not a sort direction (asc or desc)")]
    InvalidDirection(String),
    #[error("'{0}' is not a done filter (true, false or any)")]
    InvalidDoneFilter(String),
    #[error("'{0}' is not a page number")]
    InvalidPage(String),
}

/// Parses one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "add" => Command::Add(rest.to_string()),
        "list" | "ls" => Command::List,
        "select" => Command::Select(parse_ids("select", rest)?),
        "unselect" => Command::Unselect(parse_ids("unselect", rest)?),
        "select-all" => Command::SelectAll,
        "clear" => Command::ClearSelection,
        "toggle" => Command::Toggle,
        "remove" | "rm" => Command::Remove,
        "edit" => parse_edit(rest)?,
        "sort" => parse_sort(rest)?,
        "unsort" => Command::Unsort,
        "filter" => Command::Filter((!rest.is_empty()).then(|| rest.to_string())),
        "filter-done" => Command::FilterDone(parse_done_filter(rest)?),
        "page" => Command::Page(parse_page(rest)?),
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

fn parse_id(raw: &str) -> Result<TodoId, CommandError> {
    raw.parse::<i64>()
        .map(TodoId)
        .map_err(|_| CommandError::InvalidId(raw.to_string()))
}

fn parse_ids(command: &'static str, rest: &str) -> Result<Vec<TodoId>, CommandError> {
    if rest.is_empty() {
        return Err(CommandError::MissingArgument {
            command,
            argument: "at least one id",
        });
    }
    rest.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|part| !part.is_empty())
        .map(parse_id)
        .collect()
}

fn parse_edit(rest: &str) -> Result<Command, CommandError> {
    let missing = |argument| CommandError::MissingArgument {
        command: "edit",
        argument,
    };
    let (id, rest) = next_word(rest).ok_or_else(|| missing("an id"))?;
    let (column, value) = next_word(rest).ok_or_else(|| missing("a column"))?;
    Ok(Command::Edit {
        id: parse_id(id)?,
        column: column.parse()?,
        value: value.to_string(),
    })
}

/// Splits off the first word, skipping any run of whitespace around it.
fn next_word(text: &str) -> Option<(&str, &str)> {
    let text = text.trim_start();
    if text.is_empty() {
        return None;
    }
    Some(match text.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (text, ""),
    })
}

fn parse_sort(rest: &str) -> Result<Command, CommandError> {
    let mut parts = rest.split_whitespace();
    let column = parts.next().ok_or(CommandError::MissingArgument {
        command: "sort",
        argument: "a column",
    })?;
    let direction = match parts.next().map(str::to_ascii_lowercase).as_deref() {
        None | Some("asc") => SortDirection::Ascending,
        Some("desc") => SortDirection::Descending,
        Some(other) => return Err(CommandError::InvalidDirection(other.to_string())),
    };
    Ok(Command::Sort {
        column: column.parse()?,
        direction,
    })
}

fn parse_done_filter(rest: &str) -> Result<Option<bool>, CommandError> {
    if rest.eq_ignore_ascii_case("any") || rest.is_empty() {
        return Ok(None);
    }
    parse_done(rest)
        .map(Some)
        .ok_or_else(|| CommandError::InvalidDoneFilter(rest.to_string()))
}

fn parse_page(rest: &str) -> Result<usize, CommandError> {
    match rest.parse::<usize>() {
        Ok(page) if page >= 1 => Ok(page),
        _ if rest.is_empty() => Err(CommandError::MissingArgument {
            command: "page",
            argument: "a page number",
        }),
        _ => Err(CommandError::InvalidPage(rest.to_string())),
    }
}

#[cfg(test)]
#[path = "tests/commands_tests.rs"]
mod tests;
