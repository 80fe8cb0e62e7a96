use std::fmt::Write as _;

use client_core::{
    BulkReport, CellEdit, ControllerError, GridView, SortDirection, TextInput, TodoController,
};
use shared::domain::TodoId;
use storage::TodoStore;
use tracing::error;

use crate::commands::{Command, HELP};

pub enum Outcome {
    Continue(String),
    Quit,
}

/// The single page: one input field above one grid.
pub struct TodoApp {
    controller: TodoController<TodoStore, GridView>,
    input: TextInput,
}

impl TodoApp {
    pub fn new(controller: TodoController<TodoStore, GridView>) -> Self {
        Self {
            controller,
            input: TextInput::default(),
        }
    }

    pub async fn execute(&mut self, command: Command) -> Result<Outcome, ControllerError> {
        let message = match command {
            Command::Add(title) => {
                self.input.set(title);
                match self.controller.submit(&mut self.input).await? {
                    Some(id) => {
                        self.controller.settle().await?;
                        format!("added #{id}\n{}", self.render().await)
                    }
                    None => "nothing to add: title is empty".to_string(),
                }
            }
            Command::List => {
                self.controller.settle().await?;
                self.render().await
            }
            Command::Select(ids) => {
                let missing = self
                    .controller
                    .with_view(|view| {
                        ids.iter()
                            .copied()
                            .filter(|id| !view.select(*id))
                            .collect::<Vec<_>>()
                    })
                    .await;
                let mut message = self.render().await;
                if !missing.is_empty() {
                    let _ = write!(message, "\nnot shown: {}", join_ids(&missing));
                }
                message
            }
            Command::Unselect(ids) => {
                self.controller
                    .with_view(|view| {
                        for id in &ids {
                            view.deselect(*id);
                        }
                    })
                    .await;
                self.render().await
            }
            Command::SelectAll => {
                self.controller.with_view(GridView::select_all_visible).await;
                self.render().await
            }
            Command::ClearSelection => {
                self.controller.with_view(GridView::clear_selection).await;
                self.render().await
            }
            Command::Toggle => {
                let report = self.controller.toggle_selected().await.finish().await;
                self.after_bulk(report, "toggled").await?
            }
            Command::Remove => {
                let report = self.controller.remove_selected().await.finish().await;
                self.after_bulk(report, "removed").await?
            }
            Command::Edit { id, column, value } => {
                let applied = self
                    .controller
                    .commit_cell_edit(CellEdit { id, column, value })
                    .await?;
                if applied {
                    self.controller.settle().await?;
                    self.render().await
                } else {
                    format!("no todo #{id}")
                }
            }
            Command::Sort { column, direction } => {
                self.controller
                    .with_view(|view| view.sort_by(column, direction))
                    .await;
                self.render().await
            }
            Command::Unsort => {
                self.controller.with_view(GridView::clear_sort).await;
                self.render().await
            }
            Command::Filter(text) => {
                self.controller
                    .with_view(|view| view.set_title_filter(text.as_deref()))
                    .await;
                self.render().await
            }
            Command::FilterDone(done) => {
                self.controller
                    .with_view(|view| view.set_done_filter(done))
                    .await;
                self.render().await
            }
            Command::Page(page) => {
                self.controller
                    .with_view(|view| view.set_page(page - 1))
                    .await;
                self.render().await
            }
            Command::Help => HELP.to_string(),
            Command::Quit => return Ok(Outcome::Quit),
        };
        Ok(Outcome::Continue(message))
    }

    /// The grid shown before the first prompt. A failure is logged and
    /// rendered as an error line instead of the grid.
    pub async fn opening_page(&mut self) -> String {
        match self.execute(Command::List).await {
            Ok(Outcome::Continue(page)) => page,
            Ok(Outcome::Quit) => String::new(),
            Err(err) => {
                error!(error = %err, "initial render failed");
                format!("error: {}", err.report())
            }
        }
    }

    pub async fn shutdown(self) {
        self.controller.store().close().await;
        self.controller.unmount();
    }

    async fn after_bulk(
        &self,
        report: BulkReport,
        verb: &str,
    ) -> Result<String, ControllerError> {
        self.controller.settle().await?;
        let mut message = format!("{verb} {} of {}", report.applied, report.attempted);
        for failure in &report.failures {
            let _ = write!(message, "\n  #{} failed: {}", failure.id, failure.message);
        }
        let _ = write!(message, "\n{}", self.render().await);
        Ok(message)
    }

    async fn render(&self) -> String {
        self.controller.with_view(|view| render_grid(view)).await
    }
}

pub fn render_grid(view: &GridView) -> String {
    let rows = view.visible_rows();
    let id_width = rows
        .iter()
        .map(|row| row.id.to_string().len())
        .max()
        .unwrap_or(0)
        .max(2);

    let mut out = format!("sel  {:>id_width$}  done  title\n", "id");
    for row in &rows {
        let _ = writeln!(
            out,
            "{}  {:>id_width$}  {}   {}",
            if view.is_selected(row.id) { "[x]" } else { "[ ]" },
            row.id.0,
            if row.done { "[x]" } else { "[ ]" },
            row.title,
        );
    }
    if rows.is_empty() {
        out.push_str("(no todos)\n");
    }

    let _ = write!(
        out,
        "page {}/{} | {} shown | {} selected",
        view.page() + 1,
        view.page_count(),
        view.filtered_rows().len(),
        view.selected_ids().len(),
    );
    if let Some((column, direction)) = view.sort() {
        let direction = match direction {
            SortDirection::Ascending => "asc",
            SortDirection::Descending => "desc",
        };
        let _ = write!(out, " | sort: {column} {direction}");
    }
    out
}

fn join_ids(ids: &[TodoId]) -> String {
    ids.iter()
        .map(|id| format!("#{id}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
#[path = "tests/app_tests.rs"]
mod tests;
