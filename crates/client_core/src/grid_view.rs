//! In-process tabular view: multi-row selection, column sorting, title and
//! done filters, pagination.

use std::{cmp::Ordering, collections::BTreeSet};

use shared::domain::{Column, TodoId, TodoRecord};

use crate::TabularView;

pub const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone)]
pub struct GridView {
    rows: Vec<TodoRecord>,
    selected: BTreeSet<TodoId>,
    sort: Option<(Column, SortDirection)>,
    title_filter: Option<String>,
    done_filter: Option<bool>,
    page_size: usize,
    page: usize,
}

impl Default for GridView {
    fn default() -> Self {
        Self::new()
    }
}

impl GridView {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            rows: Vec::new(),
            selected: BTreeSet::new(),
            sort: None,
            title_filter: None,
            done_filter: None,
            page_size: page_size.max(1),
            page: 0,
        }
    }

    /// Rows exactly as last rendered, in store order.
    pub fn rows(&self) -> &[TodoRecord] {
        &self.rows
    }

    pub fn row(&self, id: TodoId) -> Option<&TodoRecord> {
        self.rows.iter().find(|row| row.id == id)
    }

    /// Returns `false` if no displayed row has this id.
    pub fn select(&mut self, id: TodoId) -> bool {
        if self.row(id).is_none() {
            return false;
        }
        self.selected.insert(id);
        true
    }

    pub fn deselect(&mut self, id: TodoId) -> bool {
        self.selected.remove(&id)
    }

    pub fn toggle_selection(&mut self, id: TodoId) -> bool {
        if self.selected.contains(&id) {
            self.selected.remove(&id);
            false
        } else {
            self.select(id)
        }
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    /// Selects every row on the current page.
    pub fn select_all_visible(&mut self) {
        let ids: Vec<TodoId> = self.visible_rows().iter().map(|row| row.id).collect();
        self.selected.extend(ids);
    }

    pub fn is_selected(&self, id: TodoId) -> bool {
        self.selected.contains(&id)
    }

    pub fn selected_ids(&self) -> Vec<TodoId> {
        self.selected.iter().copied().collect()
    }

    pub fn sort_by(&mut self, column: Column, direction: SortDirection) {
        self.sort = Some((column, direction));
    }

    pub fn clear_sort(&mut self) {
        self.sort = None;
    }

    pub fn sort(&self) -> Option<(Column, SortDirection)> {
        self.sort
    }

    /// Case-insensitive substring match on the title. Empty clears it.
    pub fn set_title_filter(&mut self, filter: Option<&str>) {
        self.title_filter = filter
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_lowercase);
        self.clamp_page();
    }

    pub fn set_done_filter(&mut self, done: Option<bool>) {
        self.done_filter = done;
        self.clamp_page();
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_count(&self) -> usize {
        self.filtered_rows().len().div_ceil(self.page_size).max(1)
    }

    /// Moves to the zero-based page `page`, clamped to the last page.
    pub fn set_page(&mut self, page: usize) -> usize {
        self.page = page;
        self.clamp_page();
        self.page
    }

    /// Rows passing the filters, in display order.
    pub fn filtered_rows(&self) -> Vec<&TodoRecord> {
        let mut rows: Vec<&TodoRecord> = self
            .rows
            .iter()
            .filter(|row| self.matches_filters(row))
            .collect();
        if let Some((column, direction)) = self.sort {
            rows.sort_by(|a, b| {
                let ordering = compare_by(column, a, b);
                match direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                }
            });
        }
        rows
    }

    /// The current page of [`GridView::filtered_rows`].
    pub fn visible_rows(&self) -> Vec<&TodoRecord> {
        self.filtered_rows()
            .into_iter()
            .skip(self.page * self.page_size)
            .take(self.page_size)
            .collect()
    }

    fn matches_filters(&self, row: &TodoRecord) -> bool {
        if let Some(done) = self.done_filter {
            if row.done != done {
                return false;
            }
        }
        match &self.title_filter {
            Some(needle) => row.title.to_lowercase().contains(needle),
            None => true,
        }
    }

    fn clamp_page(&mut self) {
        let last = self.page_count() - 1;
        if self.page > last {
            self.page = last;
        }
    }
}

fn compare_by(column: Column, a: &TodoRecord, b: &TodoRecord) -> Ordering {
    match column {
        Column::Id => a.id.cmp(&b.id),
        Column::Title => a.title.cmp(&b.title),
        Column::Done => a.done.cmp(&b.done),
    }
}

impl TabularView for GridView {
    fn set_rows(&mut self, rows: &[TodoRecord]) {
        self.rows = rows.to_vec();
        let present: BTreeSet<TodoId> = self.rows.iter().map(|row| row.id).collect();
        self.selected.retain(|id| present.contains(id));
        self.clamp_page();
    }

    fn selected_rows(&self) -> Vec<TodoRecord> {
        self.rows
            .iter()
            .filter(|row| self.selected.contains(&row.id))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
#[path = "tests/grid_view_tests.rs"]
mod tests;
