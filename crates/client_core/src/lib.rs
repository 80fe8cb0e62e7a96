use std::sync::Arc;

use shared::{
    domain::{parse_done, Column, TodoId, TodoRecord},
    error::{ErrorCode, ErrorReport},
};
use storage::{StorageError, TodoRepository};
use thiserror::Error;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

pub mod grid_view;

pub use grid_view::{GridView, SortDirection, DEFAULT_PAGE_SIZE};

/// Whatever renders the rows and owns the selection.
pub trait TabularView: Send + 'static {
    /// Replaces the displayed rows with a fresh full snapshot.
    fn set_rows(&mut self, rows: &[TodoRecord]);
    /// Currently selected rows, carrying their latest rendered data.
    fn selected_rows(&self) -> Vec<TodoRecord>;
}

/// The single text field new todos are typed into.
pub trait TodoInput {
    fn value(&self) -> Option<String>;
    fn clear(&mut self);
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextInput {
    text: Option<String>,
}

impl TextInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }

    pub fn set(&mut self, text: impl Into<String>) {
        self.text = Some(text.into());
    }
}

impl TodoInput for TextInput {
    fn value(&self) -> Option<String> {
        self.text.clone()
    }

    fn clear(&mut self) {
        self.text = Some(String::new());
    }
}

/// A committed inline edit reported by the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellEdit {
    pub id: TodoId,
    pub column: Column,
    pub value: String,
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("column '{0}' is read-only")]
    ReadOnlyColumn(Column),
    #[error("invalid value '{value}' for column '{column}'")]
    InvalidValue { column: Column, value: String },
    #[error("todo controller is no longer mounted")]
    Unmounted,
}

impl ControllerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ControllerError::Storage(_) | ControllerError::Unmounted => ErrorCode::Storage,
            ControllerError::ReadOnlyColumn(_) => ErrorCode::ReadOnly,
            ControllerError::InvalidValue { .. } => ErrorCode::Validation,
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport::new(self.code(), self.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkAction {
    Toggle,
    Delete,
}

impl BulkAction {
    pub fn as_str(self) -> &'static str {
        match self {
            BulkAction::Toggle => "toggle",
            BulkAction::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkFailure {
    pub id: TodoId,
    pub message: String,
}

/// Outcome of every operation in one bulk action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkReport {
    pub action: BulkAction,
    pub attempted: usize,
    /// Operations that changed a row. The rest either failed or found the
    /// row already gone.
    pub applied: usize,
    pub failures: Vec<BulkFailure>,
}

impl BulkReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// In-flight operations of one bulk action.
///
/// Each row's operation runs as its own task. Dropping the handle detaches
/// them; [`BulkDispatch::finish`] waits for all of them and collects failures.
pub struct BulkDispatch {
    action: BulkAction,
    tasks: Vec<(TodoId, JoinHandle<storage::Result<bool>>)>,
}

impl BulkDispatch {
    pub fn action(&self) -> BulkAction {
        self.action
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub async fn finish(self) -> BulkReport {
        let attempted = self.tasks.len();
        let mut applied = 0;
        let mut failures = Vec::new();
        for (id, task) in self.tasks {
            match task.await {
                Ok(Ok(true)) => applied += 1,
                Ok(Ok(false)) => {}
                Ok(Err(err)) => failures.push(BulkFailure {
                    id,
                    message: err.to_string(),
                }),
                Err(join_err) => failures.push(BulkFailure {
                    id,
                    message: format!("task did not complete: {join_err}"),
                }),
            }
        }
        if !failures.is_empty() {
            warn!(
                action = self.action.as_str(),
                attempted,
                failed = failures.len(),
                "bulk action finished with failures"
            );
        }
        BulkReport {
            action: self.action,
            attempted,
            applied,
            failures,
        }
    }
}

/// Connects a todo table to a view: renders every snapshot the table
/// publishes and turns user gestures into table mutations.
pub struct TodoController<R: TodoRepository, V: TabularView> {
    store: Arc<R>,
    view: Arc<Mutex<V>>,
    rendered: watch::Receiver<u64>,
    render_task: JoinHandle<()>,
}

impl<R: TodoRepository, V: TabularView> TodoController<R, V> {
    /// Renders the current contents into `view` and keeps it up to date
    /// until the controller is unmounted.
    pub async fn mount(store: Arc<R>, mut view: V) -> Result<Self, ControllerError> {
        let mut live = store.live_query().await?;
        let initial = live.current();
        view.set_rows(&initial.todos);

        let view = Arc::new(Mutex::new(view));
        let (rendered_tx, rendered) = watch::channel(initial.revision);
        let render_view = Arc::clone(&view);
        let render_task = tokio::spawn(async move {
            while let Some(snapshot) = live.changed().await {
                render_view.lock().await.set_rows(&snapshot.todos);
                debug!(
                    revision = snapshot.revision,
                    rows = snapshot.todos.len(),
                    "rendered todo snapshot"
                );
                if rendered_tx.send(snapshot.revision).is_err() {
                    break;
                }
            }
        });

        info!(
            revision = initial.revision,
            rows = initial.todos.len(),
            "todo controller mounted"
        );
        Ok(Self {
            store,
            view,
            rendered,
            render_task,
        })
    }

    pub fn store(&self) -> &Arc<R> {
        &self.store
    }

    pub fn is_mounted(&self) -> bool {
        !self.render_task.is_finished()
    }

    /// Runs `f` against the view, e.g. to change the selection.
    pub async fn with_view<T>(&self, f: impl FnOnce(&mut V) -> T) -> T {
        let mut view = self.view.lock().await;
        f(&mut *view)
    }

    /// Revision of the last snapshot pushed into the view.
    pub fn rendered_revision(&self) -> u64 {
        *self.rendered.borrow()
    }

    /// Waits until the view shows every mutation committed so far.
    pub async fn settle(&self) -> Result<(), ControllerError> {
        let target = self.store.revision().await;
        let mut rendered = self.rendered.clone();
        rendered
            .wait_for(|revision| *revision >= target)
            .await
            .map_err(|_| ControllerError::Unmounted)?;
        Ok(())
    }

    /// Creates a todo from the input's text and clears the input. Absent or
    /// empty text leaves both the table and the input untouched.
    pub async fn submit<I>(&self, input: &mut I) -> Result<Option<TodoId>, ControllerError>
    where
        I: TodoInput + ?Sized,
    {
        let Some(title) = input.value().filter(|title| !title.is_empty()) else {
            return Ok(None);
        };
        let created = self.store.create(&title).await;
        input.clear();
        Ok(created?)
    }

    /// Flips `done` on every selected row, one independent task per row.
    pub async fn toggle_selected(&self) -> BulkDispatch {
        let selected = self.view.lock().await.selected_rows();
        let tasks = selected
            .into_iter()
            .map(|row| {
                let store = Arc::clone(&self.store);
                let task = tokio::spawn(async move {
                    let outcome = store.update_done(row.id, !row.done).await;
                    if let Err(err) = &outcome {
                        warn!(todo_id = row.id.0, error = %err, "toggle of selected todo failed");
                    }
                    outcome
                });
                (row.id, task)
            })
            .collect();
        BulkDispatch {
            action: BulkAction::Toggle,
            tasks,
        }
    }

    /// Deletes every selected row, one independent task per row.
    pub async fn remove_selected(&self) -> BulkDispatch {
        let selected = self.view.lock().await.selected_rows();
        let tasks = selected
            .into_iter()
            .map(|row| {
                let store = Arc::clone(&self.store);
                let task = tokio::spawn(async move {
                    let outcome = store.delete(row.id).await;
                    if let Err(err) = &outcome {
                        warn!(todo_id = row.id.0, error = %err, "delete of selected todo failed");
                    }
                    outcome
                });
                (row.id, task)
            })
            .collect();
        BulkDispatch {
            action: BulkAction::Delete,
            tasks,
        }
    }

    /// Applies an inline cell edit. Returns `false` when the row is gone.
    pub async fn commit_cell_edit(&self, edit: CellEdit) -> Result<bool, ControllerError> {
        match edit.column {
            Column::Title => Ok(self.store.update_title(edit.id, &edit.value).await?),
            Column::Done => {
                let done = parse_done(&edit.value).ok_or_else(|| ControllerError::InvalidValue {
                    column: Column::Done,
                    value: edit.value.clone(),
                })?;
                Ok(self.store.update_done(edit.id, done).await?)
            }
            Column::Id => Err(ControllerError::ReadOnlyColumn(Column::Id)),
        }
    }

    pub fn unmount(self) {
        info!(
            revision = self.rendered_revision(),
            "todo controller unmounted"
        );
    }
}

impl<R: TodoRepository, V: TabularView> Drop for TodoController<R, V> {
    fn drop(&mut self) {
        self.render_task.abort();
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
