pub mod error;
pub mod routes;

use std::sync::Arc;

use db::DBService;
use services::services::editor::EditorService;

/// Shared state handed to every route handler.
#[derive(Clone)]
pub struct AppState {
    db: DBService,
    editor: Arc<EditorService>,
}

impl AppState {
    pub fn new(db: DBService, editor: EditorService) -> Self {
        Self {
            db,
            editor: Arc::new(editor),
        }
    }

    pub fn db(&self) -> &DBService {
        &self.db
    }

    pub fn editor(&self) -> &EditorService {
        &self.editor
    }
}
