use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::reconcile::Staging;
use crate::store::Gradebook;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub book: Gradebook,
    pub staging: Staging,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            workspace: None,
            db: None,
            book: Gradebook::new(),
            staging: Staging::default(),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
