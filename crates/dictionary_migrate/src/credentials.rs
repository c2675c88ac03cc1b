use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::CredentialsError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceAccount {
    pub project_id: String,
    pub client_email: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
}

impl ServiceAccount {
    pub fn load(path: Option<&Path>) -> Result<Self, CredentialsError> {
        let path = path.ok_or(CredentialsError::Missing)?;
        if !path.exists() {
            return Err(CredentialsError::NotFound(path.to_path_buf()));
        }
        let raw = fs::read_to_string(path).map_err(|source| CredentialsError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| CredentialsError::Invalid {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Where the project's collections live when no store directory is given.
    pub fn default_store_dir(&self) -> PathBuf {
        PathBuf::from("firestore").join(&self.project_id)
    }
}
