//! Packaging options and their defaults.

use crate::error::{PackError, Result};
use crate::naming::{default_container_stem, default_project_name};
use crate::project::Project;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageOptions {
    /// Output GeoPackage.
    pub container: PathBuf,
    /// Store the project inside the container.
    #[serde(default = "default_embed")]
    pub embed_project: bool,
    /// Name of the embedded project; derived from the project when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
}

/// Base name assumed for a project that was never saved.
const UNSAVED_BASE_NAME: &str = "project";

fn default_embed() -> bool {
    true
}

impl PackageOptions {
    /// Defaults for `project`: `GPKG-{name}.gpkg` next to the project file,
    /// or in the home directory for a project that was never saved.
    pub fn for_project(project: &Project) -> Self {
        let base = project
            .base_name()
            .unwrap_or_else(|| UNSAVED_BASE_NAME.to_string());
        let stem = default_container_stem(&base);
        let project_name = default_project_name(&base);
        let file_name = format!("{stem}.gpkg");
        let dir = project
            .file_name()
            .and_then(|path| path.parent())
            .map(PathBuf::from)
            .or_else(dirs::home_dir)
            .unwrap_or_default();

        Self {
            container: dir.join(file_name),
            embed_project: true,
            project_name: Some(project_name),
        }
    }

    /// Check the options and normalize the container extension.
    pub fn validate(mut self) -> Result<Self> {
        if self.container.as_os_str().is_empty() {
            return Err(PackError::MissingOutputPath);
        }
        let has_extension = self
            .container
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("gpkg"));
        if !has_extension {
            let mut name = self.container.clone().into_os_string();
            name.push(".gpkg");
            self.container = PathBuf::from(name);
        }
        if self.embed_project
            && self
                .project_name
                .as_deref()
                .is_some_and(|name| name.trim().is_empty())
        {
            return Err(PackError::MissingProjectName);
        }
        Ok(self)
    }
}
