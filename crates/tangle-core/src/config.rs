use serde::{Deserialize, Serialize};

/// Top-level notebook configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotebookConfig {
    pub workspace: WorkspaceSettings,
    pub attachments: AttachmentSettings,
}

/// Workspace-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceSettings {
    /// Name of the workspace
    pub name: String,
    /// Extension assumed for extension-less link targets
    #[serde(default = "default_extension")]
    pub default_extension: String,
    /// Path segments excluded from indexing
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
}

/// Which file extensions count as images and attachments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentSettings {
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
    #[serde(default = "default_attachment_extensions")]
    pub attachment_extensions: Vec<String>,
}

fn default_extension() -> String {
    ".md".to_string()
}

fn default_image_extensions() -> Vec<String> {
    ["png", "jpg", "jpeg", "gif", "svg", "webp"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_attachment_extensions() -> Vec<String> {
    vec!["pdf".to_string()]
}

impl Default for NotebookConfig {
    fn default() -> Self {
        Self {
            workspace: WorkspaceSettings {
                name: "Notebook".to_string(),
                default_extension: default_extension(),
                ignore_patterns: vec![".git".to_string(), "node_modules".to_string()],
            },
            attachments: AttachmentSettings {
                image_extensions: default_image_extensions(),
                attachment_extensions: default_attachment_extensions(),
            },
        }
    }
}

impl NotebookConfig {
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_roundtrip() {
        let config = NotebookConfig::default();
        let yaml = config.to_yaml().unwrap();
        let restored = NotebookConfig::from_yaml(&yaml).unwrap();
        assert_eq!(restored.workspace.name, "Notebook");
        assert_eq!(restored.workspace.default_extension, ".md");
    }

    #[test]
    fn test_partial_yaml_applies_defaults() {
        let yaml = "workspace:\n  name: Vault\nattachments: {}\n";
        let config = NotebookConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.workspace.name, "Vault");
        assert_eq!(config.workspace.default_extension, ".md");
        assert!(config.workspace.ignore_patterns.is_empty());
        assert!(config
            .attachments
            .image_extensions
            .contains(&"png".to_string()));
    }
}
