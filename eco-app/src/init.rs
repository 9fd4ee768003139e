//! Configuration scaffolding for `ecosentinel init`.
//!
//! Writes `~/.ecosentinel/` templates without overwriting existing local files.

use anyhow::Result;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct InitReport {
    pub root: PathBuf,
    pub created: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy)]
struct TemplateFile {
    relative_path: &'static str,
    contents: &'static str,
}

const TEMPLATE_FILES: &[TemplateFile] = &[TemplateFile {
    relative_path: "config.toml",
    contents: include_str!("../config-templates/config.toml"),
}];

pub async fn initialize_default() -> Result<InitReport> {
    let config_path = crate::config::default_config_path();
    let root = config_path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("invalid default config path: {}", config_path.display()))?
        .to_path_buf();
    initialize_at_root(&root).await
}

pub async fn initialize_at_root(root: &Path) -> Result<InitReport> {
    let data_dir = root.join("data");
    tokio::fs::create_dir_all(&data_dir)
        .await
        .map_err(|e| anyhow::anyhow!("create data dir {}: {e}", data_dir.display()))?;

    let mut report = InitReport {
        root: root.to_path_buf(),
        ..InitReport::default()
    };

    for template in TEMPLATE_FILES {
        let target = root.join(template.relative_path);
        match tokio::fs::metadata(&target).await {
            Ok(_) => report.skipped.push(target),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tokio::fs::write(&target, template.contents)
                    .await
                    .map_err(|e| {
                        anyhow::anyhow!("write config template {}: {e}", target.display())
                    })?;
                tracing::debug!(path = %target.display(), "config template written");
                report.created.push(target);
            }
            Err(err) => {
                return Err(anyhow::anyhow!(
                    "inspect config path {}: {err}",
                    target.display()
                ));
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::{TEMPLATE_FILES, initialize_at_root};
    use crate::config::EcoConfig;

    #[tokio::test]
    async fn init_writes_templates_and_data_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join(".ecosentinel");
        let report = initialize_at_root(&root).await.expect("init succeeds");

        assert_eq!(report.created.len(), TEMPLATE_FILES.len());
        assert!(report.skipped.is_empty());
        assert!(root.join("data").is_dir());
        assert!(root.join("config.toml").is_file());
    }

    #[tokio::test]
    async fn init_never_overwrites_local_edits() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().to_path_buf();
        initialize_at_root(&root).await.expect("first init");
        std::fs::write(root.join("config.toml"), "[storage]\nbackend = \"memory\"\n").unwrap();

        let second = initialize_at_root(&root).await.expect("second init");
        assert!(second.created.is_empty());
        assert_eq!(second.skipped.len(), TEMPLATE_FILES.len());
        let kept = std::fs::read_to_string(root.join("config.toml")).unwrap();
        assert!(kept.contains("memory"));
    }

    #[test]
    fn template_is_a_valid_config() {
        let cfg = EcoConfig::parse(TEMPLATE_FILES[0].contents).expect("template parses");
        cfg.validate().expect("template validates");
    }
}
