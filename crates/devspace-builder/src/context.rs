//! Build context archiving.

use devspace_core::{Error, Result};
use std::path::{Path, PathBuf};

/// Archive name for a Dockerfile that lives outside the context directory.
pub const EXTERNAL_DOCKERFILE: &str = ".devspace.Dockerfile";

/// A tarred build context.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub archive: Vec<u8>,
    /// Dockerfile path inside the archive.
    pub dockerfile: String,
}

/// Tar `context` for the daemon or kaniko.
pub async fn archive_context(context: &Path, dockerfile: &Path) -> Result<BuildContext> {
    let context = context.to_path_buf();
    let dockerfile = dockerfile.to_path_buf();

    tokio::task::spawn_blocking(move || archive_context_blocking(&context, &dockerfile))
        .await
        .map_err(|e| Error::Internal(format!("archive task failed: {e}")))?
}

fn archive_context_blocking(context: &Path, dockerfile: &Path) -> Result<BuildContext> {
    let context = context
        .canonicalize()
        .map_err(|e| Error::InvalidInput(format!("build context {}: {}", context.display(), e)))?;
    let dockerfile = dockerfile
        .canonicalize()
        .map_err(|e| Error::InvalidInput(format!("Dockerfile {}: {}", dockerfile.display(), e)))?;

    let mut builder = tar::Builder::new(Vec::new());
    builder.mode(tar::HeaderMode::Deterministic);
    builder.follow_symlinks(false);
    builder.append_dir_all(".", &context)?;

    let dockerfile_entry = match dockerfile.strip_prefix(&context) {
        Ok(relative) => archive_path(relative),
        Err(_) => {
            builder.append_path_with_name(&dockerfile, EXTERNAL_DOCKERFILE)?;
            EXTERNAL_DOCKERFILE.to_string()
        }
    };

    let archive = builder.into_inner()?;
    Ok(BuildContext {
        archive,
        dockerfile: dockerfile_entry,
    })
}

fn archive_path(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolve a possibly relative path against a base directory.
pub fn resolve_path(base: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entries(archive: &[u8]) -> Vec<String> {
        let mut archive = tar::Archive::new(archive);
        archive
            .entries()
            .unwrap()
            .map(|e| {
                e.unwrap()
                    .path()
                    .unwrap()
                    .to_string_lossy()
                    .trim_start_matches("./")
                    .to_string()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_dockerfile_inside_context() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("docker")).unwrap();
        std::fs::write(dir.path().join("docker/Dockerfile"), "FROM alpine\n").unwrap();
        std::fs::write(dir.path().join("main.go"), "package main\n").unwrap();

        let ctx = archive_context(dir.path(), &dir.path().join("docker/Dockerfile"))
            .await
            .unwrap();

        assert_eq!(ctx.dockerfile, "docker/Dockerfile");
        let names = entries(&ctx.archive);
        assert!(names.iter().any(|n| n == "main.go"));
        assert!(names.iter().any(|n| n == "docker/Dockerfile"));
        assert!(!names.iter().any(|n| n == EXTERNAL_DOCKERFILE));
    }

    #[tokio::test]
    async fn test_dockerfile_outside_context() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/app.py"), "print()\n").unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "FROM python\n").unwrap();

        let ctx = archive_context(&dir.path().join("src"), &dir.path().join("Dockerfile"))
            .await
            .unwrap();

        assert_eq!(ctx.dockerfile, EXTERNAL_DOCKERFILE);
        let names = entries(&ctx.archive);
        assert!(names.iter().any(|n| n == "app.py"));
        assert!(names.iter().any(|n| n == EXTERNAL_DOCKERFILE));
    }

    #[tokio::test]
    async fn test_missing_context_is_invalid_input() {
        let dir = TempDir::new().unwrap();
        let err = archive_context(&dir.path().join("nope"), &dir.path().join("Dockerfile"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_resolve_path() {
        let base = Path::new("/project");
        assert_eq!(resolve_path(base, "Dockerfile"), PathBuf::from("/project/Dockerfile"));
        assert_eq!(resolve_path(base, "/abs/Dockerfile"), PathBuf::from("/abs/Dockerfile"));
    }
}
