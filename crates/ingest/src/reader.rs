use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use walkdir::WalkDir;

pub struct FileReader;

impl FileReader {
    pub async fn read_file(path: &Path) -> Result<String> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        match extension {
            "txt" | "md" => {
                let content = fs::read_to_string(path)
                    .await
                    .context(format!("Failed to read file: {:?}", path))?;
                Ok(content)
            }
            _ => bail!("Unsupported file format: {}", extension),
        }
    }
}

/// Expand a mix of files and directories into the files to process.
///
/// Directories contribute their direct children with one of `extensions`,
/// sorted by path. A path that does not exist is an error, so a bad
/// invocation is reported before anything else happens.
pub fn collect_inputs(paths: &[PathBuf], extensions: &[&str]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_dir() {
            files.extend(list_directory(path, extensions)?);
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            bail!("Input path does not exist: {}", path.display());
        }
    }

    Ok(files)
}

fn list_directory(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.context(format!("Failed to list directory: {:?}", dir))?;
        let path = entry.path();

        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| extensions.contains(&ext));

        if entry.file_type().is_file() && matches {
            files.push(path.to_path_buf());
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_files_and_directory_children() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.json"), "{}").unwrap();
        std::fs::write(dir.path().join("a.json"), "{}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let single = dir.path().join("notes.txt");
        let files = collect_inputs(&[dir.path().to_path_buf(), single.clone()], &["json"]).unwrap();

        assert_eq!(
            files,
            vec![dir.path().join("a.json"), dir.path().join("b.json"), single]
        );
    }

    #[test]
    fn missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");

        let err = collect_inputs(&[missing], &["json"]).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn rejects_unsupported_formats() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("paper.pdf");
        std::fs::write(&pdf, "%PDF").unwrap();

        assert!(FileReader::read_file(&pdf).await.is_err());
    }
}
