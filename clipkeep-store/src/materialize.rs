use std::{
    collections::HashSet,
    fs, io,
    path::{Path, PathBuf},
};

use clipkeep_core::{FileMetadata, SourceFile};
use tracing::{debug, warn};

use crate::StoreError;

/// Copies clipboard-referenced files into `<root>/<entryId>/` so history
/// entries stay valid after the originals move or change.
#[derive(Debug, Clone)]
pub struct FileMaterializer {
    root: PathBuf,
}

impl FileMaterializer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn entry_dir(&self, entry_id: &str) -> PathBuf {
        self.root.join(entry_id)
    }

    /// Destination path for each file, in input order. Names are sanitized and
    /// made unique within the entry.
    pub fn plan(&self, entry_id: &str, files: &[SourceFile]) -> Vec<PathBuf> {
        let dir = self.entry_dir(entry_id);
        let mut taken: HashSet<String> = HashSet::new();
        files
            .iter()
            .map(|file| dir.join(unique_name(&sanitize_file_name(&file.name), &mut taken)))
            .collect()
    }

    /// Copies every file and reports per-file success. Does not clean up.
    pub fn copy_files(&self, entry_id: &str, files: &[SourceFile]) -> Vec<bool> {
        let targets = self.plan(entry_id, files);
        files
            .iter()
            .zip(targets.iter())
            .map(|(file, target)| match copy_one(&file.path, target) {
                Ok(bytes) => {
                    debug!(entry_id, bytes, target = %target.display(), "materialized file");
                    true
                }
                Err(err) => {
                    warn!(
                        entry_id,
                        source = %file.path.display(),
                        "failed to materialize file: {err}"
                    );
                    false
                }
            })
            .collect()
    }

    /// All-or-nothing copy. On any failure the entry directory is removed.
    pub fn materialize(
        &self,
        entry_id: &str,
        files: &[SourceFile],
    ) -> Result<Vec<FileMetadata>, StoreError> {
        let outcomes = self.copy_files(entry_id, files);
        let failed = outcomes.iter().filter(|ok| !**ok).count();
        if failed > 0 {
            self.discard(entry_id);
            return Err(StoreError::PartialMaterialization {
                failed,
                total: files.len(),
            });
        }

        Ok(self
            .plan(entry_id, files)
            .iter()
            .map(|path| FileMetadata::from_path(path))
            .collect())
    }

    /// Removes the entry's storage directory. Missing directories are fine.
    pub fn discard(&self, entry_id: &str) {
        let dir = self.entry_dir(entry_id);
        match fs::remove_dir_all(&dir) {
            Ok(()) => debug!(entry_id, "removed entry file storage"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(entry_id, dir = %dir.display(), "failed to remove entry files: {err}")
            }
        }
    }
}

fn copy_one(source: &Path, target: &Path) -> io::Result<u64> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(source, target)
}

pub fn sanitize_file_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return "file.bin".to_string();
    }
    let mut out: String = trimmed
        .chars()
        .map(|ch| match ch {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if out.len() > 255 {
        let mut cut = 255;
        while !out.is_char_boundary(cut) {
            cut -= 1;
        }
        out.truncate(cut);
    }
    out
}

fn unique_name(name: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.to_owned()) {
        return name.to_owned();
    }

    let path = Path::new(name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("file");
    let ext = path.extension().and_then(|s| s.to_str());
    let mut i = 1;
    loop {
        let candidate = match ext {
            Some(ext) => format!("{stem} ({i}).{ext}"),
            None => format!("{stem} ({i})"),
        };
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(dir: &Path, name: &str, body: &[u8]) -> SourceFile {
        let path = dir.join(name);
        fs::write(&path, body).expect("write fixture file");
        SourceFile::from_path(path)
    }

    #[test]
    fn materialize_copies_into_entry_dir() {
        let src = tempfile::tempdir().expect("create tempdir");
        let store = tempfile::tempdir().expect("create tempdir");
        let materializer = FileMaterializer::new(store.path());

        let files = vec![source(src.path(), "Report.pdf", b"pdf bytes")];
        let meta = materializer.materialize("entry-1", &files).expect("materialize files");

        assert_eq!(meta.len(), 1);
        assert_eq!(meta[0].path, store.path().join("entry-1").join("Report.pdf"));
        assert_eq!(meta[0].extension, "pdf");
        assert_eq!(fs::read(&meta[0].path).expect("read copied file"), b"pdf bytes");
    }

    #[test]
    fn colliding_names_get_suffixes() {
        let a = tempfile::tempdir().expect("create tempdir");
        let b = tempfile::tempdir().expect("create tempdir");
        let store = tempfile::tempdir().expect("create tempdir");
        let materializer = FileMaterializer::new(store.path());

        let files = vec![
            source(a.path(), "notes.txt", b"one"),
            source(b.path(), "notes.txt", b"two"),
        ];
        let meta = materializer.materialize("e", &files).expect("materialize files");

        assert_eq!(meta[0].name, "notes.txt");
        assert_eq!(meta[1].name, "notes (1).txt");
        assert_eq!(fs::read(&meta[1].path).expect("read copied file"), b"two");
    }

    #[test]
    fn failed_copy_reports_false_and_materialize_cleans_up() {
        let src = tempfile::tempdir().expect("create tempdir");
        let store = tempfile::tempdir().expect("create tempdir");
        let materializer = FileMaterializer::new(store.path());

        let files = vec![
            source(src.path(), "a.txt", b"a"),
            SourceFile::from_path(src.path().join("missing.txt")),
        ];
        assert_eq!(materializer.copy_files("entry-1", &files), vec![true, false]);

        let err = materializer
            .materialize("entry-2", &files)
            .expect_err("missing file must fail");
        assert!(matches!(
            err,
            StoreError::PartialMaterialization {
                failed: 1,
                total: 2
            }
        ));
        assert!(!materializer.entry_dir("entry-2").exists());
    }

    #[test]
    fn discard_tolerates_missing_dir() {
        let store = tempfile::tempdir().expect("create tempdir");
        let materializer = FileMaterializer::new(store.path());
        materializer.discard("never-created");
    }

    #[test]
    fn sanitize_replaces_separators() {
        assert_eq!(sanitize_file_name("a/b:c.txt"), "a_b_c.txt");
        assert_eq!(sanitize_file_name("  "), "file.bin");
        assert_eq!(sanitize_file_name(".."), "file.bin");
    }
}
