use crate::error::{PluginExportError, Result};
use std::fs;
use std::io::{self, Cursor};
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use zip::ZipArchive;

/// Reserved entry the server adds to every bundle. Never extracted.
pub const MANIFEST_MARKER: &str = "Manifest.MF";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub entry_name: String,
    pub is_directory: bool,
}

impl ArchiveEntry {
    pub fn new<S: Into<String>>(entry_name: S, is_directory: bool) -> Self {
        Self {
            entry_name: entry_name.into(),
            is_directory,
        }
    }

    /// Last `/`-delimited segment of the entry name.
    pub fn file_name(&self) -> &str {
        let name = self.entry_name.trim_end_matches('/');
        name.rsplit('/').next().unwrap_or(name)
    }

    pub fn is_manifest_marker(&self) -> bool {
        self.file_name() == MANIFEST_MARKER
    }
}

/// Where one entry goes on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEntry {
    pub entry: ArchiveEntry,
    pub destination_dir: PathBuf,
}

impl PlannedEntry {
    /// Full path of the written file, or the created directory for directory entries.
    pub fn destination(&self) -> PathBuf {
        if self.entry.is_directory {
            self.destination_dir.clone()
        } else {
            self.destination_dir.join(self.entry.file_name())
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionPlan {
    pub entries: Vec<PlannedEntry>,
}

impl ExtractionPlan {
    /// Maps entries onto `output_base`, keeping archive order and dropping the manifest marker.
    pub fn build(entries: &[ArchiveEntry], output_base: &Path) -> Result<Self> {
        let mut planned = Vec::with_capacity(entries.len());

        for entry in entries {
            if entry.is_manifest_marker() {
                debug!("skipping manifest marker {}", entry.entry_name);
                continue;
            }

            let destination_dir = destination_dir_for(entry, output_base)?;
            planned.push(PlannedEntry {
                entry: entry.clone(),
                destination_dir,
            });
        }

        Ok(Self { entries: planned })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn destination_dir_for(entry: &ArchiveEntry, output_base: &Path) -> Result<PathBuf> {
    let relative = entry
        .entry_name
        .strip_prefix('/')
        .unwrap_or(&entry.entry_name);

    validate_relative_path(relative, &entry.entry_name)?;

    let directory_part = if entry.is_directory {
        relative
    } else {
        &relative[..relative.len() - entry.file_name().len()]
    };

    Ok(output_base.join(directory_part))
}

fn validate_relative_path(relative: &str, entry_name: &str) -> Result<()> {
    let escapes = Path::new(relative).components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });

    if escapes {
        return Err(PluginExportError::UnsafeEntryPath {
            entry: entry_name.to_string(),
        });
    }

    Ok(())
}

/// Reported once per written entry, for verbose progress output.
#[derive(Debug, Clone)]
pub struct ExtractedEntry {
    pub entry_name: String,
    pub destination_dir: PathBuf,
    pub path: PathBuf,
}

fn read_entries<R: io::Read + io::Seek>(archive: &mut ZipArchive<R>) -> Result<Vec<ArchiveEntry>> {
    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let file = archive.by_index_raw(i)?;
        entries.push(ArchiveEntry::new(file.name(), file.is_dir()));
    }
    Ok(entries)
}

pub struct ArchiveExtractor;

impl ArchiveExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Writes every planned entry under `output_base`, overwriting existing files.
    ///
    /// Stops at the first failure. Files written before it are left in place.
    pub fn extract(
        &self,
        archive_bytes: &[u8],
        output_base: &Path,
        on_entry: Option<&dyn Fn(&ExtractedEntry)>,
    ) -> Result<Vec<PathBuf>> {
        let mut archive = ZipArchive::new(Cursor::new(archive_bytes))?;

        let entries = read_entries(&mut archive)?;

        let plan = ExtractionPlan::build(&entries, output_base)?;
        debug!(
            "extraction plan: {} of {} entries under {}",
            plan.len(),
            entries.len(),
            output_base.display()
        );

        let mut written = Vec::with_capacity(plan.len());

        for planned in &plan.entries {
            fs::create_dir_all(&planned.destination_dir)?;

            if planned.entry.is_directory {
                continue;
            }

            let path = planned.destination();
            let mut file = archive.by_name(&planned.entry.entry_name)?;
            let mut out = fs::File::create(&path)?;
            io::copy(&mut file, &mut out)?;

            if let Some(callback) = on_entry {
                callback(&ExtractedEntry {
                    entry_name: planned.entry.entry_name.clone(),
                    destination_dir: planned.destination_dir.clone(),
                    path: path.clone(),
                });
            }

            written.push(path);
        }

        Ok(written)
    }
}

impl Default for ArchiveExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    fn build_archive(files: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in files {
            if name.ends_with('/') {
                writer
                    .add_directory(*name, SimpleFileOptions::default())
                    .unwrap();
            } else {
                writer.start_file(*name, SimpleFileOptions::default()).unwrap();
                writer.write_all(content.as_bytes()).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_plan_strips_leading_separator_and_filename() {
        let entries = vec![
            ArchiveEntry::new("/a/b/file.txt", false),
            ArchiveEntry::new("top.txt", false),
        ];
        let plan = ExtractionPlan::build(&entries, Path::new("/out")).unwrap();

        assert_eq!(plan.len(), 2);
        assert_eq!(plan.entries[0].destination_dir, Path::new("/out/a/b"));
        assert_eq!(plan.entries[0].destination(), Path::new("/out/a/b/file.txt"));
        assert_eq!(plan.entries[1].destination_dir, Path::new("/out"));
        assert_eq!(plan.entries[1].destination(), Path::new("/out/top.txt"));
    }

    #[test]
    fn test_plan_excludes_manifest_marker() {
        let entries = vec![
            ArchiveEntry::new("/Manifest.MF", false),
            ArchiveEntry::new("/META-INF/Manifest.MF", false),
            ArchiveEntry::new("/manifest.mf", false),
        ];
        let plan = ExtractionPlan::build(&entries, Path::new("/out")).unwrap();

        // Match is exact and case-sensitive.
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.entries[0].entry.entry_name, "/manifest.mf");
    }

    #[test]
    fn test_plan_rejects_traversal() {
        let entries = vec![ArchiveEntry::new("/../escape.txt", false)];
        let result = ExtractionPlan::build(&entries, Path::new("/out"));
        assert!(matches!(
            result,
            Err(PluginExportError::UnsafeEntryPath { .. })
        ));

        // Only one leading separator is stripped.
        let entries = vec![ArchiveEntry::new("//etc/passwd", false)];
        assert!(ExtractionPlan::build(&entries, Path::new("/out")).is_err());
    }

    #[test]
    fn test_extract_writes_files_and_skips_manifest() {
        let output = TempDir::new().unwrap();
        let archive = build_archive(&[
            ("/a/b/file.txt", "hello"),
            ("/Manifest.MF", "Manifest-Version: 1.0"),
        ]);

        let written = ArchiveExtractor::new()
            .extract(&archive, output.path(), None)
            .unwrap();

        assert_eq!(written, vec![output.path().join("a/b/file.txt")]);
        assert_eq!(
            fs::read_to_string(output.path().join("a/b/file.txt")).unwrap(),
            "hello"
        );
        assert!(!output.path().join("Manifest.MF").exists());
    }

    #[test]
    fn test_extract_is_idempotent() {
        let output = TempDir::new().unwrap();
        let archive = build_archive(&[("/plugins/x.js", "v1"), ("/plugins/y.js", "v2")]);
        let extractor = ArchiveExtractor::new();

        let first = extractor.extract(&archive, output.path(), None).unwrap();
        let second = extractor.extract(&archive, output.path(), None).unwrap();

        assert_eq!(first, second);
        assert_eq!(
            fs::read_to_string(output.path().join("plugins/x.js")).unwrap(),
            "v1"
        );
    }

    #[test]
    fn test_extract_overwrites_existing_file() {
        let output = TempDir::new().unwrap();
        fs::create_dir_all(output.path().join("plugins")).unwrap();
        fs::write(output.path().join("plugins/x.js"), "stale content that is longer").unwrap();

        let archive = build_archive(&[("plugins/x.js", "fresh")]);
        ArchiveExtractor::new()
            .extract(&archive, output.path(), None)
            .unwrap();

        assert_eq!(
            fs::read_to_string(output.path().join("plugins/x.js")).unwrap(),
            "fresh"
        );
    }

    #[test]
    fn test_directory_entries_are_created_but_not_reported() {
        let output = TempDir::new().unwrap();
        let archive = build_archive(&[("empty/", ""), ("empty/inner.txt", "x")]);

        let written = ArchiveExtractor::new()
            .extract(&archive, output.path(), None)
            .unwrap();

        assert!(output.path().join("empty").is_dir());
        assert_eq!(written, vec![output.path().join("empty/inner.txt")]);
    }

    #[test]
    fn test_entry_callback_sees_archive_order() {
        let output = TempDir::new().unwrap();
        let archive = build_archive(&[("z.txt", "1"), ("a.txt", "2"), ("m/k.txt", "3")]);
        let seen = RefCell::new(Vec::new());
        let callback = |entry: &ExtractedEntry| seen.borrow_mut().push(entry.entry_name.clone());

        ArchiveExtractor::new()
            .extract(&archive, output.path(), Some(&callback))
            .unwrap();

        assert_eq!(seen.into_inner(), vec!["z.txt", "a.txt", "m/k.txt"]);
    }

    #[test]
    fn test_malformed_archive() {
        let output = TempDir::new().unwrap();
        let result = ArchiveExtractor::new().extract(b"not a zip", output.path(), None);
        assert!(matches!(result, Err(PluginExportError::Archive(_))));
    }

    #[test]
    fn test_failure_midway_keeps_earlier_files() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        writer.start_file("a/first.txt", stored).unwrap();
        writer.write_all(b"first payload").unwrap();
        writer.start_file("b/second.txt", stored).unwrap();
        writer.write_all(b"second payload").unwrap();
        let mut archive = writer.finish().unwrap().into_inner();

        let needle = b"second payload";
        let at = archive
            .windows(needle.len())
            .position(|w| w == needle)
            .unwrap();
        archive[at] ^= 0xff;

        let output = TempDir::new().unwrap();
        let result = ArchiveExtractor::new().extract(&archive, output.path(), None);

        assert!(result.is_err());
        assert_eq!(
            fs::read_to_string(output.path().join("a/first.txt")).unwrap(),
            "first payload"
        );
    }

    #[test]
    fn test_unwritable_destination_is_io_error() {
        let output = TempDir::new().unwrap();
        fs::write(output.path().join("plugins"), "a file, not a directory").unwrap();
        let archive = build_archive(&[("plugins/x.js", "x")]);

        let result = ArchiveExtractor::new().extract(&archive, output.path(), None);
        assert!(matches!(result, Err(PluginExportError::Io(_))));
    }
}
