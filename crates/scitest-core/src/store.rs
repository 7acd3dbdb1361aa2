//! Discovery of query, suite and record files, and record persistence.
//!
//! File naming:
//! - `query-<tag>.{yml,yaml,json}`: queries and query sets, loaded in tag order
//! - `suite-<name>.{yml,yaml,json}`: suite definitions, searched recursively
//! - `{test,ref}-<suite>-<version>.{yml,yaml,json}`: suite result records

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};
use crate::loader::{DataLoader, DATA_EXTENSIONS};
use crate::resolver::LoadingContext;
use crate::results::SuiteResult;
use crate::suite::Suite;
use crate::version::Version;

/// Stem of a data file, if it has one of the loader's extensions.
fn data_stem(path: &Path) -> Option<&str> {
    let ext = path.extension()?.to_str()?;
    if !DATA_EXTENSIONS.contains(&ext) {
        return None;
    }
    path.file_stem()?.to_str()
}

/// Files directly inside `dir`; a missing directory contributes nothing.
fn list_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let read_dir = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(dir = %dir.display(), "search directory does not exist");
            return Ok(Vec::new());
        }
        Err(e) => return Err(HarnessError::io(dir, e)),
    };
    let mut paths = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|e| HarnessError::io(dir, e))?;
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// `(tag, path, search dir)` of every query file, sorted by tag (then path).
fn tagged_query_files(dirs: &[PathBuf]) -> Result<Vec<(String, PathBuf, &Path)>> {
    let mut tagged = Vec::new();
    for dir in dirs {
        for path in list_dir(dir)? {
            if !path.is_file() {
                continue;
            }
            if let Some(tag) = data_stem(&path).and_then(|s| s.strip_prefix("query-")) {
                tagged.push((tag.to_string(), path, dir.as_path()));
            }
        }
    }
    tagged.sort();
    Ok(tagged)
}

/// Query files of all `dirs`, sorted by tag (then path).
pub fn discover_query_files(dirs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    Ok(tagged_query_files(dirs)?
        .into_iter()
        .map(|(_, path, _)| path)
        .collect())
}

/// Load every query file of `dirs` into one context. Returns the files loaded.
pub fn load_query_dirs(
    ctx: &mut LoadingContext,
    dirs: &[PathBuf],
    loader: &dyn DataLoader,
) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for (_, file, root) in tagged_query_files(dirs)? {
        let data = loader.load(&file)?;
        ctx.load_file_in(root, &file, &data)?;
        files.push(file);
    }
    tracing::info!(
        files = files.len(),
        queries = ctx.query_count(),
        query_sets = ctx.query_set_count(),
        "query definitions loaded"
    );
    Ok(files)
}

// ---------------------------------------------------------------------------
// Suites
// ---------------------------------------------------------------------------

fn collect_suite_files(dir: &Path, found: &mut Vec<(String, PathBuf)>) -> Result<()> {
    for path in list_dir(dir)? {
        if path.is_dir() {
            collect_suite_files(&path, found)?;
        } else if let Some(name) = data_stem(&path).and_then(|s| s.strip_prefix("suite-")) {
            found.push((name.to_string(), path));
        }
    }
    Ok(())
}

/// Suite files of all `dirs` (recursively), as `(suite name, path)` sorted by name.
pub fn discover_suite_files(dirs: &[PathBuf]) -> Result<Vec<(String, PathBuf)>> {
    let mut found = Vec::new();
    for dir in dirs {
        collect_suite_files(dir, &mut found)?;
    }
    found.sort();
    Ok(found)
}

/// Load suites, optionally restricted to `requested` names (all must exist).
pub fn load_suites(
    dirs: &[PathBuf],
    requested: Option<&[String]>,
    ctx: &LoadingContext,
    loader: &dyn DataLoader,
) -> Result<Vec<Suite>> {
    let mut by_name: BTreeMap<String, PathBuf> = BTreeMap::new();
    for (name, path) in discover_suite_files(dirs)? {
        if let Some(existing) = by_name.get(&name) {
            return Err(HarnessError::Conflict {
                kind: "suite".to_string(),
                name,
                detail: format!(
                    "defined in both {} and {}",
                    existing.display(),
                    path.display()
                ),
            });
        }
        by_name.insert(name, path);
    }

    if let Some(requested) = requested {
        let missing: Vec<String> = requested
            .iter()
            .filter(|n| !by_name.contains_key(n.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(HarnessError::UnknownSuites { names: missing });
        }
        by_name.retain(|name, _| requested.contains(name));
    }

    by_name
        .into_iter()
        .map(|(name, path)| {
            let suite = Suite::from_data(&loader.load(&path)?, &path, ctx)?;
            if suite.name != name {
                return Err(HarnessError::malformed(
                    "suite",
                    path.display().to_string(),
                    format!("file is named for {name:?} but defines {:?}", suite.name),
                ));
            }
            Ok(suite)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Whether a record came from a live run or is a trusted benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Test,
    #[serde(rename = "ref")]
    Reference,
}

impl RecordKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            RecordKind::Test => "test",
            RecordKind::Reference => "ref",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "test" => Some(RecordKind::Test),
            "ref" => Some(RecordKind::Reference),
            _ => None,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// A discovered record file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFile {
    pub kind: RecordKind,
    pub suite: String,
    pub version: Version,
    pub path: PathBuf,
}

/// Split `kind-suite-version` into its parts. The version part may itself contain `-`.
pub fn parse_record_name(path: &Path) -> Option<(RecordKind, &str, &str)> {
    let mut parts = data_stem(path)?.splitn(3, '-');
    let kind = RecordKind::from_prefix(parts.next()?)?;
    let suite = parts.next().filter(|s| !s.is_empty())?;
    let version = parts.next().filter(|v| !v.is_empty())?;
    Some((kind, suite, version))
}

/// Record files of the given kinds directly inside `dirs`.
///
/// Files whose version token does not parse are skipped with a warning.
pub fn discover_records(dirs: &[PathBuf], kinds: &[RecordKind]) -> Result<Vec<RecordFile>> {
    let mut records = Vec::new();
    for dir in dirs {
        for path in list_dir(dir)? {
            if !path.is_file() {
                continue;
            }
            let Some((kind, suite, version)) = parse_record_name(&path) else {
                continue;
            };
            if !kinds.contains(&kind) {
                continue;
            }
            match Version::parse(version) {
                Ok(version) => records.push(RecordFile {
                    kind,
                    suite: suite.to_string(),
                    version,
                    path: path.clone(),
                }),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping record with bad version")
                }
            }
        }
    }
    Ok(records)
}

/// Distinct versions among `records`, ascending where comparable.
pub fn record_versions(records: &[RecordFile]) -> Vec<Version> {
    let mut versions: Vec<Version> = Vec::new();
    for r in records {
        if !versions.contains(&r.version) {
            versions.push(r.version.clone());
        }
    }
    versions.sort_by(|a, b| {
        a.compare(b)
            .unwrap_or_else(|_| a.kind().cmp(b.kind()))
    });
    versions
}

/// Records at exactly `version`, keyed by suite. Two files for one suite conflict.
pub fn select_records<'r>(
    records: &'r [RecordFile],
    version: &Version,
) -> Result<BTreeMap<String, &'r RecordFile>> {
    let mut selected: BTreeMap<String, &RecordFile> = BTreeMap::new();
    for record in records.iter().filter(|r| &r.version == version) {
        if let Some(existing) = selected.get(&record.suite) {
            return Err(HarnessError::Conflict {
                kind: "record".to_string(),
                name: format!("{}-{}", record.suite, version),
                detail: format!(
                    "found both {} and {}",
                    existing.path.display(),
                    record.path.display()
                ),
            });
        }
        selected.insert(record.suite.clone(), record);
    }
    Ok(selected)
}

/// Load a record; its content must agree with its file name.
pub fn load_record(
    file: &RecordFile,
    ctx: &LoadingContext,
    loader: &dyn DataLoader,
) -> Result<SuiteResult> {
    let origin = file.path.display().to_string();
    let record = SuiteResult::from_data(&loader.load(&file.path)?, ctx, &origin)?;
    if record.suite_name != file.suite || record.version != file.version {
        return Err(HarnessError::malformed(
            "suite record",
            origin,
            format!(
                "content is for {}-{} but the file is named for {}-{}",
                record.suite_name, record.version, file.suite, file.version
            ),
        ));
    }
    Ok(record)
}

/// How an existing record with the same name is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Fail if a record for this suite and version exists.
    CreateNew,
    /// Replace the record for this suite and version.
    Overwrite,
}

pub fn record_path(dir: &Path, kind: RecordKind, suite: &str, version: &Version, ext: &str) -> PathBuf {
    dir.join(format!("{}-{}-{}.{}", kind.prefix(), suite, version, ext))
}

/// Persist `record` under `dir` as YAML. Returns the path written.
pub fn write_record(
    record: &SuiteResult,
    dir: &Path,
    kind: RecordKind,
    mode: WriteMode,
    ctx: &LoadingContext,
    loader: &dyn DataLoader,
) -> Result<PathBuf> {
    if dir.exists() && !dir.is_dir() {
        return Err(HarnessError::io(
            dir,
            std::io::Error::new(std::io::ErrorKind::AlreadyExists, "a file blocks the output directory"),
        ));
    }
    std::fs::create_dir_all(dir).map_err(|e| HarnessError::io(dir, e))?;

    let target = record_path(dir, kind, &record.suite_name, &record.version, "yml");
    let mut stale = Vec::new();
    for ext in DATA_EXTENSIONS {
        let sibling = record_path(dir, kind, &record.suite_name, &record.version, ext);
        if !sibling.exists() {
            continue;
        }
        if mode == WriteMode::CreateNew {
            return Err(HarnessError::RecordExists {
                path: sibling.display().to_string(),
            });
        }
        if sibling != target {
            stale.push(sibling);
        }
    }

    // Stage next to the target so a failed dump leaves existing records intact.
    let staged = tempfile::Builder::new()
        .prefix(".staged-")
        .suffix(".yml")
        .tempfile_in(dir)
        .map_err(|e| HarnessError::io(dir, e))?;
    loader.dump(&record.to_data(ctx), staged.path())?;
    staged
        .persist(&target)
        .map_err(|e| HarnessError::io(&target, e.error))?;

    for sibling in stale {
        std::fs::remove_file(&sibling).map_err(|e| HarnessError::io(&sibling, e))?;
    }
    Ok(target)
}

/// Delete every `test-` record directly inside `dir`. Returns what was removed.
pub fn clean_test_records(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for path in list_dir(dir)? {
        if !path.is_file() {
            continue;
        }
        if matches!(parse_record_name(&path), Some((RecordKind::Test, _, _))) {
            std::fs::remove_file(&path).map_err(|e| HarnessError::io(&path, e))?;
            removed.push(path);
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::FileLoader;
    use crate::registry::TypeRegistry;
    use crate::results::{QueryResult, ResultSet};
    use crate::value::Value;
    use serde_json::json;

    fn write(path: &Path, data: serde_json::Value) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        FileLoader.dump(&data, path).unwrap();
    }

    fn count_query(name: &str) -> serde_json::Value {
        json!({"query-name": name, "query-type": "CountQuery", "quantity": "IntegerQuantity",
               "properties": {"file_ext": "stdout"}})
    }

    #[test]
    fn test_parse_record_name() {
        assert_eq!(
            parse_record_name(Path::new("ref-demo-d2024-02-09.yml")),
            Some((RecordKind::Reference, "demo", "d2024-02-09"))
        );
        assert_eq!(
            parse_record_name(Path::new("dir/test-demo-v1.0.0-rc.1.json")),
            Some((RecordKind::Test, "demo", "v1.0.0-rc.1"))
        );
        assert_eq!(parse_record_name(Path::new("ref-demo.yml")), None);
        assert_eq!(parse_record_name(Path::new("other-demo-v1.0.0.yml")), None);
        assert_eq!(parse_record_name(Path::new("ref-demo-v1.0.0.txt")), None);
    }

    #[test]
    fn test_query_files_sorted_by_tag() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");
        write(&a.join("query-2.yml"), json!({"queries": [count_query("x")]}));
        write(&b.join("query-1.json"), json!({"queries": [count_query("y")]}));
        write(&a.join("notes.yml"), json!({}));

        let files = discover_query_files(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(files, vec![b.join("query-1.json"), a.join("query-2.yml")]);

        let mut ctx = LoadingContext::new(TypeRegistry::builtin());
        load_query_dirs(&mut ctx, &[a, b], &FileLoader).unwrap();
        assert_eq!(ctx.query_count(), 2);
    }

    #[test]
    fn test_same_query_in_two_directories_conflicts() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("A");
        let b = tmp.path().join("B");
        write(&a.join("query-a.yml"), json!({"queries": [count_query("foo")]}));
        write(&b.join("query-b.yml"), json!({"queries": [count_query("foo")]}));

        let mut ctx = LoadingContext::new(TypeRegistry::builtin());
        let err = load_query_dirs(&mut ctx, &[a, b], &FileLoader).unwrap_err();
        assert!(matches!(err, HarnessError::Conflict { .. }));
    }

    #[test]
    fn test_load_suites_recursive_and_filtered() {
        let tmp = tempfile::tempdir().unwrap();
        let q = tmp.path().join("q");
        write(
            &q.join("query-a.yml"),
            json!({"queries": [count_query("n")], "query-sets": [{"query-set-name": "qs", "queries": ["n"]}]}),
        );
        let mut ctx = LoadingContext::new(TypeRegistry::builtin());
        load_query_dirs(&mut ctx, &[q], &FileLoader).unwrap();

        let tests = tmp.path().join("tests");
        write(
            &tests.join("suite-alpha.yml"),
            json!({"suite-name": "alpha", "tests": [{"test-name": "t", "queries": ["qs"]}]}),
        );
        write(
            &tests.join("deep/suite-beta.json"),
            json!({"suite-name": "beta", "tests": [{"test-name": "t", "queries": ["qs"]}]}),
        );

        let all = load_suites(&[tests.clone()], None, &ctx, &FileLoader).unwrap();
        assert_eq!(
            all.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            vec!["alpha", "beta"]
        );

        let only = load_suites(&[tests.clone()], Some(&["beta".to_string()]), &ctx, &FileLoader)
            .unwrap();
        assert_eq!(only.len(), 1);

        let err = load_suites(&[tests], Some(&["gamma".to_string()]), &ctx, &FileLoader)
            .unwrap_err();
        assert!(matches!(err, HarnessError::UnknownSuites { .. }));
    }

    #[test]
    fn test_duplicate_suite_conflicts() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = LoadingContext::new(TypeRegistry::builtin());
        let suite = json!({"suite-name": "alpha", "tests": []});
        write(&tmp.path().join("x/suite-alpha.yml"), suite.clone());
        write(&tmp.path().join("y/suite-alpha.yml"), suite);
        let err = load_suites(&[tmp.path().to_path_buf()], None, &ctx, &FileLoader).unwrap_err();
        assert!(matches!(err, HarnessError::Conflict { .. }));
    }

    #[test]
    fn test_write_discover_load_record() {
        let tmp = tempfile::tempdir().unwrap();
        let mut ctx = LoadingContext::new(TypeRegistry::builtin());
        ctx.load_file(
            Path::new("query-a.yml"),
            &json!({"queries": [count_query("n")], "query-sets": [{"query-set-name": "qs", "queries": ["n"]}]}),
        )
        .unwrap();

        let version = Version::parse("v1.0.0").unwrap();
        let mut record = SuiteResult::new("demo", version.clone());
        record.insert(
            "t1",
            vec![ResultSet::new("qs", vec![QueryResult::value("n", Value::Int(42))])],
        );

        let out = tmp.path().join("refs");
        let path = write_record(&record, &out, RecordKind::Reference, WriteMode::CreateNew, &ctx, &FileLoader)
            .unwrap();
        assert_eq!(path, out.join("ref-demo-v1.0.0.yml"));

        let again = write_record(&record, &out, RecordKind::Reference, WriteMode::CreateNew, &ctx, &FileLoader);
        assert!(matches!(again, Err(HarnessError::RecordExists { .. })));
        write_record(&record, &out, RecordKind::Reference, WriteMode::Overwrite, &ctx, &FileLoader)
            .unwrap();

        let records = discover_records(&[out], &[RecordKind::Reference]).unwrap();
        assert_eq!(records.len(), 1);
        let selected = select_records(&records, &version).unwrap();
        let loaded = load_record(selected["demo"], &ctx, &FileLoader).unwrap();
        assert_eq!(loaded, record);
    }

    #[test]
    fn test_select_matches_exact_build_metadata() {
        let record = |name: &str, version: &str| RecordFile {
            kind: RecordKind::Reference,
            suite: "demo".to_string(),
            version: Version::parse(version).unwrap(),
            path: PathBuf::from(name),
        };
        let records = [
            record("ref-demo-v1.0.0+b7.yml", "v1.0.0+b7"),
            record("ref-demo-v1.0.0.yml", "v1.0.0"),
        ];

        let plain = select_records(&records, &Version::parse("v1.0.0").unwrap()).unwrap();
        assert_eq!(plain["demo"].path, PathBuf::from("ref-demo-v1.0.0.yml"));

        let build = select_records(&records, &Version::parse("v1.0.0+b7").unwrap()).unwrap();
        assert_eq!(build["demo"].path, PathBuf::from("ref-demo-v1.0.0+b7.yml"));

        let only_build = select_records(&records[..1], &Version::parse("v1.0.0").unwrap()).unwrap();
        assert!(only_build.is_empty());
    }

    struct FailingDump;

    impl DataLoader for FailingDump {
        fn load(&self, path: &Path) -> Result<crate::value::Data> {
            FileLoader.load(path)
        }

        fn dump(&self, _data: &crate::value::Data, path: &Path) -> Result<()> {
            Err(HarnessError::Parse {
                path: path.display().to_string(),
                reason: "disk full".to_string(),
            })
        }
    }

    #[test]
    fn test_overwrite_keeps_old_record_until_new_one_is_written() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = LoadingContext::new(TypeRegistry::builtin());
        let old = tmp.path().join("ref-demo-v1.0.0.json");
        write(&old, json!({"suite-name": "demo", "version": "v1.0.0", "suite-results": {}}));
        let record = SuiteResult::new("demo", Version::parse("v1.0.0").unwrap());

        let err = write_record(&record, tmp.path(), RecordKind::Reference, WriteMode::Overwrite, &ctx, &FailingDump);
        assert!(err.is_err());
        assert!(old.exists());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);

        let path = write_record(&record, tmp.path(), RecordKind::Reference, WriteMode::Overwrite, &ctx, &FileLoader)
            .unwrap();
        assert_eq!(path, tmp.path().join("ref-demo-v1.0.0.yml"));
        assert!(!old.exists());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_record_content_must_match_name() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = LoadingContext::new(TypeRegistry::builtin());
        write(
            &tmp.path().join("ref-demo-v1.0.0.yml"),
            json!({"suite-name": "other", "version": "v1.0.0", "suite-results": {}}),
        );
        let records = discover_records(&[tmp.path().to_path_buf()], &[RecordKind::Reference]).unwrap();
        assert!(load_record(&records[0], &ctx, &FileLoader).is_err());
    }

    #[test]
    fn test_versions_and_clean() {
        let tmp = tempfile::tempdir().unwrap();
        let empty = json!({"suite-name": "demo", "version": "v1.0.0", "suite-results": {}});
        for name in ["ref-demo-v1.10.0.yml", "ref-demo-v1.2.0.yml", "test-demo-d2024-01-01.yml", "ref-demo-vbad.yml"] {
            write(&tmp.path().join(name), empty.clone());
        }
        let dirs = [tmp.path().to_path_buf()];
        let refs = discover_records(&dirs, &[RecordKind::Reference]).unwrap();
        assert_eq!(
            record_versions(&refs),
            vec![Version::parse("v1.2.0").unwrap(), Version::parse("v1.10.0").unwrap()]
        );

        let removed = clean_test_records(tmp.path()).unwrap();
        assert_eq!(removed.len(), 1);
        assert!(discover_records(&dirs, &[RecordKind::Test]).unwrap().is_empty());
    }
}
