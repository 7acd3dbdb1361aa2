//! Test and suite definitions.
//!
//! ```yaml
//! suite-name: demo
//! tests:
//!   - test-name: t1
//!     args: -n 4 input.dat
//!     input: [input.dat]
//!     queries: [qs1]
//! ```

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use crate::error::{HarnessError, Result};
use crate::exec::{InputFile, Invocation};
use crate::resolver::LoadingContext;
use crate::value::{Data, ParamMap};

/// `true` when `path` is relative and never climbs out of its base.
pub fn stays_inside(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// One pairing of program input with query sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestDefinition {
    pub name: String,
    pub prefix: String,
    pub args: Vec<String>,
    /// Directory input sources are resolved against.
    pub base_dir: PathBuf,
    /// Input files; `dest` relative to the test directory, `source` resolved against `base_dir`.
    pub inputs: Vec<InputFile>,
    pub query_sets: Vec<String>,
}

impl TestDefinition {
    /// Parse one test entry of a suite file living in `suite_dir`.
    pub fn from_data(
        data: &Data,
        suite_dir: &Path,
        ctx: &LoadingContext,
        origin: &str,
    ) -> Result<Self> {
        let bad = |reason: String| HarnessError::malformed("test definition", origin, reason);
        let map = data
            .as_object()
            .ok_or_else(|| bad("expected a mapping".to_string()))?;
        if let Some(key) = map.keys().find(|k| {
            !matches!(
                k.as_str(),
                "test-name" | "prefix" | "args" | "base-dir" | "input" | "queries"
            )
        }) {
            return Err(bad(format!("unexpected key {key:?}")));
        }
        let name = map
            .get("test-name")
            .and_then(Data::as_str)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| bad("missing test-name".to_string()))?
            .to_string();
        let prefix = match map.get("prefix") {
            None | Some(Data::Null) => name.clone(),
            Some(Data::String(p)) if !p.is_empty() => p.clone(),
            Some(_) => return Err(bad(format!("prefix of {name:?} must be a non-empty string"))),
        };

        let args = match map.get("args") {
            None | Some(Data::Null) => Vec::new(),
            Some(Data::String(s)) => s.split_whitespace().map(str::to_string).collect(),
            Some(Data::Array(items)) => items
                .iter()
                .map(|a| {
                    a.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| bad(format!("args of {name:?} must be strings")))
                })
                .collect::<Result<_>>()?,
            Some(_) => return Err(bad(format!("args of {name:?} must be a string or a list"))),
        };

        let base_dir = match map.get("base-dir") {
            None | Some(Data::Null) => suite_dir.to_path_buf(),
            Some(Data::String(dir)) if stays_inside(Path::new(dir)) => suite_dir.join(dir),
            Some(Data::String(dir)) => {
                return Err(bad(format!(
                    "base-dir {dir:?} of {name:?} must be a sub-directory of the suite directory"
                )))
            }
            Some(_) => return Err(bad(format!("base-dir of {name:?} must be a string"))),
        };

        let pairs: Vec<(&str, &str)> = match map.get("input") {
            None | Some(Data::Null) => Vec::new(),
            Some(Data::Array(items)) => items
                .iter()
                .map(|f| {
                    f.as_str()
                        .map(|f| (f, f))
                        .ok_or_else(|| bad(format!("input of {name:?} must list file names")))
                })
                .collect::<Result<_>>()?,
            Some(Data::Object(files)) => files
                .iter()
                .map(|(dest, src)| {
                    src.as_str()
                        .map(|src| (dest.as_str(), src))
                        .ok_or_else(|| bad(format!("input {dest:?} of {name:?} must name a file")))
                })
                .collect::<Result<_>>()?,
            Some(_) => return Err(bad(format!("input of {name:?} must be a list or a mapping"))),
        };
        let mut inputs = Vec::with_capacity(pairs.len());
        for (dest, src) in pairs {
            if !stays_inside(Path::new(dest)) || !stays_inside(Path::new(src)) {
                return Err(bad(format!(
                    "input {dest:?} <- {src:?} of {name:?} must stay inside its directory"
                )));
            }
            inputs.push(InputFile {
                source: base_dir.join(src),
                dest: PathBuf::from(dest),
            });
        }

        let query_sets = match map.get("queries") {
            Some(Data::Array(items)) => items
                .iter()
                .map(|q| {
                    q.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| bad(format!("queries of {name:?} must list query sets")))
                })
                .collect::<Result<Vec<_>>>()?,
            _ => return Err(bad(format!("queries of {name:?} must be a list of query sets"))),
        };
        if let Some(missing) = query_sets.iter().find(|q| ctx.query_set(q).is_none()) {
            return Err(HarnessError::UnknownQuerySet {
                name: missing.clone(),
                origin: format!("{origin} (test {name:?})"),
            });
        }

        Ok(Self {
            name,
            prefix,
            args,
            base_dir,
            inputs,
            query_sets,
        })
    }

    /// What the execution collaborator needs to run this test.
    pub fn invocation(&self, suite_name: &str) -> Invocation {
        Invocation {
            suite_name: suite_name.to_string(),
            test_name: self.name.clone(),
            prefix: self.prefix.clone(),
            args: self.args.clone(),
            inputs: self.inputs.clone(),
        }
    }

    /// Serialized form, with paths relative to `suite_dir` where possible.
    pub fn to_data(&self, suite_dir: &Path) -> Data {
        let mut map = ParamMap::new();
        map.insert("test-name".to_string(), Data::String(self.name.clone()));
        if self.prefix != self.name {
            map.insert("prefix".to_string(), Data::String(self.prefix.clone()));
        }
        map.insert(
            "args".to_string(),
            Data::Array(self.args.iter().cloned().map(Data::String).collect()),
        );
        if let Ok(rel) = self.base_dir.strip_prefix(suite_dir) {
            if !rel.as_os_str().is_empty() {
                map.insert(
                    "base-dir".to_string(),
                    Data::String(rel.display().to_string()),
                );
            }
        }
        let input = self
            .inputs
            .iter()
            .map(|f| {
                let src = f.source.strip_prefix(&self.base_dir).unwrap_or(&f.source);
                (
                    f.dest.display().to_string(),
                    Data::String(src.display().to_string()),
                )
            })
            .collect();
        map.insert("input".to_string(), Data::Object(input));
        map.insert(
            "queries".to_string(),
            Data::Array(self.query_sets.iter().cloned().map(Data::String).collect()),
        );
        Data::Object(map)
    }
}

/// Named, ordered collection of tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suite {
    pub name: String,
    pub tests: Vec<TestDefinition>,
    /// File the suite was loaded from.
    pub origin: PathBuf,
}

impl Suite {
    /// Parse a suite file; test paths resolve against the file's directory.
    pub fn from_data(data: &Data, origin: &Path, ctx: &LoadingContext) -> Result<Self> {
        let label = origin.display().to_string();
        let bad = |reason: String| HarnessError::malformed("suite", &label, reason);
        let map = data
            .as_object()
            .ok_or_else(|| bad("expected a mapping".to_string()))?;
        if let Some(key) = map
            .keys()
            .find(|k| !matches!(k.as_str(), "suite-name" | "tests"))
        {
            return Err(bad(format!("unexpected key {key:?}")));
        }
        let name = map
            .get("suite-name")
            .and_then(Data::as_str)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| bad("missing suite-name".to_string()))?;
        if name.contains('-') {
            return Err(bad(format!("suite name {name:?} must not contain '-'")));
        }

        let suite_dir = origin.parent().unwrap_or_else(|| Path::new(""));
        let tests = match map.get("tests") {
            Some(Data::Array(items)) => items
                .iter()
                .map(|t| TestDefinition::from_data(t, suite_dir, ctx, &label))
                .collect::<Result<Vec<_>>>()?,
            _ => return Err(bad("tests must be a list".to_string())),
        };
        let mut seen = HashSet::new();
        if let Some(dup) = tests.iter().find(|t| !seen.insert(t.name.as_str())) {
            return Err(HarnessError::DuplicateName {
                kind: "test",
                name: dup.name.clone(),
                origin: label,
            });
        }

        Ok(Self {
            name: name.to_string(),
            tests,
            origin: origin.to_path_buf(),
        })
    }

    pub fn test(&self, name: &str) -> Option<&TestDefinition> {
        self.tests.iter().find(|t| t.name == name)
    }

    pub fn to_data(&self) -> Data {
        let suite_dir = self.origin.parent().unwrap_or_else(|| Path::new(""));
        let mut map = ParamMap::new();
        map.insert("suite-name".to_string(), Data::String(self.name.clone()));
        map.insert(
            "tests".to_string(),
            Data::Array(self.tests.iter().map(|t| t.to_data(suite_dir)).collect()),
        );
        Data::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TypeRegistry;
    use serde_json::json;

    fn ctx() -> LoadingContext {
        let mut ctx = LoadingContext::new(TypeRegistry::builtin());
        ctx.load_file(
            Path::new("q/query-a.yml"),
            &json!({
                "queries": [{"query-name": "line_count", "query-type": "CountQuery",
                             "quantity": "IntegerQuantity", "properties": {"file_ext": "stdout"}}],
                "query-sets": [{"query-set-name": "qs1", "queries": ["line_count"]}]
            }),
        )
        .unwrap();
        ctx
    }

    #[test]
    fn test_parse_suite() {
        let suite = Suite::from_data(
            &json!({"suite-name": "demo", "tests": [
                {"test-name": "t1", "args": "-n 4  in.dat", "input": ["in.dat"], "queries": ["qs1"]},
                {"test-name": "t2", "prefix": "run2", "args": ["--flag", "a b"], "base-dir": "data",
                 "input": {"x.dat": "sub/y.dat"}, "queries": ["qs1"]}
            ]}),
            Path::new("/suites/suite-demo.yml"),
            &ctx(),
        )
        .unwrap();

        let t1 = suite.test("t1").unwrap();
        assert_eq!(t1.prefix, "t1");
        assert_eq!(t1.args, vec!["-n", "4", "in.dat"]);
        assert_eq!(t1.inputs[0].source, PathBuf::from("/suites/in.dat"));

        let t2 = suite.test("t2").unwrap();
        assert_eq!(t2.args, vec!["--flag", "a b"]);
        assert_eq!(t2.inputs[0].source, PathBuf::from("/suites/data/sub/y.dat"));
        assert_eq!(t2.inputs[0].dest, PathBuf::from("x.dat"));
        assert_eq!(t2.invocation("demo").prefix, "run2");
    }

    #[test]
    fn test_suite_name_without_dash() {
        let err = Suite::from_data(
            &json!({"suite-name": "my-demo", "tests": []}),
            Path::new("suite-x.yml"),
            &ctx(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("must not contain"));
    }

    #[test]
    fn test_unknown_query_set() {
        let err = Suite::from_data(
            &json!({"suite-name": "demo", "tests": [{"test-name": "t1", "queries": ["nope"]}]}),
            Path::new("suite-demo.yml"),
            &ctx(),
        )
        .unwrap_err();
        assert!(matches!(err, HarnessError::UnknownQuerySet { .. }));
    }

    #[test]
    fn test_duplicate_test_names() {
        let err = Suite::from_data(
            &json!({"suite-name": "demo", "tests": [
                {"test-name": "t1", "queries": ["qs1"]},
                {"test-name": "t1", "queries": ["qs1"]}
            ]}),
            Path::new("suite-demo.yml"),
            &ctx(),
        )
        .unwrap_err();
        assert!(matches!(err, HarnessError::DuplicateName { kind: "test", .. }));
    }

    #[test]
    fn test_inputs_cannot_escape() {
        for input in [json!(["../secret"]), json!({"/etc/passwd": "a"})] {
            let err = Suite::from_data(
                &json!({"suite-name": "demo", "tests": [{"test-name": "t1", "input": input, "queries": ["qs1"]}]}),
                Path::new("suite-demo.yml"),
                &ctx(),
            );
            assert!(err.is_err());
        }
        let err = Suite::from_data(
            &json!({"suite-name": "demo", "tests": [{"test-name": "t1", "base-dir": "..", "queries": ["qs1"]}]}),
            Path::new("suite-demo.yml"),
            &ctx(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_to_data_roundtrip() {
        let ctx = ctx();
        let origin = Path::new("/suites/suite-demo.yml");
        let suite = Suite::from_data(
            &json!({"suite-name": "demo", "tests": [
                {"test-name": "t2", "prefix": "run2", "args": ["-v"], "base-dir": "data",
                 "input": {"x.dat": "y.dat"}, "queries": ["qs1"]}
            ]}),
            origin,
            &ctx,
        )
        .unwrap();
        let again = Suite::from_data(&suite.to_data(), origin, &ctx).unwrap();
        assert_eq!(again, suite);
    }
}
