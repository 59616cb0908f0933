use crate::execution::graph::PipelineGraph;
use crate::workflow::models::Pipeline;
use crate::GateResult;

use std::fs;
use std::path::Path;

/// Parser for pipeline YAML files.
pub struct PipelineParser;

impl PipelineParser {
    /// Parse a pipeline from a file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> GateResult<Pipeline> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse a pipeline from a YAML string.
    pub fn parse(content: &str) -> GateResult<Pipeline> {
        let pipeline: Pipeline = serde_yaml::from_str(content)?;
        Ok(pipeline)
    }

    /// Parse a pipeline and build its validated dependency graph.
    ///
    /// Every configuration error found is reported, not only the first.
    pub fn load<P: AsRef<Path>>(path: P) -> GateResult<PipelineGraph> {
        let pipeline = Self::from_file(path)?;
        Ok(PipelineGraph::build(&pipeline)?)
    }

    /// Parse and validate a pipeline from a YAML string.
    pub fn parse_and_validate(content: &str) -> GateResult<PipelineGraph> {
        let pipeline = Self::parse(content)?;
        Ok(PipelineGraph::build(&pipeline)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConfigError, GateError};

    use std::io::Write;

    const RSTAR_CI: &str = r#"
name: CI
env:
  CARGO_TERM_COLOR: always
jobs:
  - name: ci-result
    aggregate: true
    needs: [rstar, no_std]
  - name: rstar
    skip_if: "contains(commit.message, '[ci skip]')"
    matrix:
      container_image:
        - georust/geo-ci:rust-1.63
        - georust/geo-ci:rust-1.64
        - georust/geo-ci:rust-1.65
    steps:
      - uses: actions/checkout@v2
      - run: cargo install cargo-all-features
      - run: cargo build-all-features
      - run: cargo test-all-features
  - name: no_std
    steps:
      - uses: actions/checkout@v2
      - run: rustup target add thumbv7em-none-eabihf
      - run: cargo build --target thumbv7em-none-eabihf -Z avoid-dev-deps
"#;

    #[test]
    fn test_parse_minimal_pipeline() {
        let yaml = r#"
jobs:
  - name: build
    steps:
      - run: echo "Hello"
"#;
        let pipeline = PipelineParser::parse(yaml).unwrap();
        assert!(pipeline.name.is_none());
        assert_eq!(pipeline.jobs.len(), 1);
        assert_eq!(pipeline.jobs[0].name, "build");
    }

    #[test]
    fn test_parse_and_validate_rstar_ci() {
        let graph = PipelineParser::parse_and_validate(RSTAR_CI).unwrap();
        assert_eq!(graph.name(), "CI");
        assert_eq!(graph.gate().spec.name, "ci-result");
        assert_eq!(graph.total_instances(), 5);
    }

    #[test]
    fn test_undefined_dependency_fails_validation() {
        let yaml = r#"
jobs:
  - name: rstar
    steps:
      - run: cargo test
  - name: ci-result
    aggregate: true
    needs: [rstar, ghost]
"#;
        let err = PipelineParser::parse_and_validate(yaml).unwrap_err();
        let GateError::Config(errors) = err else {
            panic!("expected configuration error, got {err:?}");
        };
        assert_eq!(
            errors,
            vec![ConfigError::UnknownDependency {
                job: "ci-result".to_string(),
                dependency: "ghost".to_string(),
            }]
        );
    }

    #[test]
    fn test_yaml_syntax_error() {
        let err = PipelineParser::parse("jobs: [").unwrap_err();
        assert!(matches!(err, GateError::Yaml(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(RSTAR_CI.as_bytes()).unwrap();

        let graph = PipelineParser::load(file.path()).unwrap();
        assert_eq!(graph.nodes().len(), 3);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = PipelineParser::load(dir.path().join("missing.yml")).unwrap_err();
        assert!(matches!(err, GateError::Io(_)));
    }
}
