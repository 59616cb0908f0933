// Matrix Expansion
// Expands a job's parameter axes into concrete job instances

use crate::error::ConfigError;
use crate::execution::instance::{InstanceId, JobInstance};
use crate::workflow::models::JobSpec;

use std::collections::HashSet;

/// Matrix expander for job specs
pub struct MatrixExpander;

impl MatrixExpander {
    /// Expand a job into one instance per combination of axis values.
    ///
    /// Combinations are enumerated row-major: the last axis varies fastest.
    /// A job without axes yields exactly one instance.
    pub fn expand(spec: &JobSpec) -> Result<Vec<JobInstance>, Vec<ConfigError>> {
        let errors = Self::validate(spec);
        if !errors.is_empty() {
            return Err(errors);
        }

        let mut combinations: Vec<Vec<(String, String)>> = vec![Vec::new()];

        for axis in &spec.matrix.axes {
            combinations = combinations
                .into_iter()
                .flat_map(|prefix| {
                    axis.values.iter().map(move |value| {
                        let mut combination = prefix.clone();
                        combination.push((axis.name.clone(), value.clone()));
                        combination
                    })
                })
                .collect();
        }

        Ok(combinations
            .into_iter()
            .map(|parameters| JobInstance {
                id: InstanceId::new(
                    spec.name.clone(),
                    parameters.iter().map(|(_, value)| value.clone()).collect(),
                ),
                parameters,
            })
            .collect())
    }

    fn validate(spec: &JobSpec) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        for axis in &spec.matrix.axes {
            if axis.values.is_empty() {
                errors.push(ConfigError::EmptyMatrixAxis {
                    job: spec.name.clone(),
                    axis: axis.name.clone(),
                });
                continue;
            }

            let mut seen = HashSet::new();
            for value in &axis.values {
                if value.contains(", ") {
                    errors.push(ConfigError::AmbiguousMatrixValue {
                        job: spec.name.clone(),
                        axis: axis.name.clone(),
                        value: value.clone(),
                    });
                }
                if !seen.insert(value.as_str()) {
                    errors.push(ConfigError::DuplicateMatrixValue {
                        job: spec.name.clone(),
                        axis: axis.name.clone(),
                        value: value.clone(),
                    });
                }
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::models::Step;

    fn job() -> JobSpec {
        JobSpec::new("rstar", vec![Step::run("cargo test")])
    }

    #[test]
    fn test_no_axes_single_instance() {
        let instances = MatrixExpander::expand(&job()).unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].id.to_string(), "rstar");
        assert!(instances[0].parameters.is_empty());
    }

    #[test]
    fn test_single_axis() {
        let spec = job().with_axis("container_image", &["img-a", "img-b", "img-c"]);
        let ids: Vec<String> = MatrixExpander::expand(&spec)
            .unwrap()
            .iter()
            .map(|i| i.id.to_string())
            .collect();
        assert_eq!(
            ids,
            vec!["rstar (img-a)", "rstar (img-b)", "rstar (img-c)"]
        );
    }

    #[test]
    fn test_cartesian_product_row_major() {
        let spec = job()
            .with_axis("os", &["linux", "macos"])
            .with_axis("rust", &["stable", "beta", "nightly"]);

        let instances = MatrixExpander::expand(&spec).unwrap();
        assert_eq!(instances.len(), 6);

        let ids: Vec<String> = instances.iter().map(|i| i.id.to_string()).collect();
        assert_eq!(ids[0], "rstar (linux, stable)");
        assert_eq!(ids[1], "rstar (linux, beta)");
        assert_eq!(ids[3], "rstar (macos, stable)");

        let distinct: HashSet<_> = instances.iter().map(|i| i.id.clone()).collect();
        assert_eq!(distinct.len(), 6);

        assert_eq!(
            instances[5].parameters,
            vec![
                ("os".to_string(), "macos".to_string()),
                ("rust".to_string(), "nightly".to_string()),
            ]
        );
    }

    #[test]
    fn test_expansion_is_deterministic() {
        let spec = job().with_axis("a", &["1", "2"]).with_axis("b", &["x", "y"]);
        assert_eq!(
            MatrixExpander::expand(&spec).unwrap(),
            MatrixExpander::expand(&spec).unwrap()
        );
    }

    #[test]
    fn test_empty_axis_is_config_error() {
        let spec = job().with_axis("os", &["linux"]).with_axis("rust", &[]);
        let errors = MatrixExpander::expand(&spec).unwrap_err();
        assert_eq!(
            errors,
            vec![ConfigError::EmptyMatrixAxis {
                job: "rstar".to_string(),
                axis: "rust".to_string(),
            }]
        );
    }

    #[test]
    fn test_duplicate_value_is_config_error() {
        let spec = job().with_axis("rust", &["stable", "beta", "stable"]);
        let errors = MatrixExpander::expand(&spec).unwrap_err();
        assert_eq!(
            errors,
            vec![ConfigError::DuplicateMatrixValue {
                job: "rstar".to_string(),
                axis: "rust".to_string(),
                value: "stable".to_string(),
            }]
        );
    }

    #[test]
    fn test_value_with_separator_is_config_error() {
        // "a, b" alone would render like the pair ("a", "b")
        let spec = job().with_axis("target", &["a, b", "c"]);
        let errors = MatrixExpander::expand(&spec).unwrap_err();
        assert_eq!(
            errors,
            vec![ConfigError::AmbiguousMatrixValue {
                job: "rstar".to_string(),
                axis: "target".to_string(),
                value: "a, b".to_string(),
            }]
        );

        let spec = job().with_axis("target", &["a,b", "c"]);
        assert!(MatrixExpander::expand(&spec).is_ok());
    }
}
