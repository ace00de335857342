//! Execution plans and step filtering.

use std::collections::HashSet;

use tracing::warn;

use crate::error::{Result, RolloutError};
use crate::steps::Step;

use super::dependency::DependencyGraph;

/// Which steps of a workflow to run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepFilter {
    /// If non-empty, run only these steps.
    pub only: Vec<String>,
    /// Never run these steps.
    pub skip: Vec<String>,
}

impl StepFilter {
    /// Whether the filter removes nothing.
    pub fn is_empty(&self) -> bool {
        self.only.is_empty() && self.skip.is_empty()
    }

    /// Names of steps the filter removes, in registration order.
    ///
    /// Naming a step that is not part of `steps` is an error.
    pub fn excluded(&self, steps: &[Step]) -> Result<Vec<String>> {
        let known: HashSet<&str> = steps.iter().map(|s| s.name.as_str()).collect();
        for (flag, names) in [("--steps-only", &self.only), ("--skip-steps", &self.skip)] {
            if let Some(unknown) = names.iter().find(|n| !known.contains(n.as_str())) {
                return Err(RolloutError::ConfigValidationError {
                    message: format!("Unknown step '{}' in {}", unknown, flag),
                });
            }
        }

        Ok(steps
            .iter()
            .map(|s| &s.name)
            .filter(|name| {
                (!self.only.is_empty() && !self.only.contains(name)) || self.skip.contains(name)
            })
            .cloned()
            .collect())
    }
}

/// Steps grouped into dependency levels.
///
/// Steps in the same level have no edges between them. In sequential mode
/// each step forms its own level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    levels: Vec<Vec<String>>,
    excluded: Vec<String>,
}

impl ExecutionPlan {
    /// Plan every step.
    pub fn build(steps: &[Step]) -> Result<Self> {
        Self::build_excluding(steps, &[])
    }

    /// Plan all steps except `excluded`.
    ///
    /// Dependencies on an excluded step are treated as satisfied. Unknown
    /// dependencies and cycles are still errors.
    pub fn build_excluding(steps: &[Step], excluded: &[String]) -> Result<Self> {
        let known: HashSet<&str> = steps.iter().map(|s| s.name.as_str()).collect();
        let removed: HashSet<&str> = excluded.iter().map(String::as_str).collect();

        let mut builder = DependencyGraph::builder();
        for step in steps.iter().filter(|s| !removed.contains(s.name.as_str())) {
            let mut deps = Vec::with_capacity(step.dependencies.len());
            for dep in &step.dependencies {
                if !known.contains(dep.as_str()) {
                    return Err(RolloutError::UnknownDependency {
                        step: step.name.clone(),
                        dependency: dep.clone(),
                    });
                }
                if removed.contains(dep.as_str()) {
                    warn!(
                        "Dependency '{}' of '{}' is excluded; treating it as satisfied",
                        dep, step.name
                    );
                } else {
                    deps.push(dep.clone());
                }
            }
            builder = builder.add_step(step.name.clone(), deps);
        }

        let levels = builder.build()?.levels()?;
        Ok(Self {
            levels,
            excluded: excluded.to_vec(),
        })
    }

    /// Plan with each step in its own level, preserving topological order.
    pub fn sequential(&self) -> Self {
        Self {
            levels: self.steps().map(|s| vec![s.to_string()]).collect(),
            excluded: self.excluded.clone(),
        }
    }

    pub fn levels(&self) -> &[Vec<String>] {
        &self.levels
    }

    /// Steps removed by filters.
    pub fn excluded(&self) -> &[String] {
        &self.excluded
    }

    /// Planned steps in topological order.
    pub fn steps(&self) -> impl Iterator<Item = &str> {
        self.levels.iter().flatten().map(String::as_str)
    }

    /// Number of planned steps.
    pub fn len(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::StepContext;

    fn step(name: &str, deps: &[&str]) -> Step {
        Step::new(name, |_: &StepContext| Ok(())).depends_on(deps.iter().copied())
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn chain() -> Vec<Step> {
        vec![
            step("setup", &[]),
            step("deploy", &["setup"]),
            step("e2e-test", &["deploy"]),
        ]
    }

    #[test]
    fn plan_orders_by_dependencies() {
        let plan = ExecutionPlan::build(&chain()).unwrap();
        assert_eq!(plan.steps().collect::<Vec<_>>(), vec!["setup", "deploy", "e2e-test"]);
        assert_eq!(plan.len(), 3);
    }

    #[test]
    fn sequential_plan_has_single_step_levels() {
        let steps = vec![step("a", &[]), step("b", &[])];
        let plan = ExecutionPlan::build(&steps).unwrap();
        assert_eq!(plan.levels().len(), 1);

        let sequential = plan.sequential();
        assert_eq!(sequential.levels(), &[names(&["a"]), names(&["b"])]);
    }

    #[test]
    fn excluded_dependency_is_satisfied() {
        let plan =
            ExecutionPlan::build_excluding(&chain(), &names(&["setup"])).unwrap();
        assert_eq!(plan.levels(), &[names(&["deploy"]), names(&["e2e-test"])]);
        assert_eq!(plan.excluded(), &names(&["setup"])[..]);
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let err = ExecutionPlan::build(&[step("deploy", &["ghost"])]).unwrap_err();
        assert!(matches!(err, RolloutError::UnknownDependency { .. }));
    }

    #[test]
    fn cycle_is_rejected() {
        let err = ExecutionPlan::build(&[step("a", &["b"]), step("b", &["a"])]).unwrap_err();
        assert!(matches!(err, RolloutError::CircularDependency { .. }));
    }

    #[test]
    fn filter_skip_and_only() {
        let steps = chain();
        let skip = StepFilter {
            skip: names(&["e2e-test"]),
            ..Default::default()
        };
        assert_eq!(skip.excluded(&steps).unwrap(), names(&["e2e-test"]));

        let only = StepFilter {
            only: names(&["deploy"]),
            ..Default::default()
        };
        assert_eq!(only.excluded(&steps).unwrap(), names(&["setup", "e2e-test"]));
        assert!(StepFilter::default().excluded(&steps).unwrap().is_empty());
    }

    #[test]
    fn filter_rejects_unknown_names() {
        let filter = StepFilter {
            skip: names(&["nope"]),
            ..Default::default()
        };
        let err = filter.excluded(&chain()).unwrap_err();
        assert!(err.to_string().contains("--skip-steps"));
    }
}
