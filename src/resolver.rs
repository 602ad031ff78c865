//! Deterministic local dependency resolution with cycle detection.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::Path;

use crate::errors::{PromptPmError, Result};
use crate::registry::{InstalledModule, LocalRegistry};
use crate::schema::{load_prompt_module, validate_prompt_module, DependencySpec};
use crate::semver_engine::{compare_versions, parse_version, satisfies_version_range};

/// `(name, version, absolute_path)` of a dependency selected and ordered
/// by the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDependency {
    pub name: String,
    pub version: String,
    pub path: String,
}

pub struct DependencyResolver<'a> {
    registry: &'a LocalRegistry,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(registry: &'a LocalRegistry) -> Self {
        DependencyResolver { registry }
    }

    /// Resolve all transitive dependencies for the module rooted at
    /// `module_path`, in reverse topological order (dependencies before
    /// dependents).
    pub fn resolve_for_module(&self, module_path: &Path) -> Result<Vec<ResolvedDependency>> {
        let module = load_prompt_module(module_path)?;
        validate_prompt_module(&module)?;

        let mut resolved = Vec::new();
        let mut visiting: Vec<String> = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();

        let owner = module.source_path.display().to_string();
        for dependency in &module.dependencies {
            let installed = self.select_installed_version(dependency, &owner)?;
            self.visit(&installed, &mut resolved, &mut visiting, &mut visited)?;
        }

        Ok(resolved)
    }

    fn visit(
        &self,
        module: &InstalledModule,
        resolved: &mut Vec<ResolvedDependency>,
        visiting: &mut Vec<String>,
        visited: &mut HashSet<String>,
    ) -> Result<()> {
        let node_id = format!("{}@{}", module.name, module.version);
        if visited.contains(&node_id) {
            return Ok(());
        }

        if visiting.contains(&node_id) {
            let mut cycle = visiting.clone();
            cycle.push(node_id);
            return Err(PromptPmError::dependency(format!(
                "Cyclic dependency detected: {}",
                cycle.join(" -> ")
            )));
        }

        visiting.push(node_id.clone());

        let visit_result = (|| -> Result<()> {
            let loaded = load_prompt_module(&module.path)?;
            validate_prompt_module(&loaded)?;
            for dependency in &loaded.dependencies {
                let installed = self.select_installed_version(dependency, &node_id)?;
                self.visit(&installed, resolved, visiting, visited)?;
            }
            Ok(())
        })();

        visiting.pop();
        visit_result?;

        visited.insert(node_id);
        resolved.push(ResolvedDependency {
            name: module.name.clone(),
            version: module.version.clone(),
            path: module.path.display().to_string(),
        });

        Ok(())
    }

    fn select_installed_version(&self, dependency: &DependencySpec, parent: &str) -> Result<InstalledModule> {
        let candidates = self.registry.list_by_name(&dependency.name)?;
        if candidates.is_empty() {
            return Err(PromptPmError::dependency(format!(
                "Dependency not found for {}: {} ({})",
                parent, dependency.name, dependency.version_range
            )));
        }

        let mut matching = Vec::new();
        for candidate in &candidates {
            let semantic_version = parse_version(&candidate.version).map_err(|err| {
                PromptPmError::dependency(format!(
                    "Invalid semantic version while resolving {} ({}): {}",
                    dependency.name, dependency.version_range, err
                ))
            })?;
            if satisfies_version_range(&semantic_version, &dependency.version_range).map_err(|err| {
                PromptPmError::dependency(format!(
                    "Invalid semantic version while resolving {} ({}): {}",
                    dependency.name, dependency.version_range, err
                ))
            })? {
                matching.push((semantic_version, candidate.clone()));
            }
        }

        if matching.is_empty() {
            return Err(PromptPmError::dependency(format!(
                "No installed versions satisfy dependency for {}: {} ({})",
                parent, dependency.name, dependency.version_range
            )));
        }

        matching.sort_by(|left, right| compare_candidate_version(left, right));
        Ok(matching
            .into_iter()
            .last()
            .expect("matching is non-empty")
            .1)
    }
}

/// SemVer precedence first, then exact version string as a deterministic
/// tiebreak since precedence ignores build metadata.
fn compare_candidate_version(
    left: &(crate::semver_engine::SemanticVersion, InstalledModule),
    right: &(crate::semver_engine::SemanticVersion, InstalledModule),
) -> Ordering {
    match compare_versions(&left.0, &right.0) {
        Ordering::Equal => left.1.version.cmp(&right.1.version),
        ordering => ordering,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_module(dir: &Path, yaml: &str) {
        fs::write(dir.join("promptpm.yaml"), yaml).unwrap();
        fs::write(dir.join("template.prompt"), "hello\n").unwrap();
    }

    fn install(registry: &LocalRegistry, name: &str, version: &str, dependencies_yaml: &str) {
        let source = tempfile::tempdir().unwrap();
        write_module(
            source.path(),
            &format!(
                "module:\n  name: {name}\n  version: \"{version}\"\n  description: d\nprompt:\n  template: template.prompt\n  placeholders: []\ninterface:\n  intent: x\n  inputs: []\n  outputs: []\n{deps}",
                name = name,
                version = version,
                deps = dependencies_yaml,
            ),
        );
        registry.install(source.path(), name, version).unwrap();
    }

    #[test]
    fn resolves_linear_chain_in_dependency_first_order() {
        let registry_dir = tempfile::tempdir().unwrap();
        let registry = LocalRegistry::new(registry_dir.path()).unwrap();

        install(&registry, "base", "1.0.0", "");
        install(
            &registry,
            "mid",
            "1.0.0",
            "dependencies:\n  - name: base\n    version: \"^1.0.0\"\n",
        );

        let root = tempfile::tempdir().unwrap();
        write_module(
            root.path(),
            "module:\n  name: root\n  version: \"1.0.0\"\n  description: d\nprompt:\n  template: template.prompt\n  placeholders: []\ninterface:\n  intent: x\n  inputs: []\n  outputs: []\ndependencies:\n  - name: mid\n    version: \"^1.0.0\"\n",
        );

        let resolver = DependencyResolver::new(&registry);
        let resolved = resolver.resolve_for_module(root.path()).unwrap();
        let names: Vec<&str> = resolved.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["base", "mid"]);
    }

    #[test]
    fn selects_highest_matching_version() {
        let registry_dir = tempfile::tempdir().unwrap();
        let registry = LocalRegistry::new(registry_dir.path()).unwrap();

        install(&registry, "lib", "1.0.0", "");
        install(&registry, "lib", "1.5.0", "");
        install(&registry, "lib", "2.0.0", "");

        let root = tempfile::tempdir().unwrap();
        write_module(
            root.path(),
            "module:\n  name: root\n  version: \"1.0.0\"\n  description: d\nprompt:\n  template: template.prompt\n  placeholders: []\ninterface:\n  intent: x\n  inputs: []\n  outputs: []\ndependencies:\n  - name: lib\n    version: \"^1.0.0\"\n",
        );

        let resolver = DependencyResolver::new(&registry);
        let resolved = resolver.resolve_for_module(root.path()).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].version, "1.5.0");
    }

    #[test]
    fn detects_cycles() {
        let registry_dir = tempfile::tempdir().unwrap();
        let registry = LocalRegistry::new(registry_dir.path()).unwrap();

        install(
            &registry,
            "a",
            "1.0.0",
            "dependencies:\n  - name: b\n    version: \"^1.0.0\"\n",
        );
        install(
            &registry,
            "b",
            "1.0.0",
            "dependencies:\n  - name: a\n    version: \"^1.0.0\"\n",
        );

        let root = tempfile::tempdir().unwrap();
        write_module(
            root.path(),
            "module:\n  name: root\n  version: \"1.0.0\"\n  description: d\nprompt:\n  template: template.prompt\n  placeholders: []\ninterface:\n  intent: x\n  inputs: []\n  outputs: []\ndependencies:\n  - name: a\n    version: \"^1.0.0\"\n",
        );

        let resolver = DependencyResolver::new(&registry);
        let err = resolver.resolve_for_module(root.path()).unwrap_err();
        assert_eq!(err.code(), "DEPENDENCY_ERROR");
        assert!(err.to_string().contains("Cyclic dependency detected"));
    }

    #[test]
    fn missing_dependency_is_reported() {
        let registry_dir = tempfile::tempdir().unwrap();
        let registry = LocalRegistry::new(registry_dir.path()).unwrap();

        let root = tempfile::tempdir().unwrap();
        write_module(
            root.path(),
            "module:\n  name: root\n  version: \"1.0.0\"\n  description: d\nprompt:\n  template: template.prompt\n  placeholders: []\ninterface:\n  intent: x\n  inputs: []\n  outputs: []\ndependencies:\n  - name: missing\n    version: \"^1.0.0\"\n",
        );

        let resolver = DependencyResolver::new(&registry);
        let err = resolver.resolve_for_module(root.path()).unwrap_err();
        assert_eq!(err.code(), "DEPENDENCY_ERROR");
    }
}
