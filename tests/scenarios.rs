//! End-to-end scenarios exercising the full publish/resolve/test
//! pipeline through the library surface.

use std::fs;
use std::path::Path;

use promptpm::registry::LocalRegistry;
use promptpm::resolver::DependencyResolver;
use promptpm::schema::{load_prompt_module, validate_prompt_module};
use promptpm::test_runner::run_prompt_module_tests;

fn write_module(dir: &Path, name: &str, version: &str, extra_yaml: &str, template: &str) {
    fs::write(
        dir.join("promptpm.yaml"),
        format!(
            "module:\n  name: {name}\n  version: \"{version}\"\n  description: d\nprompt:\n  template: template.prompt\n  placeholders: [document]\ninterface:\n  intent: x\n  inputs:\n    - name: document\n      type: text\n      description: d\n      required: true\n  outputs: []\n{extra}",
            name = name,
            version = version,
            extra = extra_yaml,
        ),
    )
    .unwrap();
    fs::write(dir.join("template.prompt"), template).unwrap();
}

#[test]
fn successful_publish_then_conflict_on_rerun() {
    let registry_dir = tempfile::tempdir().unwrap();
    let registry = LocalRegistry::new(registry_dir.path()).unwrap();

    let module_dir = tempfile::tempdir().unwrap();
    write_module(
        module_dir.path(),
        "publish-module",
        "1.0.0",
        "tests:\n  - name: publish-check\n    inputs:\n      document: hello\n    assertions:\n      - contains: \"hello\"\n",
        "{{document}}",
    );

    let module = load_prompt_module(module_dir.path()).unwrap();
    validate_prompt_module(&module).unwrap();
    let test_result = run_prompt_module_tests(module_dir.path()).unwrap();
    assert_eq!((test_result.total, test_result.passed, test_result.failed), (1, 1, 0));

    assert!(!registry.has_version("publish-module", "1.0.0").unwrap());
    let installed = registry.install(module_dir.path(), "publish-module", "1.0.0").unwrap();
    assert!(installed.path.join(".promptpm_immutable.json").is_file());

    let conflict = registry.install(module_dir.path(), "publish-module", "1.0.0").unwrap_err();
    assert_eq!(conflict.code(), "DEPENDENCY_ERROR");
    assert!(conflict.to_string().contains("already installed"));
}

#[test]
fn dependency_resolution_order() {
    let registry_dir = tempfile::tempdir().unwrap();
    let registry = LocalRegistry::new(registry_dir.path()).unwrap();

    let dep_c_dir = tempfile::tempdir().unwrap();
    write_module(dep_c_dir.path(), "dep-c", "1.0.0", "", "c");
    registry.install(dep_c_dir.path(), "dep-c", "1.0.0").unwrap();

    let dep_a_dir = tempfile::tempdir().unwrap();
    write_module(
        dep_a_dir.path(),
        "dep-a",
        "1.0.0",
        "dependencies:\n  - name: dep-c\n    version: \">=1.0.0\"\n",
        "a",
    );
    registry.install(dep_a_dir.path(), "dep-a", "1.0.0").unwrap();

    let dep_b_dir = tempfile::tempdir().unwrap();
    write_module(dep_b_dir.path(), "dep-b", "1.0.0", "", "b");
    registry.install(dep_b_dir.path(), "dep-b", "1.0.0").unwrap();

    let root_dir = tempfile::tempdir().unwrap();
    write_module(
        root_dir.path(),
        "root",
        "1.0.0",
        "dependencies:\n  - name: dep-b\n    version: \">=1.0.0\"\n  - name: dep-a\n    version: \">=1.0.0\"\n",
        "root",
    );

    let resolver = DependencyResolver::new(&registry);
    let resolved = resolver.resolve_for_module(root_dir.path()).unwrap();
    let names: Vec<&str> = resolved.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["dep-c", "dep-a", "dep-b"]);
}

#[test]
fn caret_selection_picks_highest_matching_minor() {
    let registry_dir = tempfile::tempdir().unwrap();
    let registry = LocalRegistry::new(registry_dir.path()).unwrap();

    for version in ["1.2.0", "1.5.0", "2.0.0"] {
        let dir = tempfile::tempdir().unwrap();
        write_module(dir.path(), "dep", version, "", "d");
        registry.install(dir.path(), "dep", version).unwrap();
    }

    let root_dir = tempfile::tempdir().unwrap();
    write_module(
        root_dir.path(),
        "root",
        "1.0.0",
        "dependencies:\n  - name: dep\n    version: \"^1.2.0\"\n",
        "root",
    );

    let resolver = DependencyResolver::new(&registry);
    let resolved = resolver.resolve_for_module(root_dir.path()).unwrap();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].version, "1.5.0");
}

#[test]
fn undeclared_placeholder_fails_validation() {
    let module_dir = tempfile::tempdir().unwrap();
    fs::write(
        module_dir.path().join("promptpm.yaml"),
        r#"
module:
  name: demo
  version: "1.0.0"
  description: d
prompt:
  template: template.prompt
  placeholders: [undeclared_input]
interface:
  intent: x
  inputs:
    - name: document
      type: text
      description: d
      required: true
  outputs: []
"#,
    )
    .unwrap();
    fs::write(module_dir.path().join("template.prompt"), "{{undeclared_input}}").unwrap();

    let err = load_prompt_module(module_dir.path()).unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");
    assert!(err.to_string().contains("Undeclared placeholders used in template"));
}

#[test]
fn tamper_detection_after_publish() {
    let registry_dir = tempfile::tempdir().unwrap();
    let registry = LocalRegistry::new(registry_dir.path()).unwrap();

    let module_dir = tempfile::tempdir().unwrap();
    write_module(module_dir.path(), "tamper-check", "1.0.0", "", "original");
    let installed = registry.install(module_dir.path(), "tamper-check", "1.0.0").unwrap();

    fs::write(installed.path.join("template.prompt"), "tampered").unwrap();

    let err = registry.lookup("tamper-check", "1.0.0").unwrap_err();
    assert_eq!(err.code(), "DEPENDENCY_ERROR");
    assert!(err.to_string().contains("Immutability check failed"));
}
