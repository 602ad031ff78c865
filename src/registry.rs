//! Local, content-addressed filesystem registry.
//!
//! Installed modules live at `<root>/modules/<name>/<version>/…` with an
//! immutability manifest (`.promptpm_immutable.json`) at the root of each
//! installed version. Staging + atomic rename keeps the registry
//! consistent under failure mid-install.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::errors::{PromptPmError, Result};

const MODULES_DIRNAME: &str = "modules";
const IMMUTABILITY_MANIFEST_FILENAME: &str = ".promptpm_immutable.json";

/// `(name, version, absolute_path)` within the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledModule {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct ManifestFileEntry {
    path: String,
    sha256: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ImmutabilityManifest {
    name: String,
    version: String,
    algorithm: String,
    files: Vec<ManifestFileEntry>,
}

pub struct LocalRegistry {
    root_path: PathBuf,
    modules_root: PathBuf,
}

impl LocalRegistry {
    pub fn new(root_path: impl AsRef<Path>) -> Result<Self> {
        let root_path = root_path.as_ref();
        let absolute = if root_path.is_absolute() {
            root_path.to_path_buf()
        } else {
            std::env::current_dir()?.join(root_path)
        };
        let modules_root = absolute.join(MODULES_DIRNAME);
        Ok(LocalRegistry {
            root_path: absolute,
            modules_root,
        })
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Install a module directory. `module_path` must already have been
    /// loaded and validated by the caller.
    pub fn install(&self, module_path: &Path, name: &str, version: &str) -> Result<InstalledModule> {
        let safe_name = validate_segment(name, "module.name")?;
        let safe_version = validate_segment(version, "module.version")?;
        let destination = self.module_directory(&safe_name, &safe_version);

        if destination.exists() {
            return Err(PromptPmError::dependency(format!(
                "Module already installed: {}@{}. Published versions are immutable and cannot be overwritten.",
                safe_name, safe_version
            )));
        }

        if !module_path.is_dir() {
            return Err(PromptPmError::dependency(format!(
                "Module path must be a directory: {}",
                module_path.display()
            )));
        }

        let parent = destination
            .parent()
            .expect("module_directory always has a parent");
        fs::create_dir_all(parent)?;

        let staging_dir = staging_path(&destination);
        if staging_dir.exists() {
            fs::remove_dir_all(&staging_dir)?;
        }

        let install_result = (|| -> Result<()> {
            copy_tree_deterministic(module_path, &staging_dir)?;
            write_immutability_manifest(&staging_dir, &safe_name, &safe_version)?;
            fs::rename(&staging_dir, &destination)?;
            Ok(())
        })();

        if let Err(err) = install_result {
            if staging_dir.is_dir() {
                let _ = fs::remove_dir_all(&staging_dir);
            }
            log::error!("install failed for {}@{}: {}", safe_name, safe_version, err);
            return Err(PromptPmError::dependency(format!(
                "Failed to install module {}@{}: {}",
                safe_name, safe_version, err
            )));
        }

        log::info!("installed {}@{} at {}", safe_name, safe_version, destination.display());
        Ok(InstalledModule {
            name: safe_name,
            version: safe_version,
            path: destination,
        })
    }

    pub fn lookup(&self, name: &str, version: &str) -> Result<InstalledModule> {
        let safe_name = validate_segment(name, "name")?;
        let safe_version = validate_segment(version, "version")?;
        let path = self.module_directory(&safe_name, &safe_version);

        if !path.is_dir() {
            return Err(PromptPmError::dependency(format!(
                "Module not found: {}@{}",
                safe_name, safe_version
            )));
        }

        verify_immutability(&path, &safe_name, &safe_version)?;
        Ok(InstalledModule {
            name: safe_name,
            version: safe_version,
            path,
        })
    }

    /// All versions of `name` sorted by raw directory name, each
    /// immutability-verified before being returned.
    pub fn list_by_name(&self, name: &str) -> Result<Vec<InstalledModule>> {
        let safe_name = validate_segment(name, "name")?;
        let module_dir = self.modules_root.join(&safe_name);
        if !module_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut version_dirs: Vec<String> = fs::read_dir(&module_dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        version_dirs.sort();

        let mut installed = Vec::with_capacity(version_dirs.len());
        for version in version_dirs {
            let safe_version = validate_segment(&version, "version")?;
            let path = module_dir.join(&safe_version);
            verify_immutability(&path, &safe_name, &safe_version)?;
            installed.push(InstalledModule {
                name: safe_name.clone(),
                version: safe_version,
                path,
            });
        }
        Ok(installed)
    }

    /// Deterministic flat enumeration across names then versions. Every
    /// manifest is re-verified on each call; no caching layer sits in
    /// front of it (see DESIGN.md).
    pub fn list_installed(&self) -> Result<Vec<InstalledModule>> {
        if !self.modules_root.is_dir() {
            return Ok(Vec::new());
        }

        let mut names: Vec<String> = fs::read_dir(&self.modules_root)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();

        let mut installed = Vec::new();
        for name in names {
            installed.extend(self.list_by_name(&name)?);
        }
        Ok(installed)
    }

    pub fn has_version(&self, name: &str, version: &str) -> Result<bool> {
        let safe_name = validate_segment(name, "name")?;
        let safe_version = validate_segment(version, "version")?;
        Ok(self.module_directory(&safe_name, &safe_version).is_dir())
    }

    fn module_directory(&self, name: &str, version: &str) -> PathBuf {
        self.modules_root.join(name).join(version)
    }
}

fn staging_path(destination: &Path) -> PathBuf {
    let mut staging = destination.as_os_str().to_owned();
    staging.push(".tmp");
    PathBuf::from(staging)
}

/// Path-safety gate: reject `.`, `..`, separators, and anything outside
/// the grammar before any filesystem touch.
fn validate_segment(value: &str, field: &str) -> Result<String> {
    if value.is_empty() {
        return Err(PromptPmError::dependency(format!("{} must be a non-empty string", field)));
    }
    if value == "." || value == ".." {
        return Err(PromptPmError::dependency(format!(
            "{} contains invalid path segment: {:?}",
            field, value
        )));
    }
    if value.contains('/') || value.contains('\\') {
        return Err(PromptPmError::dependency(format!(
            "{} must not include path separators: {:?}",
            field, value
        )));
    }

    let mut chars = value.chars();
    let first_ok = chars
        .next()
        .map(|c| c.is_ascii_alphanumeric())
        .unwrap_or(false);
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '-'));

    if !first_ok || !rest_ok {
        return Err(PromptPmError::dependency(format!(
            "{} contains unsupported characters: {:?}. Use letters, numbers, '.', '_', '+', or '-'.",
            field, value
        )));
    }

    Ok(value.to_string())
}

/// Walk a source tree deterministically (pre-sorted at every level),
/// rejecting symlinks at any depth, and copy regular files into
/// `destination_dir`.
fn copy_tree_deterministic(source_dir: &Path, destination_dir: &Path) -> Result<()> {
    fs::create_dir(destination_dir)?;
    for relative in iter_files_sorted(source_dir)? {
        let source_file = source_dir.join(&relative);
        let target_file = destination_dir.join(&relative);
        if let Some(parent) = target_file.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&source_file, &target_file)?;
    }
    Ok(())
}

/// Deterministically enumerate regular files under `root`, returning
/// POSIX-style relative paths, sorted at every directory level.
/// Symlinks are rejected rather than followed (`WalkDir`'s default).
fn iter_files_sorted(root: &Path) -> Result<Vec<String>> {
    let mut results = Vec::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_key(|entry| entry.file_name().to_owned());

    for entry in walker {
        let entry = entry.map_err(|err| {
            PromptPmError::dependency(format!("Failed to walk {}: {}", root.display(), err))
        })?;
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            return Err(PromptPmError::dependency(format!(
                "Symlinks are not allowed in registry installs: {}",
                entry.path().display()
            )));
        }
        if file_type.is_file() {
            let relative = entry
                .path()
                .strip_prefix(root)
                .expect("walker yields entries under root");
            results.push(to_posix(relative));
        }
    }

    Ok(results)
}

fn to_posix(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn write_immutability_manifest(root_dir: &Path, name: &str, version: &str) -> Result<()> {
    let mut files = Vec::new();
    for relative in iter_files_sorted(root_dir)? {
        if relative == IMMUTABILITY_MANIFEST_FILENAME {
            continue;
        }
        let sha256 = sha256_file(&root_dir.join(&relative))?;
        files.push(ManifestFileEntry { path: relative, sha256 });
    }

    let manifest = ImmutabilityManifest {
        name: name.to_string(),
        version: version.to_string(),
        algorithm: "sha256".to_string(),
        files,
    };

    let manifest_path = root_dir.join(IMMUTABILITY_MANIFEST_FILENAME);
    let body = canonical_manifest_json(&manifest);
    fs::write(manifest_path, body)?;
    Ok(())
}

/// Compact JSON, keys sorted alphabetically, no inter-token whitespace,
/// trailing newline.
fn canonical_manifest_json(manifest: &ImmutabilityManifest) -> String {
    let mut files_json: Vec<serde_json::Value> = manifest
        .files
        .iter()
        .map(|entry| {
            serde_json::json!({
                "path": entry.path,
                "sha256": entry.sha256,
            })
        })
        .collect();
    files_json.sort_by(|a, b| a["path"].as_str().cmp(&b["path"].as_str()));

    let document = serde_json::json!({
        "algorithm": manifest.algorithm,
        "files": files_json,
        "name": manifest.name,
        "version": manifest.version,
    });

    let mut body = serde_json::to_string(&document).expect("manifest document always serializes");
    body.push('\n');
    body
}

fn verify_immutability(root_dir: &Path, name: &str, version: &str) -> Result<()> {
    let manifest_path = root_dir.join(IMMUTABILITY_MANIFEST_FILENAME);
    if !manifest_path.is_file() {
        return Err(PromptPmError::dependency(format!(
            "Immutability manifest missing for published module: {}@{}",
            name, version
        )));
    }

    let manifest_text = fs::read_to_string(&manifest_path)?;
    let manifest: ImmutabilityManifest = serde_json::from_str(&manifest_text).map_err(|err| {
        PromptPmError::dependency(format!("Invalid immutability manifest for {}@{}: {}", name, version, err))
    })?;

    if manifest.name != name || manifest.version != version {
        return Err(PromptPmError::dependency(format!(
            "Immutability manifest identity mismatch for {}@{}",
            name, version
        )));
    }
    if manifest.algorithm != "sha256" {
        return Err(PromptPmError::dependency(format!(
            "Unsupported immutability hash algorithm for {}@{}: {:?}",
            name, version, manifest.algorithm
        )));
    }

    let mut expected_hashes: BTreeMap<String, String> = BTreeMap::new();
    for entry in &manifest.files {
        if entry.path.is_empty() {
            return Err(PromptPmError::dependency(format!(
                "Invalid immutability manifest for {}@{}: file path must be a non-empty string",
                name, version
            )));
        }
        if entry.sha256.len() != 64 {
            return Err(PromptPmError::dependency(format!(
                "Invalid immutability manifest for {}@{}: sha256 must be a 64-char string",
                name, version
            )));
        }
        if expected_hashes.insert(entry.path.clone(), entry.sha256.clone()).is_some() {
            return Err(PromptPmError::dependency(format!(
                "Invalid immutability manifest for {}@{}: duplicate path {:?}",
                name, version, entry.path
            )));
        }
    }

    let mut actual_hashes: BTreeMap<String, String> = BTreeMap::new();
    for relative in iter_files_sorted(root_dir)? {
        if relative == IMMUTABILITY_MANIFEST_FILENAME {
            continue;
        }
        actual_hashes.insert(relative.clone(), sha256_file(&root_dir.join(&relative))?);
    }

    let missing_files: Vec<&String> = expected_hashes
        .keys()
        .filter(|path| !actual_hashes.contains_key(*path))
        .collect();
    let extra_files: Vec<&String> = actual_hashes
        .keys()
        .filter(|path| !expected_hashes.contains_key(*path))
        .collect();
    let changed_files: Vec<&String> = expected_hashes
        .keys()
        .filter(|path| {
            actual_hashes
                .get(*path)
                .map(|actual| actual != &expected_hashes[*path])
                .unwrap_or(false)
        })
        .collect();

    if !missing_files.is_empty() || !extra_files.is_empty() || !changed_files.is_empty() {
        let mut details = Vec::new();
        if !missing_files.is_empty() {
            details.push(format!(
                "missing files: {}",
                missing_files.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
            ));
        }
        if !extra_files.is_empty() {
            details.push(format!(
                "extra files: {}",
                extra_files.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
            ));
        }
        if !changed_files.is_empty() {
            details.push(format!(
                "changed files: {}",
                changed_files.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
            ));
        }
        return Err(PromptPmError::dependency(format!(
            "Immutability check failed for published module {}@{}: {}",
            name,
            version,
            details.join("; ")
        )));
    }

    Ok(())
}

fn sha256_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 65536];
    loop {
        use std::io::Read;
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sample_module_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("promptpm.yaml"),
            "module:\n  name: demo\n  version: \"1.0.0\"\n  description: demo\nprompt:\n  template: template.prompt\n  placeholders: []\ninterface:\n  intent: x\n  inputs: []\n  outputs: []\n",
        )
        .unwrap();
        fs::write(dir.path().join("template.prompt"), "hello\n").unwrap();
        dir
    }

    #[test]
    fn install_then_lookup_round_trips() {
        let registry_dir = tempfile::tempdir().unwrap();
        let registry = LocalRegistry::new(registry_dir.path()).unwrap();
        let module_dir = sample_module_dir();

        let installed = registry.install(module_dir.path(), "demo", "1.0.0").unwrap();
        assert_eq!(installed.name, "demo");
        assert!(installed.path.join(".promptpm_immutable.json").is_file());

        let looked_up = registry.lookup("demo", "1.0.0").unwrap();
        assert_eq!(looked_up.path, installed.path);
    }

    #[test]
    fn second_install_of_same_identity_fails_without_side_effects() {
        let registry_dir = tempfile::tempdir().unwrap();
        let registry = LocalRegistry::new(registry_dir.path()).unwrap();
        let module_dir = sample_module_dir();

        registry.install(module_dir.path(), "demo", "1.0.0").unwrap();
        let before: Vec<u8> = fs::read(
            registry_dir
                .path()
                .join("modules/demo/1.0.0/.promptpm_immutable.json"),
        )
        .unwrap();

        let err = registry.install(module_dir.path(), "demo", "1.0.0").unwrap_err();
        assert_eq!(err.code(), "DEPENDENCY_ERROR");

        let after: Vec<u8> = fs::read(
            registry_dir
                .path()
                .join("modules/demo/1.0.0/.promptpm_immutable.json"),
        )
        .unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn tamper_detection_fails_lookup() {
        let registry_dir = tempfile::tempdir().unwrap();
        let registry = LocalRegistry::new(registry_dir.path()).unwrap();
        let module_dir = sample_module_dir();
        registry.install(module_dir.path(), "demo", "1.0.0").unwrap();

        fs::write(
            registry_dir.path().join("modules/demo/1.0.0/template.prompt"),
            "tampered\n",
        )
        .unwrap();

        let err = registry.lookup("demo", "1.0.0").unwrap_err();
        assert!(err.to_string().contains("Immutability check failed"));
    }

    #[test]
    fn rejects_unsafe_path_segments() {
        let registry_dir = tempfile::tempdir().unwrap();
        let registry = LocalRegistry::new(registry_dir.path()).unwrap();
        let module_dir = sample_module_dir();

        let err = registry.install(module_dir.path(), "..", "1.0.0").unwrap_err();
        assert_eq!(err.code(), "DEPENDENCY_ERROR");
    }

    #[test]
    fn list_installed_is_sorted_across_names_and_versions() {
        let registry_dir = tempfile::tempdir().unwrap();
        let registry = LocalRegistry::new(registry_dir.path()).unwrap();

        for (name, version) in [("beta", "1.0.0"), ("alpha", "2.0.0"), ("alpha", "1.0.0")] {
            let module_dir = sample_module_dir();
            registry.install(module_dir.path(), name, version).unwrap();
        }

        let all = registry.list_installed().unwrap();
        let pairs: Vec<(&str, &str)> = all.iter().map(|m| (m.name.as_str(), m.version.as_str())).collect();
        assert_eq!(
            pairs,
            vec![("alpha", "1.0.0"), ("alpha", "2.0.0"), ("beta", "1.0.0")]
        );
    }
}
