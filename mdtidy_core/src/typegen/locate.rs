use std::path::Path;
use std::path::PathBuf;

use syn::Item;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::MdtidyError;
use crate::MdtidyResult;
use crate::TypeLocation;
use crate::exec::run_captured;

/// A rust source file declaring the requested struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSource {
	/// Path of the file the source was read from.
	pub origin: PathBuf,
	pub source: String,
}

/// A published crate and an optional directory inside it:
/// `crate[@version][/sub/dir]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyCoordinate {
	pub name: String,
	pub version: Option<String>,
	pub subdir: Option<String>,
}

impl DependencyCoordinate {
	pub fn parse(value: &str) -> Option<Self> {
		let (head, subdir) = match value.split_once('/') {
			Some((head, subdir)) => (head, Some(subdir.trim_matches('/'))),
			None => (value, None),
		};
		let (name, version) = match head.split_once('@') {
			Some((name, version)) => (name, Some(version)),
			None => (head, None),
		};

		let valid_name = !name.is_empty()
			&& name
				.chars()
				.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
		if !valid_name || version.is_some_and(str::is_empty) {
			return None;
		}

		Some(Self {
			name: name.to_string(),
			version: version.map(ToString::to_string),
			subdir: subdir.filter(|dir| !dir.is_empty()).map(ToString::to_string),
		})
	}

	fn requirement(&self) -> String {
		self.version
			.as_ref()
			.map_or_else(|| "*".to_string(), |version| format!("={version}"))
	}
}

/// Find the source file declaring `location.type_name`.
///
/// A location naming an existing file (or ending in `.rs`) is read directly.
/// Anything else is treated as a dependency coordinate: the crate is
/// resolved and downloaded with `cargo metadata` and its `.rs` files are
/// searched in path order for the first top level `struct` declaration of
/// the type.
pub fn locate_source(
	cancel: &CancellationToken,
	cargo: &str,
	location: &TypeLocation,
) -> MdtidyResult<TypeSource> {
	let path = Path::new(&location.location);

	if path.is_file() || location.location.ends_with(".rs") {
		let source = std::fs::read_to_string(path).map_err(|source| {
			MdtidyError::TypeSource {
				path: path.to_path_buf(),
				source,
			}
		})?;

		return Ok(TypeSource {
			origin: path.to_path_buf(),
			source,
		});
	}

	let coordinate = DependencyCoordinate::parse(&location.location)
		.ok_or_else(|| MdtidyError::InvalidTypeLocation(location.to_string()))?;
	let package_dir = fetch_dependency(cancel, cargo, &coordinate)?;
	let search_dir = match &coordinate.subdir {
		Some(subdir) => package_dir.join(subdir),
		None => package_dir,
	};

	let mut files = Vec::new();
	collect_rust_files(&search_dir, &mut files).map_err(|source| {
		MdtidyError::TypeSource {
			path: search_dir.clone(),
			source,
		}
	})?;

	for file in files {
		let Ok(source) = std::fs::read_to_string(&file) else {
			continue;
		};

		if declares_struct(&source, &location.type_name) {
			tracing::debug!(path = %file.display(), "found type declaration");
			return Ok(TypeSource {
				origin: file,
				source,
			});
		}
	}

	Err(MdtidyError::TypeNotFound {
		name: location.type_name.clone(),
		location: location.location.clone(),
	})
}

/// Resolve the dependency in a throwaway project and return the directory
/// containing its manifest.
fn fetch_dependency(
	cancel: &CancellationToken,
	cargo: &str,
	coordinate: &DependencyCoordinate,
) -> MdtidyResult<PathBuf> {
	let fetch_error = |reason: String| {
		MdtidyError::DependencyFetch {
			dependency: coordinate.name.clone(),
			reason,
		}
	};

	let project = TempDir::with_prefix("mdtidy-locate-")?;
	std::fs::create_dir_all(project.path().join("src"))?;
	std::fs::write(project.path().join("src/lib.rs"), "")?;
	std::fs::write(
		project.path().join("Cargo.toml"),
		format!(
			"[package]\nname = \"mdtidy-locate\"\nversion = \"0.0.0\"\nedition = \
			 \"2021\"\npublish = false\n\n[dependencies]\n{} = \"{}\"\n\n[workspace]\n",
			coordinate.name,
			coordinate.requirement()
		),
	)?;

	let output = run_captured(
		cancel,
		cargo,
		&["metadata", "--format-version", "1"],
		project.path(),
	)?;
	if output.code != Some(0) {
		return Err(fetch_error(output.stderr.trim().to_string()));
	}

	let metadata: serde_json::Value =
		serde_json::from_str(&output.stdout).map_err(|e| fetch_error(e.to_string()))?;

	let wanted = coordinate.name.replace('-', "_");
	let manifest_path = metadata["packages"]
		.as_array()
		.into_iter()
		.flatten()
		.find(|package| {
			package["name"]
				.as_str()
				.is_some_and(|name| name.replace('-', "_") == wanted)
		})
		.and_then(|package| package["manifest_path"].as_str())
		.ok_or_else(|| fetch_error("package missing from cargo metadata".to_string()))?;

	Path::new(manifest_path)
		.parent()
		.map(Path::to_path_buf)
		.ok_or_else(|| fetch_error(format!("invalid manifest path `{manifest_path}`")))
}

fn collect_rust_files(dir: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
	let mut entries = std::fs::read_dir(dir)?
		.map(|entry| entry.map(|entry| entry.path()))
		.collect::<std::io::Result<Vec<_>>>()?;
	entries.sort();

	for path in entries {
		if path.is_dir() {
			if path.file_name().is_some_and(|name| name == "target") {
				continue;
			}
			collect_rust_files(&path, files)?;
		} else if path.extension().is_some_and(|ext| ext == "rs") {
			files.push(path);
		}
	}

	Ok(())
}

/// Whether `source` declares a top level `struct` named `name`.
pub fn declares_struct(source: &str, name: &str) -> bool {
	if !source.contains(&format!("struct {name}")) {
		return false;
	}

	syn::parse_file(source).is_ok_and(|file| {
		file.items
			.iter()
			.any(|item| matches!(item, Item::Struct(item) if item.ident == name))
	})
}
