//! Rendering helpers compiled into every generated sample program.
//!
//! This file is not part of `mdtidy_core`. It is written next to the
//! generated `main.rs` and built together with it.

use std::collections::BTreeSet;

use serde_yaml_ng::Value;

const FORBIDDEN_OPTIONS: [&str; 3] = ["skip", "skip_serializing", "skip_serializing_if"];

/// A field of a copied struct or enum and the serde options set on it.
pub struct FieldInfo {
	pub owner: &'static str,
	pub field: &'static str,
	pub types: &'static [&'static str],
	pub serde: &'static [&'static str],
}

/// A named default instance, already converted to YAML.
pub struct Sample {
	name: &'static str,
	value: Result<Value, String>,
}

impl Sample {
	pub fn new<T: serde::Serialize>(name: &'static str, value: T) -> Self {
		Self {
			name,
			value: serde_yaml_ng::to_value(&value).map_err(|e| e.to_string()),
		}
	}

	fn render(&self, fields: &[FieldInfo]) -> Result<String, String> {
		check_options(self.name, fields, &mut BTreeSet::new())?;
		let value = self.value.as_ref().map_err(Clone::clone)?;
		check_nulls(value, self.name)?;
		serde_yaml_ng::to_string(value).map_err(|e| e.to_string())
	}
}

/// Rejects fields of `owner`, and of every type it refers to, that serde may
/// leave out of the output.
fn check_options(
	owner: &str,
	fields: &[FieldInfo],
	visited: &mut BTreeSet<String>,
) -> Result<(), String> {
	if !visited.insert(owner.to_string()) {
		return Ok(());
	}

	for field in fields.iter().filter(|field| field.owner == owner) {
		if let Some(option) = field
			.serde
			.iter()
			.find(|option| FORBIDDEN_OPTIONS.contains(*option))
		{
			return Err(format!(
				"serde option `{option}` is forbidden in samples, but spotted on field `{}.{}`",
				field.owner, field.field
			));
		}

		for ty in field.types {
			check_options(ty, fields, visited).map_err(|e| format!("{}: {e}", field.field))?;
		}
	}

	Ok(())
}

fn check_nulls(value: &Value, path: &str) -> Result<(), String> {
	match value {
		Value::Null => {
			Err(format!(
				"null values are not allowed in samples, found at `{path}`"
			))
		}
		Value::Sequence(items) => {
			items
				.iter()
				.enumerate()
				.try_for_each(|(index, item)| check_nulls(item, &format!("{path}[{index}]")))
		}
		Value::Mapping(mapping) => {
			mapping.iter().try_for_each(|(key, item)| {
				let key = key
					.as_str()
					.map_or_else(|| format!("{key:?}"), ToString::to_string);
				check_nulls(item, &format!("{path}.{key}"))
			})
		}
		Value::Tagged(tagged) => check_nulls(&tagged.value, path),
		_ => Ok(()),
	}
}

/// Print every sample that renders and return the process exit code.
///
/// Failures are reported on stderr. Only a failure of the `requested` sample
/// makes the exit code non-zero.
pub fn run(requested: Option<&str>, fields: &[FieldInfo], samples: Vec<Sample>) -> i32 {
	let mut code = 0;

	for sample in &samples {
		match sample.render(fields) {
			Ok(yaml) => {
				println!("---");
				println!("{}", sample.name);
				print!("{yaml}");
			}
			Err(error) => {
				eprintln!("{}: {error}", sample.name);
				if requested == Some(sample.name) {
					code = 1;
				}
			}
		}
	}

	code
}
