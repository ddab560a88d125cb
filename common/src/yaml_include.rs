use std::error::Error;
use std::fs;
use std::path::Path;
use yaml_rust2::{Yaml, YamlEmitter, YamlLoader};

const INCLUDE_DIRECTIVE: &str = "!include";

/// Loads a YAML file, resolving `!include <relative path>` lines first.
///
/// Included documents form the base layer and the including file overrides
/// them key by key, so an environment file only needs the values it changes.
pub fn load_yaml_with_includes(path: &Path) -> Result<Yaml, Box<dyn Error + Send + Sync>> {
    let merged = process_includes_recursive(path, 0)?;
    tracing::debug!("Resolved config includes for {:?}", path);
    Ok(merged)
}

/// Same as [`load_yaml_with_includes`] but re-emits the merged document as a
/// string, ready for `serde_yml`.
pub fn load_yaml_string_with_includes(path: &Path) -> Result<String, Box<dyn Error + Send + Sync>> {
    let yaml = load_yaml_with_includes(path)?;
    let mut out = String::new();
    {
        let mut emitter = YamlEmitter::new(&mut out);
        emitter.dump(&yaml)?;
    }
    Ok(out)
}

fn process_includes_recursive(path: &Path, depth: usize) -> Result<Yaml, Box<dyn Error + Send + Sync>> {
    if depth > 8 {
        return Err(format!("Include depth exceeded while loading {:?}", path).into());
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config {:?}: {}", path, e))?;
    let base_path = path.parent().unwrap_or(Path::new(""));

    let (includes, rest): (Vec<&str>, Vec<&str>) = contents
        .lines()
        .partition(|line| line.trim().starts_with(INCLUDE_DIRECTIVE));

    let mut merged_includes: Option<Yaml> = None;
    for line in includes {
        let include_path = line.trim().trim_start_matches(INCLUDE_DIRECTIVE).trim();
        let included = process_includes_recursive(&base_path.join(include_path), depth + 1)?;
        merged_includes = Some(match merged_includes {
            Some(acc) => merge_yaml(&acc, &included),
            None => included,
        });
    }

    let merged_rest = YamlLoader::load_from_str(&rest.join("\n"))?
        .into_iter()
        .reduce(|acc, doc| merge_yaml(&acc, &doc))
        .unwrap_or(Yaml::Null);

    Ok(match merged_includes {
        Some(base) => merge_yaml(&base, &merged_rest),
        None => merged_rest,
    })
}

fn merge_yaml(base: &Yaml, override_yaml: &Yaml) -> Yaml {
    match (base, override_yaml) {
        (Yaml::Hash(base_hash), Yaml::Hash(override_hash)) => {
            let mut result = base_hash.clone();
            for (key, value) in override_hash {
                let merged = match base_hash.get(key) {
                    Some(base_value) => merge_yaml(base_value, value),
                    None => value.clone(),
                };
                result.insert(key.clone(), merged);
            }
            Yaml::Hash(result)
        }
        (base_value, Yaml::Null) => base_value.clone(),
        (_, override_value) => override_value.clone(),
    }
}
