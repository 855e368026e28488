use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde_json::json;

use crate::error_codes::{find_coded_error, CodedError, SCENE_INVALID};
use crate::schema::{Scene, SceneElement};

/// Parses a scene file, validates it and resolves every referenced path
/// against the scene file's directory.
pub fn load_and_validate_scene(path: &Path) -> Result<Scene> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read scene {}", path.display()))?;
    let mut scene: Scene = serde_yaml::from_str(&contents).map_err(|error| {
        let location = error
            .location()
            .map(|location| format!("line {}, column {}", location.line(), location.column()))
            .unwrap_or_else(|| "unknown location".to_owned());
        anyhow!(CodedError::input(
            SCENE_INVALID,
            format!(
                "failed to parse yaml in {} at {}: {}",
                path.display(),
                location,
                error
            ),
        )
        .with_details(json!({
            "path": path.display().to_string(),
            "line": error.location().map(|location| location.line()),
            "column": error.location().map(|location| location.column()),
        })))
    })?;

    validate_scene(&mut scene, path).map_err(|error| scene_invalid(path, error))?;
    Ok(scene)
}

fn scene_invalid(path: &Path, error: anyhow::Error) -> anyhow::Error {
    if find_coded_error(&error).is_some() {
        return error.context(format!("invalid scene {}", path.display()));
    }
    anyhow!(CodedError::input(
        SCENE_INVALID,
        format!("invalid scene {}: {error:#}", path.display()),
    )
    .with_details(json!({ "path": path.display().to_string() })))
}

fn validate_scene(scene: &mut Scene, scene_path: &Path) -> Result<()> {
    scene.validate()?;

    let scene_dir = scene_path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

    scene.base = resolve_and_validate_path(&scene_dir, &scene.base, "scene", "base")?;

    if let Some(font) = &mut scene.font {
        font.path = resolve_and_validate_path(&scene_dir, &font.path, "font", "path")?;
    }

    for (index, element) in scene.elements.iter_mut().enumerate() {
        match element {
            SceneElement::Mark(image) | SceneElement::Signature(image) => {
                image.source = resolve_and_validate_path(
                    &scene_dir,
                    &image.source,
                    &format!("elements[{index}]"),
                    "source",
                )?;
            }
            SceneElement::Text(_) => {}
        }
    }

    Ok(())
}

fn resolve_and_validate_path(
    scene_dir: &Path,
    path: &Path,
    owner: &str,
    field_name: &str,
) -> Result<PathBuf> {
    let resolved = if path.is_absolute() {
        path.to_path_buf()
    } else {
        scene_dir.join(path)
    };

    if !resolved.exists() {
        bail!(
            "{} {} does not exist: {}",
            owner,
            field_name,
            resolved.display()
        );
    }

    if !resolved.is_file() {
        bail!(
            "{} {} is not a file: {}",
            owner,
            field_name,
            resolved.display()
        );
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::load_and_validate_scene;
    use crate::error_codes::{find_coded_error, INVALID_FONT_SIZE, SCENE_INVALID};
    use crate::schema::SceneElement;

    #[test]
    fn relative_paths_resolve_against_scene_dir() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("uploads")).unwrap();
        fs::write(dir.path().join("cheque.png"), b"x").unwrap();
        fs::write(dir.path().join("uploads/stamp.png"), b"x").unwrap();
        let scene_path = dir.path().join("scene.yaml");
        fs::write(
            &scene_path,
            "base: cheque.png\nelements:\n  - kind: mark\n    source: uploads/stamp.png\n",
        )
        .unwrap();

        let scene = load_and_validate_scene(&scene_path).unwrap();
        assert_eq!(scene.base, dir.path().join("cheque.png"));
        let SceneElement::Mark(mark) = &scene.elements[0] else {
            panic!("expected a mark element");
        };
        assert_eq!(mark.source, dir.path().join("uploads/stamp.png"));
    }

    #[test]
    fn missing_source_is_a_scene_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("cheque.png"), b"x").unwrap();
        let scene_path = dir.path().join("scene.yaml");
        fs::write(
            &scene_path,
            "base: cheque.png\nelements:\n  - kind: signature\n    source: nope.png\n",
        )
        .unwrap();

        let error = load_and_validate_scene(&scene_path).unwrap_err();
        let coded = find_coded_error(&error).expect("scene errors are coded");
        assert_eq!(coded.code, SCENE_INVALID);
        assert!(coded.message.contains("elements[0] source does not exist"));
    }

    #[test]
    fn yaml_errors_carry_location() {
        let dir = tempdir().unwrap();
        let scene_path = dir.path().join("scene.yaml");
        fs::write(&scene_path, "base: [unterminated\n").unwrap();

        let error = load_and_validate_scene(&scene_path).unwrap_err();
        let coded = find_coded_error(&error).unwrap();
        assert_eq!(coded.code, SCENE_INVALID);
        assert!(coded.message.contains("line"));
    }

    #[test]
    fn stamp_errors_keep_their_own_code() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("cheque.png"), b"x").unwrap();
        let scene_path = dir.path().join("scene.yaml");
        fs::write(
            &scene_path,
            "base: cheque.png\nelements:\n  - kind: text\n    font_size_px: 1000\n",
        )
        .unwrap();

        let error = load_and_validate_scene(&scene_path).unwrap_err();
        assert_eq!(find_coded_error(&error).unwrap().code, INVALID_FONT_SIZE);
    }
}
