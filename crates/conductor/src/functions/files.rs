// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use crate::registry::{
    CallArgs, FunctionModule, FunctionSpec, LeafError, LeafFunction, LeafResult, ParamSpec,
    ParamType,
};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

const CATEGORIES: &[(&str, &[&str])] = &[
    ("images", &["jpg", "jpeg", "png", "gif", "bmp", "svg", "webp", "tiff", "heic"]),
    (
        "documents",
        &["pdf", "doc", "docx", "txt", "md", "rtf", "odt", "xls", "xlsx", "csv", "ppt", "pptx"],
    ),
    ("audio", &["mp3", "wav", "flac", "aac", "ogg", "m4a"]),
    ("video", &["mp4", "mkv", "mov", "avi", "webm", "wmv"]),
    ("archives", &["zip", "tar", "gz", "tgz", "bz2", "xz", "7z", "rar"]),
    (
        "code",
        &[
            "rs", "py", "js", "ts", "java", "c", "cpp", "h", "go", "rb", "sh", "html", "css",
            "json", "toml", "yaml", "yml",
        ],
    ),
];

/// File organization functions confined to one workspace directory.
#[derive(Debug, Clone)]
pub struct FilesModule {
    root: Arc<PathBuf>,
}

impl FilesModule {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Arc::new(root.into()),
        }
    }

    fn leaf<F>(&self, spec: FunctionSpec, f: F) -> LeafFunction
    where
        F: Fn(&Path, &CallArgs) -> LeafResult + Send + Sync + 'static,
    {
        let root = Arc::clone(&self.root);
        LeafFunction::new(spec, move |args| f(&root, args))
    }
}

impl FunctionModule for FilesModule {
    fn name(&self) -> &str {
        "files"
    }

    fn exports(&self) -> Vec<LeafFunction> {
        vec![
            self.leaf(
                FunctionSpec::new(
                    "ai_list_files",
                    "Returns the names of all files in a folder, relative to that folder.",
                )
                .param(ParamSpec::required("path", ParamType::String).describe("Folder to list."))
                .param(ParamSpec::optional("recursive", ParamType::Boolean, json!(false))),
                list_files,
            ),
            self.leaf(
                FunctionSpec::new(
                    "ai_categorize_files",
                    "Groups file names by type into images, documents, audio, video, archives, \
                     code and other.",
                )
                .param(
                    ParamSpec::required("files", ParamType::List).describe("File names to group."),
                ),
                |_, args| categorize_files(args),
            ),
            self.leaf(
                FunctionSpec::new(
                    "ai_create_folders",
                    "Creates one folder per category inside base_path and returns the categories.",
                )
                .param(ParamSpec::required("base_path", ParamType::String))
                .param(
                    ParamSpec::required("categories", ParamType::Any)
                        .describe("Category names, or a category-to-files mapping."),
                ),
                create_folders,
            ),
            self.leaf(
                FunctionSpec::new(
                    "ai_move_files",
                    "Moves every file into the folder of its category inside base_path.",
                )
                .param(ParamSpec::required("base_path", ParamType::String))
                .param(
                    ParamSpec::required("categories", ParamType::Object)
                        .describe("Category-to-files mapping."),
                ),
                move_files,
            ),
            self.leaf(
                FunctionSpec::new("ai_read_file", "Returns the text content of a file.")
                    .param(ParamSpec::required("path", ParamType::String)),
                read_file,
            ),
        ]
    }
}

/// Resolves `relative` under `root`, refusing anything that would leave it.
fn confine(root: &Path, relative: &str) -> Result<PathBuf, LeafError> {
    let requested = Path::new(relative);
    let requested = requested.strip_prefix(root).unwrap_or(requested);
    let mut resolved = root.to_path_buf();
    for component in requested.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(LeafError::permission_denied(format!(
                    "'{relative}' is outside the workspace"
                )))
            }
        }
    }
    Ok(resolved)
}

/// A single path segment such as a category or file name.
fn segment(name: &str) -> Result<&str, LeafError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(name),
        _ => Err(LeafError::permission_denied(format!(
            "'{name}' is not a plain file or folder name"
        ))),
    }
}

fn io_error(path: &Path, err: io::Error) -> LeafError {
    let err = LeafError::from(err);
    LeafError::new(err.kind, format!("{}: {}", path.display(), err.message))
}

fn list_files(root: &Path, args: &CallArgs) -> LeafResult {
    let dir = confine(root, args.str("path")?)?;
    let recursive = args.get("recursive").and_then(Value::as_bool).unwrap_or(false);
    let mut files = Vec::new();
    collect_files(&dir, &dir, recursive, &mut files)?;
    files.sort();
    Ok(Value::from(files))
}

fn collect_files(
    base: &Path,
    dir: &Path,
    recursive: bool,
    out: &mut Vec<String>,
) -> Result<(), LeafError> {
    for entry in fs::read_dir(dir).map_err(|e| io_error(dir, e))? {
        let entry = entry.map_err(|e| io_error(dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| io_error(&path, e))?;
        if file_type.is_dir() {
            if recursive {
                collect_files(base, &path, recursive, out)?;
            }
        } else if let Ok(relative) = path.strip_prefix(base) {
            out.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }
    Ok(())
}

pub fn category_of(file: &str) -> &'static str {
    let extension = Path::new(file)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);
    extension
        .and_then(|ext| {
            CATEGORIES
                .iter()
                .find(|(_, extensions)| extensions.contains(&ext.as_str()))
                .map(|(category, _)| *category)
        })
        .unwrap_or("other")
}

fn categorize_files(args: &CallArgs) -> LeafResult {
    let mut groups: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for file in args.string_list("files")? {
        groups.entry(category_of(&file)).or_default().push(file);
    }
    Ok(json!(groups))
}

fn category_names(value: &Value) -> Result<Vec<String>, LeafError> {
    let names: Vec<String> = match value {
        Value::Object(map) => map.keys().cloned().collect(),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    LeafError::invalid_argument("category names must be strings")
                })
            })
            .collect::<Result<_, _>>()?,
        Value::String(name) => vec![name.clone()],
        _ => {
            return Err(LeafError::invalid_argument(
                "categories must be a list of names or a mapping",
            ))
        }
    };
    for name in &names {
        segment(name)?;
    }
    Ok(names)
}

fn create_folders(root: &Path, args: &CallArgs) -> LeafResult {
    let base = confine(root, args.str("base_path")?)?;
    let categories = args.value("categories")?;
    let names = category_names(categories)?;
    for name in &names {
        let folder = base.join(name);
        fs::create_dir_all(&folder).map_err(|e| io_error(&folder, e))?;
    }
    match categories {
        Value::Object(_) => Ok(categories.clone()),
        _ => Ok(Value::Object(
            names
                .into_iter()
                .map(|name| (name, Value::Array(Vec::new())))
                .collect::<Map<_, _>>(),
        )),
    }
}

fn move_files(root: &Path, args: &CallArgs) -> LeafResult {
    let base = confine(root, args.str("base_path")?)?;
    let categories = args.object("categories")?;
    let mut moved = 0_u64;
    for (category, files) in categories {
        let folder = base.join(segment(category)?);
        let files = files.as_array().ok_or_else(|| {
            LeafError::invalid_argument(format!("files for category '{category}' must be a list"))
        })?;
        for file in files {
            let file = file
                .as_str()
                .ok_or_else(|| LeafError::invalid_argument("file names must be strings"))?;
            let source = confine(&base, file)?;
            let name = source
                .file_name()
                .ok_or_else(|| LeafError::invalid_argument(format!("'{file}' has no file name")))?;
            let target = folder.join(name);
            if !source.exists() && target.exists() {
                continue;
            }
            if !folder.is_dir() {
                fs::create_dir_all(&folder).map_err(|e| io_error(&folder, e))?;
            }
            fs::rename(&source, &target).map_err(|e| io_error(&source, e))?;
            moved += 1;
        }
    }
    Ok(json!({ "moved": moved }))
}

fn read_file(root: &Path, args: &CallArgs) -> LeafResult {
    let path = confine(root, args.str("path")?)?;
    fs::read_to_string(&path)
        .map(Value::String)
        .map_err(|e| io_error(&path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::LeafErrorKind;

    fn function(root: &Path, name: &str) -> LeafFunction {
        FilesModule::new(root)
            .exports()
            .into_iter()
            .find(|f| f.name() == name)
            .unwrap()
    }

    fn args(pairs: &[(&str, Value)]) -> CallArgs {
        CallArgs::new(pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect())
    }

    #[test]
    fn categories_follow_extensions() {
        assert_eq!(category_of("holiday.JPG"), "images");
        assert_eq!(category_of("notes.md"), "documents");
        assert_eq!(category_of("backup.tar"), "archives");
        assert_eq!(category_of("README"), "other");
    }

    #[test]
    fn paths_cannot_escape_the_workspace() {
        let root = Path::new("/srv/work");
        assert_eq!(confine(root, "inbox/a.txt").unwrap(), PathBuf::from("/srv/work/inbox/a.txt"));
        assert_eq!(confine(root, "/srv/work/inbox").unwrap(), PathBuf::from("/srv/work/inbox"));
        assert_eq!(confine(root, "../etc").unwrap_err().kind, LeafErrorKind::PermissionDenied);
        assert_eq!(confine(root, "/etc/passwd").unwrap_err().kind, LeafErrorKind::PermissionDenied);
        assert!(segment("images").is_ok());
        assert!(segment("../images").is_err());
    }

    #[test]
    fn list_missing_folder_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = function(dir.path(), "ai_list_files")
            .call(&args(&[("path", json!("nope")), ("recursive", json!(false))]))
            .unwrap_err();
        assert_eq!(err.kind, LeafErrorKind::NotFound);
    }

    #[test]
    fn organizes_a_folder_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let inbox = dir.path().join("inbox");
        fs::create_dir(&inbox).unwrap();
        for name in ["a.png", "b.pdf", "c.xyz"] {
            fs::write(inbox.join(name), name).unwrap();
        }

        let files = function(dir.path(), "ai_list_files")
            .call(&args(&[("path", json!("inbox")), ("recursive", json!(false))]))
            .unwrap();
        assert_eq!(files, json!(["a.png", "b.pdf", "c.xyz"]));

        let groups = function(dir.path(), "ai_categorize_files")
            .call(&args(&[("files", files)]))
            .unwrap();
        assert_eq!(
            groups,
            json!({"documents": ["b.pdf"], "images": ["a.png"], "other": ["c.xyz"]})
        );

        let categories = function(dir.path(), "ai_create_folders")
            .call(&args(&[("base_path", json!("inbox")), ("categories", groups)]))
            .unwrap();
        assert!(inbox.join("images").is_dir());

        let moved = function(dir.path(), "ai_move_files")
            .call(&args(&[("base_path", json!("inbox")), ("categories", categories)]))
            .unwrap();
        assert_eq!(moved, json!({"moved": 3}));
        assert!(inbox.join("images/a.png").is_file());
        assert!(inbox.join("other/c.xyz").is_file());
        assert!(!inbox.join("a.png").exists());
    }

    #[test]
    fn create_folders_accepts_plain_names() {
        let dir = tempfile::tempdir().unwrap();
        let result = function(dir.path(), "ai_create_folders")
            .call(&args(&[("base_path", json!(".")), ("categories", json!(["images", "audio"]))]))
            .unwrap();
        assert_eq!(result, json!({"images": [], "audio": []}));
        assert!(dir.path().join("audio").is_dir());
    }

    #[test]
    fn read_file_returns_contents() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("todo.txt"), "water plants").unwrap();
        let text = function(dir.path(), "ai_read_file")
            .call(&args(&[("path", json!("todo.txt"))]))
            .unwrap();
        assert_eq!(text, json!("water plants"));
    }
}
