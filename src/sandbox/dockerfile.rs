//! Build context staging and Dockerfile generation for evaluation images.
//!
//! Every image starts from the environment's base image, carries the skill
//! in a generic mount point plus the directories each harness scans for
//! skills, copies the environment layers into the working directory and
//! optionally installs an adapter script.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use walkdir::WalkDir;

use super::ImageBuildRequest;
use crate::error::DockerError;
use crate::harness::script::SCRIPT_INSTALL_DIR;

/// Generic skill mount point.
pub const GENERIC_SKILL_DIR: &str = "/skills";

/// Skill directories scanned by the built-in harnesses.
pub const HARNESS_SKILL_DIRS: &[&str] = &["/root/.claude/skills", "/root/.codex/skills"];

/// Name of the generated Dockerfile inside the build context.
pub const DOCKERFILE_NAME: &str = "Dockerfile";

const SKILL_CONTEXT_DIR: &str = "skill";
const LAYERS_CONTEXT_DIR: &str = "layers";

/// Name a skill directory is mounted under inside the container.
pub fn skill_name(skill_path: &Path) -> String {
    skill_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "skill".to_string())
}

/// Skill location the harness is told about.
pub fn container_skill_path(skill_path: &Path) -> String {
    format!("{}/{}", GENERIC_SKILL_DIR, skill_name(skill_path))
}

/// Builder for evaluation-image Dockerfiles.
#[derive(Debug, Clone)]
pub struct DockerfileBuilder {
    base_image: String,
    tag: String,
    skill_name: String,
    layer_names: Vec<String>,
    adapter_script: Option<String>,
    setup_commands: Vec<String>,
    workdir: String,
}

impl DockerfileBuilder {
    /// Creates a builder for the given base image and working directory.
    pub fn new(base_image: impl Into<String>, workdir: impl Into<String>) -> Self {
        Self {
            base_image: base_image.into(),
            tag: String::new(),
            skill_name: "skill".to_string(),
            layer_names: Vec::new(),
            adapter_script: None,
            setup_commands: Vec::new(),
            workdir: workdir.into(),
        }
    }

    /// Records the target tag as an image label.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Sets the name the skill is mounted under.
    pub fn with_skill_name(mut self, name: impl Into<String>) -> Self {
        self.skill_name = name.into();
        self
    }

    /// Adds a staged layer by its name in the build context.
    pub fn with_layer(mut self, name: impl Into<String>) -> Self {
        self.layer_names.push(name.into());
        self
    }

    /// Installs the staged adapter script.
    pub fn with_adapter_script(mut self, file_name: impl Into<String>) -> Self {
        self.adapter_script = Some(file_name.into());
        self
    }

    /// Appends setup commands as build steps.
    pub fn with_setup_commands(mut self, commands: &[String]) -> Self {
        self.setup_commands.extend(commands.iter().cloned());
        self
    }

    /// Build and return the Dockerfile content as a string.
    pub fn build(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("FROM {}", self.base_image));
        if !self.tag.is_empty() {
            lines.push(format!("LABEL skillbench.tag=\"{}\"", escape_label(&self.tag)));
        }
        lines.push(String::new());

        let mut dirs = vec![GENERIC_SKILL_DIR.to_string()];
        dirs.extend(HARNESS_SKILL_DIRS.iter().map(|d| d.to_string()));
        dirs.push(self.workdir.clone());
        lines.push(format!("RUN mkdir -p {}", dirs.join(" ")));

        lines.push(format!(
            "COPY {}/ {}/{}/",
            SKILL_CONTEXT_DIR, GENERIC_SKILL_DIR, self.skill_name
        ));
        for dir in HARNESS_SKILL_DIRS {
            lines.push(format!("COPY {}/ {}/{}/", SKILL_CONTEXT_DIR, dir, self.skill_name));
        }

        for layer in &self.layer_names {
            lines.push(format!(
                "COPY {}/{} {}/{}",
                LAYERS_CONTEXT_DIR, layer, self.workdir, layer
            ));
        }

        if let Some(script) = &self.adapter_script {
            lines.push(format!("COPY {} {}/{}", script, SCRIPT_INSTALL_DIR, script));
            lines.push(format!("RUN chmod +x {}/{}", SCRIPT_INSTALL_DIR, script));
        }

        for command in &self.setup_commands {
            lines.push(format!("RUN {}", run_body(command)));
        }

        lines.push(String::new());
        lines.push(format!("WORKDIR {}", self.workdir));

        lines.join("\n")
    }
}

/// Folds a multi-line command into one instruction with `\` continuations.
fn run_body(command: &str) -> String {
    let parts: Vec<&str> = command
        .lines()
        .map(|line| line.trim().trim_end_matches('\\').trim_end())
        .filter(|line| !line.trim().is_empty())
        .collect();
    parts.join(" \\\n    ")
}

fn escape_label(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// A staged, isolated build context. Deleted when dropped.
pub struct BuildContext {
    dir: TempDir,
    dockerfile: String,
    steps: Vec<String>,
}

impl BuildContext {
    /// Copies the skill, layers and adapter script into a fresh directory
    /// and writes the Dockerfile.
    pub fn stage(request: &ImageBuildRequest) -> Result<Self, DockerError> {
        let dir = tempfile::Builder::new()
            .prefix("skillbench-build-")
            .tempdir()
            .map_err(|e| DockerError::Staging(format!("Failed to create build dir: {}", e)))?;
        let mut steps = Vec::new();

        if !request.skill_path.is_dir() {
            return Err(DockerError::Staging(format!(
                "Skill directory not found: {}",
                request.skill_path.display()
            )));
        }
        copy_tree(&request.skill_path, &dir.path().join(SKILL_CONTEXT_DIR)).map_err(|e| {
            DockerError::Staging(format!(
                "Failed to copy skill {}: {}",
                request.skill_path.display(),
                e
            ))
        })?;
        steps.push(format!("Staged skill from {}", request.skill_path.display()));

        let skill = skill_name(&request.skill_path);
        check_context_name(&skill, &request.skill_path)?;
        let mut builder = DockerfileBuilder::new(&request.base_image, &request.workdir)
            .with_tag(&request.tag)
            .with_skill_name(skill);

        let layers_dir = dir.path().join(LAYERS_CONTEXT_DIR);
        fs::create_dir_all(&layers_dir)
            .map_err(|e| DockerError::Staging(format!("Failed to create layers dir: {}", e)))?;
        let mut layer_names = HashSet::new();
        for layer in &request.layers {
            let name = file_name(layer)?;
            check_context_name(&name, layer)?;
            if !layer_names.insert(name.clone()) {
                return Err(DockerError::Staging(format!(
                    "Layer {} collides with another layer named '{}'",
                    layer.display(),
                    name
                )));
            }
            copy_path(layer, &layers_dir.join(&name)).map_err(|e| {
                DockerError::Staging(format!("Failed to copy layer {}: {}", layer.display(), e))
            })?;
            steps.push(format!("Staged layer {}", layer.display()));
            builder = builder.with_layer(name);
        }

        if let Some(script) = &request.adapter_script {
            let name = file_name(script)?;
            check_context_name(&name, script)?;
            fs::copy(script, dir.path().join(&name)).map_err(|e| {
                DockerError::Staging(format!(
                    "Failed to copy adapter script {}: {}",
                    script.display(),
                    e
                ))
            })?;
            steps.push(format!("Staged adapter script {}", name));
            builder = builder.with_adapter_script(name);
        }

        let dockerfile = builder
            .with_setup_commands(&request.setup_commands)
            .build();
        fs::write(dir.path().join(DOCKERFILE_NAME), &dockerfile)
            .map_err(|e| DockerError::Staging(format!("Failed to write Dockerfile: {}", e)))?;
        steps.push(format!(
            "Generated Dockerfile ({} instructions)",
            dockerfile.lines().filter(|l| !l.trim().is_empty()).count()
        ));

        Ok(Self {
            dir,
            dockerfile,
            steps,
        })
    }

    /// Root of the build context.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of the generated Dockerfile.
    pub fn dockerfile_path(&self) -> PathBuf {
        self.dir.path().join(DOCKERFILE_NAME)
    }

    /// Generated Dockerfile content.
    pub fn dockerfile(&self) -> &str {
        &self.dockerfile
    }

    /// Staging steps taken, in order.
    pub fn steps(&self) -> &[String] {
        &self.steps
    }
}

fn file_name(path: &Path) -> Result<String, DockerError> {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| DockerError::Staging(format!("Path has no file name: {}", path.display())))
}

/// Names land unquoted in COPY instructions.
fn check_context_name(name: &str, path: &Path) -> Result<(), DockerError> {
    if name.chars().any(char::is_whitespace) {
        return Err(DockerError::Staging(format!(
            "Name contains whitespace: {}",
            path.display()
        )));
    }
    Ok(())
}

/// Copies a file or a directory tree.
fn copy_path(src: &Path, dst: &Path) -> io::Result<()> {
    if src.is_dir() {
        copy_tree(src, dst)
    } else {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(src, dst).map(|_| ())
    }
}

/// Recursively copies a directory.
fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry?;
        let rel = match entry.path().strip_prefix(src) {
            Ok(rel) => rel,
            Err(_) => continue,
        };
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
