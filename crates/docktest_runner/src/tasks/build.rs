//! Image build task.

use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::engine::ContainerRuntime;
use crate::error::RunnerResult;
use crate::exec::CommandLine;
use crate::project::Project;

use super::{check_availability, Task, TaskContext, TaskKind, TaskOutcome, TaskState};

/// Build configuration. Unset fields resolve against the [`Project`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    /// Image name (default: project name)
    #[serde(default)]
    pub image_name: Option<String>,
    /// Image tag (default: project version)
    #[serde(default)]
    pub tag: Option<String>,
    /// Repository prefix, without any `/`
    #[serde(default)]
    pub repository: Option<String>,
    /// Also tag the image as `latest`
    #[serde(default = "default_tag_latest")]
    pub tag_latest: bool,
    /// Build context (default: project root)
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// Directory to save the image archive into
    #[serde(default)]
    pub save_to: Option<PathBuf>,
}

fn default_tag_latest() -> bool {
    true
}

impl Default for BuildSpec {
    fn default() -> Self {
        Self {
            image_name: None,
            tag: None,
            repository: None,
            tag_latest: true,
            directory: None,
            save_to: None,
        }
    }
}

/// Strip every `/` from a repository name. Empty results count as unset.
pub fn normalize_repository(repository: &str) -> Option<String> {
    let stripped: String = repository.chars().filter(|c| *c != '/').collect();
    if stripped.is_empty() {
        None
    } else {
        Some(stripped)
    }
}

impl BuildSpec {
    /// `<repository>/<image>` or just `<image>`.
    pub fn image_base(&self, project: &Project) -> String {
        let image = self.image_name.as_deref().unwrap_or(&project.name);
        let repository = self.repository.as_deref().and_then(normalize_repository);
        match repository {
            Some(repo) => format!("{}/{}", repo, image),
            None => image.to_string(),
        }
    }

    pub fn effective_tag<'a>(&'a self, project: &'a Project) -> &'a str {
        self.tag.as_deref().unwrap_or(&project.version)
    }

    /// The reference carrying the configured (or project) tag.
    pub fn versioned_ref(&self, project: &Project) -> String {
        format!("{}:{}", self.image_base(project), self.effective_tag(project))
    }

    pub fn latest_ref(&self, project: &Project) -> String {
        format!("{}:latest", self.image_base(project))
    }

    pub fn working_dir(&self, project: &Project) -> PathBuf {
        match &self.directory {
            Some(dir) => project.resolve(dir),
            None => project.root.clone(),
        }
    }

    /// `<engine> build -t <ref>:<tag> [-t <ref>:latest] .`
    pub fn build_args(&self, program: &str, project: &Project) -> Vec<String> {
        let mut args = vec![
            program.to_string(),
            "build".to_string(),
            "-t".to_string(),
            self.versioned_ref(project),
        ];
        if self.tag_latest {
            args.push("-t".to_string());
            args.push(self.latest_ref(project));
        }
        args.push(".".to_string());
        args
    }

    pub fn build_command(&self, program: &str, project: &Project) -> CommandLine {
        CommandLine::new(self.build_args(program, project), self.working_dir(project))
    }

    /// The reference written to the archive.
    ///
    /// `latest` when the build produced it, the versioned tag otherwise.
    pub fn save_ref(&self, project: &Project) -> String {
        if self.tag_latest {
            self.latest_ref(project)
        } else {
            self.versioned_ref(project)
        }
    }

    /// `<save_to>/<project>.tar`, if saving is configured.
    pub fn archive_path(&self, project: &Project) -> Option<PathBuf> {
        self.save_to
            .as_ref()
            .map(|dir| project.resolve(dir).join(format!("{}.tar", project.name)))
    }

    /// `<engine> save -o <archive> <ref>`, if saving is configured.
    pub fn save_command(&self, program: &str, project: &Project) -> Option<CommandLine> {
        self.archive_path(project).map(|archive| {
            CommandLine::new(
                vec![
                    program.to_string(),
                    "save".to_string(),
                    "-o".to_string(),
                    archive.to_string_lossy().to_string(),
                    self.save_ref(project),
                ],
                self.working_dir(project),
            )
        })
    }
}

/// Builds an image and optionally saves it to a tar archive.
#[derive(Debug, Clone)]
pub struct BuildTask {
    name: String,
    spec: BuildSpec,
    ignore_availability: bool,
    state: TaskState,
}

impl BuildTask {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spec: BuildSpec::default(),
            ignore_availability: false,
            state: TaskState::Unconfigured,
        }
    }

    /// Create a task from a ready-made spec.
    pub fn from_spec(name: impl Into<String>, spec: BuildSpec) -> Self {
        let mut task = Self::new(name);
        task.spec = spec;
        task.state.configure();
        task
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.spec.tag = Some(tag.into());
        self.state.configure();
        self
    }

    pub fn image_name(mut self, image_name: impl Into<String>) -> Self {
        self.spec.image_name = Some(image_name.into());
        self.state.configure();
        self
    }

    /// Set the repository. Every `/` is removed.
    pub fn repository(mut self, repository: impl AsRef<str>) -> Self {
        self.spec.repository = normalize_repository(repository.as_ref());
        self.state.configure();
        self
    }

    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.spec.directory = Some(directory.into());
        self.state.configure();
        self
    }

    pub fn tag_latest(mut self, enabled: bool) -> Self {
        self.spec.tag_latest = enabled;
        self.state.configure();
        self
    }

    pub fn save_image_to(mut self, directory: impl Into<PathBuf>) -> Self {
        self.spec.save_to = Some(directory.into());
        self.state.configure();
        self
    }

    pub fn ignore_availability(mut self, ignore: bool) -> Self {
        self.ignore_availability = ignore;
        self.state.configure();
        self
    }

    pub fn spec(&self) -> &BuildSpec {
        &self.spec
    }

    async fn save_image(&self, ctx: &TaskContext) -> RunnerResult<()> {
        let (Some(archive), Some(save)) = (
            self.spec.archive_path(&ctx.project),
            self.spec.save_command(ctx.engine.program(), &ctx.project),
        ) else {
            return Ok(());
        };

        if !self.spec.tag_latest {
            warn!(
                "Task {} saves {} because no latest tag was requested",
                self.name,
                self.spec.save_ref(&ctx.project)
            );
        }

        if let Some(parent) = archive.parent() {
            fs::create_dir_all(parent)?;
        }
        // tar archives cannot be updated in place
        if archive.exists() {
            debug!("Removing existing archive {:?}", archive);
            fs::remove_file(&archive)?;
        }

        info!("Saving image to {:?}", archive);
        ctx.executor.execute(&save).await?;
        Ok(())
    }
}

#[async_trait]
impl Task for BuildTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Build
    }

    fn state(&self) -> TaskState {
        self.state
    }

    fn plan(&self, project: &Project, runtime: ContainerRuntime) -> RunnerResult<Vec<CommandLine>> {
        let mut commands = vec![self.spec.build_command(runtime.command(), project)];
        commands.extend(self.spec.save_command(runtime.command(), project));
        Ok(commands)
    }

    async fn execute(&mut self, ctx: &TaskContext) -> RunnerResult<TaskOutcome> {
        self.state.begin_execution(&self.name)?;
        if !check_availability(&self.name, &ctx.engine, self.ignore_availability)? {
            return Ok(TaskOutcome::Skipped);
        }

        let build = self.spec.build_command(ctx.engine.program(), &ctx.project);
        info!("Building image {}", self.spec.versioned_ref(&ctx.project));
        debug!("Command: {}", build.display());
        ctx.executor.execute(&build).await?;

        self.save_image(ctx).await?;

        info!("Image {} built", self.spec.versioned_ref(&ctx.project));
        Ok(TaskOutcome::Executed)
    }
}
