//! Artifact deployer - finds the WAR, explodes it into webapps and keeps the
//! exploded app in sync with incremental builds

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use ignore::WalkBuilder;
use thiserror::Error;
use xavva_core::PathFilter;

use crate::config::{AppConfig, BuildTool, ConfigError, validate_context_name};
use crate::paths;

/// Tomcat's own apps, never a deploy target.
pub const BUILTIN_APPS: &[&str] = &["ROOT", "manager", "host-manager", "docs", "examples"];

pub const HOTSWAP_PROPERTIES: &str = "hotswap-agent.properties";

const WEB_ROOTS: &[&str] = &["webapp", "WebContent"];

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("No .war file found under {0}. Check the packaging of your build.")]
    ArtifactNotFound(PathBuf),

    #[error("Failed to extract {path}: {source}")]
    Extract {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// The WAR picked for deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDescriptor {
    pub path: PathBuf,
    pub file_name: String,
    pub context_path: String,
}

/// A resource copied into the exploded app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSync {
    pub app: String,
    /// Path inside the exploded app.
    pub target: PathBuf,
    /// Where the file can be fetched, when it is served directly.
    pub url: Option<String>,
}

#[derive(Clone)]
pub struct Deployer {
    config: Arc<AppConfig>,
}

impl Deployer {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self { config }
    }

    /// Newest `.war` in the project tree.
    pub fn find_artifact(&self) -> Result<PathBuf, DeployError> {
        let root = &self.config.project_dir;
        let tomcat = self.config.tomcat.path.as_deref();
        select_latest(find_wars(root, tomcat))
            .ok_or_else(|| DeployError::ArtifactNotFound(root.clone()))
    }

    /// Explode the newest WAR into `webapps/<context>`.
    pub fn deploy_to_webapps(&self) -> Result<ArtifactDescriptor, DeployError> {
        let path = self.find_artifact()?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let context_path = match self.config.project.context_name()? {
            Some(name) => name,
            None => {
                let name = file_name.strip_suffix(".war").unwrap_or(&file_name);
                validate_context_name(name)?;
                name.to_string()
            }
        };

        let webapps = self.config.tomcat.webapps_dir()?;
        fs::create_dir_all(&webapps)?;
        let target = webapps.join(&context_path);

        remove_if_exists(&target)?;
        remove_if_exists(&webapps.join(format!("{context_path}.war")))?;
        remove_if_exists(&self.config.tomcat.jsp_work_dir(&context_path)?)?;

        tracing::info!(war = %path.display(), target = %target.display(), "Extracting artifact");
        let file = fs::File::open(&path)?;
        let mut archive = zip::ZipArchive::new(file).map_err(|source| DeployError::Extract {
            path: path.clone(),
            source,
        })?;
        archive
            .extract(&target)
            .map_err(|source| DeployError::Extract {
                path: path.clone(),
                source,
            })?;

        let properties = paths::state_dir(&self.config.project_dir).join(HOTSWAP_PROPERTIES);
        if properties.is_file() {
            let classes = target.join("WEB-INF").join("classes");
            fs::create_dir_all(&classes)?;
            fs::copy(&properties, classes.join(HOTSWAP_PROPERTIES))?;
        }

        Ok(ArtifactDescriptor {
            path,
            file_name,
            context_path,
        })
    }

    /// Configured app name, or the single non-builtin app in webapps.
    pub fn app_folder(&self) -> Result<String, ConfigError> {
        if let Some(name) = self.config.project.context_name()? {
            return Ok(name);
        }
        infer_app_folder(&self.config.tomcat.webapps_dir()?)
    }

    /// Copy newer compiled classes into the exploded app.
    ///
    /// Returns `None` when nothing is exploded yet and a full deploy is needed.
    pub fn sync_classes(&self) -> Result<Option<String>, DeployError> {
        let Some((app, dir)) = self.exploded_app()? else {
            return Ok(None);
        };
        let classes = dir.join("WEB-INF").join("classes");

        let mut copied = 0;
        for root in class_output_roots(self.config.project.build_tool) {
            let src = self.config.project_dir.join(root);
            if src.is_dir() {
                copied += copy_newer(&src, &classes)?;
            }
        }
        tracing::info!(app = %app, copied, "Synced classes");
        Ok(Some(app))
    }

    /// Copy one changed resource into the exploded app.
    ///
    /// `None` when the file has no place in the app or nothing is exploded.
    pub fn sync_resource(&self, changed: &Path) -> Result<Option<ResourceSync>, DeployError> {
        let relative = changed
            .strip_prefix(&self.config.project_dir)
            .unwrap_or(changed);
        let Some(target) = app_location(relative) else {
            return Ok(None);
        };
        let Some((app, dir)) = self.exploded_app()? else {
            return Ok(None);
        };
        let source = self.config.project_dir.join(relative);
        if !source.is_file() {
            return Ok(None);
        }

        let dest = dir.join(&target);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&source, &dest)?;

        let url = is_url_reachable(&target).then(|| {
            let web_path = target
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            format!("{}{}", self.config.app_url(&app), web_path)
        });
        Ok(Some(ResourceSync { app, target, url }))
    }

    fn exploded_app(&self) -> Result<Option<(String, PathBuf)>, DeployError> {
        let app = match self.app_folder() {
            Ok(app) => app,
            Err(ConfigError::AppNotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let dir = self.config.tomcat.webapps_dir()?.join(&app);
        Ok(dir.is_dir().then_some((app, dir)))
    }
}

/// Compiled output directories of each build tool.
pub fn class_output_roots(tool: BuildTool) -> &'static [&'static str] {
    match tool {
        BuildTool::Maven => &["target/classes"],
        BuildTool::Gradle => &["build/classes/java/main", "build/resources/main"],
    }
}

/// Every `.war` under `root` with its modification time.
pub fn find_wars(root: &Path, exclude: Option<&Path>) -> Vec<(PathBuf, SystemTime)> {
    let filter = PathFilter::artifact_scan();
    let exclude = exclude.map(Path::to_path_buf);

    let mut builder = WalkBuilder::new(root);
    builder
        .standard_filters(false)
        .follow_links(false)
        .filter_entry(move |entry| {
            if entry.depth() == 0 || !entry.file_type().is_some_and(|t| t.is_dir()) {
                return true;
            }
            if exclude.as_deref().is_some_and(|ex| entry.path() == ex) {
                return false;
            }
            !filter.is_excluded_name(&entry.file_name().to_string_lossy())
        });

    let mut wars = Vec::new();
    for entry in builder.build().flatten() {
        let path = entry.path();
        let is_war = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("war"));
        if !is_war || !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        if let Some(modified) = entry.metadata().ok().and_then(|m| m.modified().ok()) {
            wars.push((path.to_path_buf(), modified));
        }
    }
    wars
}

/// Most recently modified; equal times go to the smallest path.
pub fn select_latest(candidates: Vec<(PathBuf, SystemTime)>) -> Option<PathBuf> {
    candidates
        .into_iter()
        .max_by(|(a_path, a_time), (b_path, b_time)| {
            a_time.cmp(b_time).then_with(|| b_path.cmp(a_path))
        })
        .map(|(path, _)| path)
}

pub fn infer_app_folder(webapps: &Path) -> Result<String, ConfigError> {
    let entries =
        fs::read_dir(webapps).map_err(|e| ConfigError::FileRead(webapps.to_path_buf(), e))?;
    let mut candidates: Vec<String> = entries
        .flatten()
        .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| !BUILTIN_APPS.contains(&name.as_str()))
        .collect();
    candidates.sort();

    match candidates.len() {
        0 => Err(ConfigError::AppNotFound(webapps.to_path_buf())),
        1 => Ok(candidates.remove(0)),
        _ => Err(ConfigError::AmbiguousApp(candidates)),
    }
}

/// Where a project file lives inside the exploded app, if anywhere.
///
/// Files below a `webapp`/`WebContent` directory keep their relative path;
/// `src/main/resources` files go to `WEB-INF/classes`.
pub fn app_location(relative: &Path) -> Option<PathBuf> {
    let parts: Vec<&std::ffi::OsStr> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s),
            _ => None,
        })
        .collect();

    if let Some(idx) = parts
        .iter()
        .position(|p| WEB_ROOTS.iter().any(|root| p.to_str() == Some(*root)))
    {
        let rest: PathBuf = parts[idx + 1..].iter().collect();
        return (!rest.as_os_str().is_empty()).then_some(rest);
    }

    let idx = parts
        .windows(2)
        .position(|w| w[0] == "main" && w[1] == "resources")?;
    let rest: PathBuf = parts[idx + 2..].iter().collect();
    (!rest.as_os_str().is_empty()).then(|| Path::new("WEB-INF").join("classes").join(rest))
}

fn is_url_reachable(target: &Path) -> bool {
    match target.components().next() {
        Some(Component::Normal(first)) => first != "WEB-INF" && first != "META-INF",
        _ => false,
    }
}

/// Copy files from `src` into `dst` whose source is strictly newer than the
/// destination (or whose destination is missing). Returns the number copied.
pub fn copy_newer(src: &Path, dst: &Path) -> io::Result<usize> {
    let mut copied = 0;
    let walker = WalkBuilder::new(src)
        .standard_filters(false)
        .follow_links(false)
        .build();
    for entry in walker.flatten() {
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(src) else {
            continue;
        };
        let dest = dst.join(relative);
        let src_time = entry.metadata().ok().and_then(|m| m.modified().ok());
        let dst_time = fs::metadata(&dest).ok().and_then(|m| m.modified().ok());
        let newer = match (src_time, dst_time) {
            (_, None) => true,
            (Some(s), Some(d)) => s > d,
            (None, Some(_)) => false,
        };
        if newer {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &dest)?;
            copied += 1;
        }
    }
    Ok(copied)
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
