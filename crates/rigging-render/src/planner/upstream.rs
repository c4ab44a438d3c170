//! Upstream fetch collaborators for Helm and GitHub assets
//!
//! The planner only renders the request; fetching and templating are
//! supplied by the embedding application.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Where a chart comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartSource {
    /// Chart already on disk
    Local { chart_root: PathBuf },
    /// Chart repository
    Repo {
        chart_ref: String,
        repo_url: String,
        version: String,
    },
    /// Chart directory inside a GitHub repository
    GitHub {
        repo: String,
        git_ref: String,
        path: String,
    },
}

/// Downloads a chart
#[async_trait]
pub trait ChartFetcher: Send + Sync {
    /// Fetch `source` below `scratch`, returning the chart root
    async fn fetch(&self, source: &ChartSource, scratch: &Path) -> Result<PathBuf>;
}

/// Input to `helm template`
#[derive(Debug, Clone, PartialEq)]
pub struct HelmTemplateRequest {
    pub release_name: String,
    pub chart_root: PathBuf,
    pub values: serde_yaml::Value,
    pub namespace: String,
    pub helm_opts: Vec<String>,
    /// Directory the rendered manifests are written to
    pub dest: PathBuf,
}

/// Renders a chart into manifests
#[async_trait]
pub trait HelmTemplater: Send + Sync {
    async fn template(&self, request: &HelmTemplateRequest) -> Result<()>;
}

/// Files to fetch from a GitHub repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubRequest {
    pub repo: String,
    pub git_ref: String,
    pub path: String,
    /// Fetch through the vendor proxy with installation credentials
    pub private: bool,
    /// Drop `path` from the written file names
    pub strip_path: bool,
    pub dest: PathBuf,
}

/// Fetches files from GitHub
#[async_trait]
pub trait GitHubFetcher: Send + Sync {
    async fn fetch(&self, request: &GitHubRequest) -> Result<()>;
}
