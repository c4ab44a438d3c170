//! Asset planner
//!
//! `build` turns assets into an ordered plan: each asset's `when` is
//! evaluated once, templates in its fields are rendered, and the remaining
//! work is captured in a step action. `execute` runs the steps in order.

mod confirm;
pub mod eks;
mod fs;
mod plan;
mod upstream;

pub use confirm::{DaemonConfirmer, PlanConfirmer, TerminalConfirmer};
pub use fs::{resolve_dest, write_file};
pub use plan::{Plan, Step, StepAction, confirm, execute};
pub use upstream::{
    ChartFetcher, ChartSource, GitHubFetcher, GitHubRequest, HelmTemplateRequest, HelmTemplater,
};

use rigging_core::asset::{
    AmazonEksAsset, DockerAsset, DockerLayerAsset, GitHubAsset, HelmAsset, InlineAsset,
    TerraformAsset, WebAsset,
};
use rigging_core::{
    Asset, AssetKind, AssetShared, ConfigGroup, ConfigValues, FileMode, ImageSource, ReleaseMetadata,
};
use rigging_engine::Builder;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{RenderError, Result};
use crate::images::ImageSaver;
use crate::options::RenderOptions;
use crate::templates::render_builder;

/// Default destination of terraform assets
pub const TERRAFORM_DEST: &str = "main.tf";

/// Default destination of rendered helm charts
pub const HELM_DEST: &str = "manifests";

/// Builds plans; collaborators not wired make their asset kinds unknown
pub struct Planner {
    options: RenderOptions,
    http: reqwest::Client,
    images: Option<ImageSaver>,
    helm: Option<(Arc<dyn ChartFetcher>, Arc<dyn HelmTemplater>)>,
    github: Option<Arc<dyn GitHubFetcher>>,
}

impl Planner {
    pub fn new(options: RenderOptions) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(options.web_timeout)
            .build()?;

        Ok(Self {
            options,
            http,
            images: None,
            helm: None,
            github: None,
        })
    }

    pub fn with_images(mut self, saver: ImageSaver) -> Self {
        self.images = Some(saver);
        self
    }

    pub fn with_helm(mut self, fetcher: Arc<dyn ChartFetcher>, templater: Arc<dyn HelmTemplater>) -> Self {
        self.helm = Some((fetcher, templater));
        self
    }

    pub fn with_github(mut self, fetcher: Arc<dyn GitHubFetcher>) -> Self {
        self.github = Some(fetcher);
        self
    }

    /// Plan every included asset under `root`
    ///
    /// An empty or unparseable `when` includes the asset. Any failure
    /// aborts the build; no partial plan is returned.
    pub fn build(
        &self,
        root: &Path,
        assets: &[Asset],
        config_groups: &[ConfigGroup],
        metadata: &ReleaseMetadata,
        values: &ConfigValues,
    ) -> Result<Plan> {
        let builder = render_builder(config_groups, values, metadata, &self.options.state_path())?;
        let mut plan = Plan::new();

        for asset in assets {
            if !builder.render_bool(asset.when(), true) {
                debug!(kind = %asset.kind(), dest = asset.dest(), "asset excluded by when");
                continue;
            }

            let step = match asset {
                Asset::Inline(a) => self.inline_step(&builder, root, a)?,
                Asset::Docker(a) => self.docker_step(&builder, root, a, metadata)?,
                Asset::DockerLayer(a) => self.docker_layer_step(&builder, root, a, metadata)?,
                Asset::Helm(a) => self.helm_step(&builder, root, a, metadata)?,
                Asset::Web(a) => self.web_step(&builder, root, a)?,
                Asset::GitHub(a) => self.github_step(&builder, root, a)?,
                Asset::Terraform(a) => self.terraform_step(&builder, root, a)?,
                Asset::AmazonEks(a) => self.amazon_eks_step(&builder, root, a)?,
            };
            plan.push(step);
        }

        info!(steps = plan.len(), assets = assets.len(), "plan built");
        Ok(plan)
    }

    fn inline_step(&self, builder: &Builder, root: &Path, asset: &InlineAsset) -> Result<Step> {
        let (dest, path) = destination(builder, root, &asset.shared.dest, "")?;
        let contents = builder.render_string(&asset.contents)?;
        let mode = asset.shared.mode.unwrap_or(FileMode::DEFAULT_FILE);

        let description = describe(builder, &asset.shared, AssetKind::Inline);
        Ok(Step::new(dest, description, move || async move {
            write_file(&path, contents.as_bytes(), mode).await
        }))
    }

    fn image_saver(&self, kind: AssetKind) -> Result<ImageSaver> {
        self.images.clone().ok_or_else(|| RenderError::UnknownAssetType {
            kind: kind.to_string(),
        })
    }

    fn docker_step(
        &self,
        builder: &Builder,
        root: &Path,
        asset: &DockerAsset,
        metadata: &ReleaseMetadata,
    ) -> Result<Step> {
        let saver = self.image_saver(AssetKind::Docker)?;
        let (dest, path) = destination(builder, root, &asset.shared.dest, "")?;
        let image = builder.render_string(&asset.image)?;
        let source = asset.source;
        let metadata = metadata.clone();

        let description = describe(builder, &asset.shared, AssetKind::Docker);
        Ok(Step::new(dest, description, move || async move {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            saver.save(&image, source, &metadata, &path).await
        }))
    }

    fn docker_layer_step(
        &self,
        builder: &Builder,
        root: &Path,
        asset: &DockerLayerAsset,
        metadata: &ReleaseMetadata,
    ) -> Result<Step> {
        let saver = self.image_saver(AssetKind::DockerLayer)?;
        let (dest, path) = destination(builder, root, &asset.shared.dest, "")?;
        let image = builder.render_string(&asset.image)?;
        let layer = builder.render_string(&asset.layer)?;
        let source = asset.source;
        let metadata = metadata.clone();

        let description = describe(builder, &asset.shared, AssetKind::DockerLayer);
        Ok(Step::new(dest, description, move || async move {
            saver
                .save_layer(&image, source, &metadata, &layer, &path)
                .await
        }))
    }

    fn helm_step(
        &self,
        builder: &Builder,
        root: &Path,
        asset: &HelmAsset,
        metadata: &ReleaseMetadata,
    ) -> Result<Step> {
        let (fetcher, templater) = self.helm.clone().ok_or_else(|| RenderError::UnknownAssetType {
            kind: AssetKind::Helm.to_string(),
        })?;
        let (dest, path) = destination(builder, root, &asset.shared.dest, HELM_DEST)?;

        let source = if let Some(local) = &asset.local {
            ChartSource::Local {
                chart_root: self.options.root_path(&builder.render_string(&local.chart_root)?),
            }
        } else if let Some(fetch) = &asset.helm_fetch {
            ChartSource::Repo {
                chart_ref: builder.render_string(&fetch.chart_ref)?,
                repo_url: builder.render_string(&fetch.repo_url)?,
                version: builder.render_string(&fetch.version)?,
            }
        } else if let Some(github) = &asset.github {
            ChartSource::GitHub {
                repo: builder.render_string(&github.repo)?,
                git_ref: builder.render_string(&github.git_ref)?,
                path: builder.render_string(&github.path)?,
            }
        } else {
            return Err(RenderError::Upstream {
                message: "helm asset needs one of local, helm_fetch or github".to_string(),
            });
        };

        let values = render_yaml(builder, &asset.values)?;
        let helm_opts = asset
            .helm_opts
            .iter()
            .map(|opt| builder.render_string(opt))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let namespace = builder.render_string(&asset.namespace)?;
        let release_name = if metadata.app_slug.is_empty() {
            "release".to_string()
        } else {
            metadata.app_slug.clone()
        };

        let description = describe(builder, &asset.shared, AssetKind::Helm);
        Ok(Step::new(dest, description, move || async move {
            let scratch = tempfile::tempdir()?;
            let chart_root = match &source {
                ChartSource::Local { chart_root } => chart_root.clone(),
                remote => fetcher.fetch(remote, scratch.path()).await?,
            };

            let request = HelmTemplateRequest {
                release_name,
                chart_root,
                values,
                namespace,
                helm_opts,
                dest: path,
            };
            templater.template(&request).await
        }))
    }

    fn web_step(&self, builder: &Builder, root: &Path, asset: &WebAsset) -> Result<Step> {
        let (dest, path) = destination(builder, root, &asset.shared.dest, "")?;
        let url = builder.render_string(&asset.url)?;
        let mode = asset.shared.mode.unwrap_or(FileMode::DEFAULT_FILE);

        let mut headers = Vec::new();
        for (name, values) in &asset.headers {
            let name = builder.render_string(name)?;
            for value in values {
                headers.push((name.clone(), builder.render_string(value)?));
            }
        }

        let client = self.http.clone();
        let description = describe(builder, &asset.shared, AssetKind::Web);
        Ok(Step::new(dest, description, move || async move {
            let mut request = client.get(&url);
            for (name, value) in &headers {
                request = request.header(name.as_str(), value.as_str());
            }

            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(RenderError::Http {
                    url,
                    message: format!("unexpected status {}", status),
                });
            }

            let body = response.bytes().await?;
            debug!(url = %url, bytes = body.len(), "downloaded web asset");
            write_file(&path, &body, mode).await
        }))
    }

    fn github_step(&self, builder: &Builder, root: &Path, asset: &GitHubAsset) -> Result<Step> {
        let fetcher = self.github.clone().ok_or_else(|| RenderError::UnknownAssetType {
            kind: AssetKind::GitHub.to_string(),
        })?;
        let (dest, path) = destination(builder, root, &asset.shared.dest, ".")?;

        let request = GitHubRequest {
            repo: builder.render_string(&asset.repo)?,
            git_ref: builder.render_string(&asset.git_ref)?,
            path: builder.render_string(&asset.path)?,
            private: asset.source == ImageSource::Replicated,
            strip_path: asset.strip_path,
            dest: path,
        };

        let description = describe(builder, &asset.shared, AssetKind::GitHub);
        Ok(Step::new(dest, description, move || async move {
            fetcher.fetch(&request).await
        }))
    }

    fn terraform_step(&self, builder: &Builder, root: &Path, asset: &TerraformAsset) -> Result<Step> {
        let (dest, path) = destination(builder, root, &asset.shared.dest, TERRAFORM_DEST)?;
        let contents = builder.render_string(&asset.inline)?;
        let mode = asset.shared.mode.unwrap_or(FileMode::DEFAULT_FILE);

        let description = describe(builder, &asset.shared, AssetKind::Terraform);
        Ok(Step::new(dest, description, move || async move {
            write_file(&path, contents.as_bytes(), mode).await
        }))
    }

    fn amazon_eks_step(&self, builder: &Builder, root: &Path, asset: &AmazonEksAsset) -> Result<Step> {
        let (dest, path) = destination(builder, root, &asset.shared.dest, eks::DEFAULT_DEST)?;
        let rendered = render_eks(builder, asset)?;
        let contents = eks::generate(&rendered)?;
        let mode = asset.shared.mode.unwrap_or(FileMode::DEFAULT_FILE);

        let description = describe(builder, &asset.shared, AssetKind::AmazonEks);
        Ok(Step::new(dest, description, move || async move {
            write_file(&path, contents.as_bytes(), mode).await
        }))
    }
}

/// Rendered destination and its path under `root`
fn destination(builder: &Builder, root: &Path, dest: &str, default: &str) -> Result<(String, PathBuf)> {
    let rendered = builder.render_string(dest)?;
    let dest = if rendered.trim().is_empty() {
        default.to_string()
    } else {
        rendered
    };

    if dest.is_empty() {
        return Err(RenderError::InvalidDestination { dest });
    }

    let path = resolve_dest(root, &dest)?;
    Ok((dest, path))
}

/// Rendered description, falling back to the asset kind
fn describe(builder: &Builder, shared: &AssetShared, kind: AssetKind) -> String {
    match builder.render_string(&shared.description) {
        Ok(rendered) if !rendered.trim().is_empty() => rendered,
        _ => kind.to_string(),
    }
}

/// Render every string leaf of a YAML value
fn render_yaml(builder: &Builder, value: &serde_yaml::Value) -> Result<serde_yaml::Value> {
    use serde_yaml::Value;

    Ok(match value {
        Value::String(s) => Value::String(builder.render_string(s)?),
        Value::Sequence(items) => Value::Sequence(
            items
                .iter()
                .map(|item| render_yaml(builder, item))
                .collect::<Result<_>>()?,
        ),
        Value::Mapping(map) => {
            let mut rendered = serde_yaml::Mapping::new();
            for (key, item) in map {
                rendered.insert(render_yaml(builder, key)?, render_yaml(builder, item)?);
            }
            Value::Mapping(rendered)
        }
        other => other.clone(),
    })
}

fn render_all(builder: &Builder, items: &[String]) -> Result<Vec<String>> {
    items
        .iter()
        .map(|item| builder.render_string(item).map_err(RenderError::from))
        .collect()
}

fn render_eks(builder: &Builder, asset: &AmazonEksAsset) -> Result<AmazonEksAsset> {
    let created_vpc = match &asset.created_vpc {
        Some(vpc) => Some(rigging_core::asset::EksCreatedVpc {
            zones: render_all(builder, &vpc.zones)?,
            vpc_cidr: builder.render_string(&vpc.vpc_cidr)?,
            public_subnets: render_all(builder, &vpc.public_subnets)?,
            private_subnets: render_all(builder, &vpc.private_subnets)?,
        }),
        None => None,
    };
    let existing_vpc = match &asset.existing_vpc {
        Some(vpc) => Some(rigging_core::asset::EksExistingVpc {
            vpc_id: builder.render_string(&vpc.vpc_id)?,
            public_subnets: render_all(builder, &vpc.public_subnets)?,
            private_subnets: render_all(builder, &vpc.private_subnets)?,
        }),
        None => None,
    };
    let autoscaling_groups = asset
        .autoscaling_groups
        .iter()
        .map(|group| {
            Ok(rigging_core::asset::EksAutoscalingGroup {
                name: builder.render_string(&group.name)?,
                group_size: builder.render_string(&group.group_size)?,
                machine_type: builder.render_string(&group.machine_type)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(AmazonEksAsset {
        shared: asset.shared.clone(),
        cluster_name: builder.render_string(&asset.cluster_name)?,
        region: builder.render_string(&asset.region)?,
        created_vpc,
        existing_vpc,
        autoscaling_groups,
    })
}
