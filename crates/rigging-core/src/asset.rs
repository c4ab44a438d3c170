//! Asset definitions
//!
//! An [`Asset`] describes one artifact produced during a render pass. In
//! release YAML every asset is a single-key map naming its type:
//!
//! ```yaml
//! - inline:
//!     contents: "replicas: {{repl ConfigOption(\"replicas\") }}"
//!     dest: manifests/app.yaml
//!     mode: 0644
//! - docker:
//!     image: registry.example.com/app:1.0
//!     source: replicated
//!     dest: images/app.tar
//!     when: '{{repl ConfigOptionEquals("airgap", "1") }}'
//! ```
//!
//! Raw YAML is validated into the enum on deserialization: a map populating
//! no known type, or more than one, is rejected.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::CoreError;

/// Unix permission bits for an output file
///
/// Accepts `"0644"`/`"644"` strings (octal) and integers. Integers whose
/// decimal digits are all octal digits (`644`, `755`) are read as octal,
/// since YAML 1.2 parses `0644` as the decimal number 644.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMode(pub u32);

impl FileMode {
    pub const DEFAULT_FILE: FileMode = FileMode(0o644);

    pub fn bits(self) -> u32 {
        self.0
    }

    fn from_decimal_digits(n: u64) -> Option<u32> {
        let digits = n.to_string();
        if digits.len() <= 4 && digits.chars().all(|c| ('0'..='7').contains(&c)) {
            u32::from_str_radix(&digits, 8).ok()
        } else {
            None
        }
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04o}", self.0)
    }
}

impl Serialize for FileMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FileMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Int(u64),
            Str(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Int(n) => match FileMode::from_decimal_digits(n) {
                Some(mode) => Ok(FileMode(mode)),
                None => u32::try_from(n)
                    .map(FileMode)
                    .map_err(|_| serde::de::Error::custom(format!("file mode {} is out of range", n))),
            },
            Repr::Str(s) => {
                let trimmed = s.trim().trim_start_matches("0o");
                u32::from_str_radix(trimmed, 8)
                    .map(FileMode)
                    .map_err(|_| serde::de::Error::custom(format!("invalid file mode '{}'", s)))
            }
        }
    }
}

/// Attributes shared by every asset type
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssetShared {
    /// Output path, relative to the install root
    #[serde(default)]
    pub dest: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<FileMode>,

    #[serde(default)]
    pub description: String,

    /// Inclusion template; empty means included
    #[serde(default)]
    pub when: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InlineAsset {
    #[serde(flatten)]
    pub shared: AssetShared,

    #[serde(default)]
    pub contents: String,
}

/// Where a container image is pulled from
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImageSource {
    /// Anonymous pull
    #[default]
    Public,
    /// Private vendor registry, authenticated with installation credentials
    Replicated,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DockerAsset {
    #[serde(flatten)]
    pub shared: AssetShared,

    pub image: String,

    #[serde(default)]
    pub source: ImageSource,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DockerLayerAsset {
    #[serde(flatten)]
    pub shared: AssetShared,

    pub image: String,

    #[serde(default)]
    pub source: ImageSource,

    /// Layer id (directory name inside the saved archive)
    pub layer: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalChart {
    pub chart_root: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HelmFetch {
    pub chart_ref: String,

    #[serde(default)]
    pub repo_url: String,

    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitHubRef {
    pub repo: String,

    #[serde(rename = "ref", default)]
    pub git_ref: String,

    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HelmAsset {
    #[serde(flatten)]
    pub shared: AssetShared,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<LocalChart>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helm_fetch: Option<HelmFetch>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<GitHubRef>,

    /// Values passed to the chart; string leaves may contain templates
    #[serde(default)]
    pub values: serde_yaml::Value,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub helm_opts: Vec<String>,

    #[serde(default)]
    pub namespace: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebAsset {
    #[serde(flatten)]
    pub shared: AssetShared,

    pub url: String,

    #[serde(default)]
    pub headers: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitHubAsset {
    #[serde(flatten)]
    pub shared: AssetShared,

    pub repo: String,

    #[serde(rename = "ref", default)]
    pub git_ref: String,

    #[serde(default)]
    pub path: String,

    #[serde(default)]
    pub source: ImageSource,

    /// Drop `path` from the destination of fetched files
    #[serde(default)]
    pub strip_path: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TerraformAsset {
    #[serde(flatten)]
    pub shared: AssetShared,

    #[serde(default)]
    pub inline: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EksCreatedVpc {
    pub zones: Vec<String>,
    pub vpc_cidr: String,
    pub public_subnets: Vec<String>,
    pub private_subnets: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EksExistingVpc {
    pub vpc_id: String,
    pub public_subnets: Vec<String>,
    pub private_subnets: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EksAutoscalingGroup {
    pub name: String,
    pub group_size: String,
    pub machine_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AmazonEksAsset {
    #[serde(flatten)]
    pub shared: AssetShared,

    pub cluster_name: String,

    pub region: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_vpc: Option<EksCreatedVpc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_vpc: Option<EksExistingVpc>,

    #[serde(default)]
    pub autoscaling_groups: Vec<EksAutoscalingGroup>,
}

/// Discriminant of an [`Asset`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetKind {
    Inline,
    Docker,
    DockerLayer,
    Helm,
    Web,
    GitHub,
    Terraform,
    AmazonEks,
}

impl AssetKind {
    /// Key used for this kind in release YAML
    pub fn key(self) -> &'static str {
        match self {
            Self::Inline => "inline",
            Self::Docker => "docker",
            Self::DockerLayer => "dockerlayer",
            Self::Helm => "helm",
            Self::Web => "web",
            Self::GitHub => "github",
            Self::Terraform => "terraform",
            Self::AmazonEks => "amazon_eks",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// One artifact to produce during a render pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAsset", into = "RawAsset")]
pub enum Asset {
    Inline(InlineAsset),
    Docker(DockerAsset),
    DockerLayer(DockerLayerAsset),
    Helm(HelmAsset),
    Web(WebAsset),
    GitHub(GitHubAsset),
    Terraform(TerraformAsset),
    AmazonEks(AmazonEksAsset),
}

impl Asset {
    pub fn kind(&self) -> AssetKind {
        match self {
            Self::Inline(_) => AssetKind::Inline,
            Self::Docker(_) => AssetKind::Docker,
            Self::DockerLayer(_) => AssetKind::DockerLayer,
            Self::Helm(_) => AssetKind::Helm,
            Self::Web(_) => AssetKind::Web,
            Self::GitHub(_) => AssetKind::GitHub,
            Self::Terraform(_) => AssetKind::Terraform,
            Self::AmazonEks(_) => AssetKind::AmazonEks,
        }
    }

    pub fn shared(&self) -> &AssetShared {
        match self {
            Self::Inline(a) => &a.shared,
            Self::Docker(a) => &a.shared,
            Self::DockerLayer(a) => &a.shared,
            Self::Helm(a) => &a.shared,
            Self::Web(a) => &a.shared,
            Self::GitHub(a) => &a.shared,
            Self::Terraform(a) => &a.shared,
            Self::AmazonEks(a) => &a.shared,
        }
    }

    pub fn dest(&self) -> &str {
        &self.shared().dest
    }

    pub fn when(&self) -> &str {
        &self.shared().when
    }

    /// Description for plan listings, falling back to the kind and destination
    pub fn display_description(&self) -> String {
        let shared = self.shared();
        if shared.description.is_empty() {
            format!("{} asset {}", self.kind(), shared.dest)
        } else {
            shared.description.clone()
        }
    }
}

/// Wire shape of an asset: one optional field per type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawAsset {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline: Option<InlineAsset>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker: Option<DockerAsset>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dockerlayer: Option<DockerLayerAsset>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helm: Option<HelmAsset>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web: Option<WebAsset>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<GitHubAsset>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terraform: Option<TerraformAsset>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amazon_eks: Option<AmazonEksAsset>,

    #[serde(flatten)]
    pub unknown: BTreeMap<String, serde_yaml::Value>,
}

impl TryFrom<RawAsset> for Asset {
    type Error = CoreError;

    fn try_from(raw: RawAsset) -> Result<Self, Self::Error> {
        let RawAsset {
            inline,
            docker,
            dockerlayer,
            helm,
            web,
            github,
            terraform,
            amazon_eks,
            unknown,
        } = raw;

        let mut candidates: Vec<Asset> = [
            inline.map(Asset::Inline),
            docker.map(Asset::Docker),
            dockerlayer.map(Asset::DockerLayer),
            helm.map(Asset::Helm),
            web.map(Asset::Web),
            github.map(Asset::GitHub),
            terraform.map(Asset::Terraform),
            amazon_eks.map(Asset::AmazonEks),
        ]
        .into_iter()
        .flatten()
        .collect();

        match candidates.len() {
            1 => Ok(candidates.remove(0)),
            0 if unknown.is_empty() => Err(CoreError::InvalidAsset {
                message: "no asset type set".to_string(),
            }),
            0 => Err(CoreError::InvalidAsset {
                message: format!(
                    "unknown asset type: {}",
                    unknown.keys().cloned().collect::<Vec<_>>().join(", ")
                ),
            }),
            _ => Err(CoreError::InvalidAsset {
                message: format!(
                    "multiple asset types set: {}",
                    candidates
                        .iter()
                        .map(|a| a.kind().key())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            }),
        }
    }
}

impl From<Asset> for RawAsset {
    fn from(asset: Asset) -> Self {
        let mut raw = RawAsset::default();
        match asset {
            Asset::Inline(a) => raw.inline = Some(a),
            Asset::Docker(a) => raw.docker = Some(a),
            Asset::DockerLayer(a) => raw.dockerlayer = Some(a),
            Asset::Helm(a) => raw.helm = Some(a),
            Asset::Web(a) => raw.web = Some(a),
            Asset::GitHub(a) => raw.github = Some(a),
            Asset::Terraform(a) => raw.terraform = Some(a),
            Asset::AmazonEks(a) => raw.amazon_eks = Some(a),
        }
        raw
    }
}
