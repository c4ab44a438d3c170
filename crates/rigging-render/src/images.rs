//! Container image saving
//!
//! Vendor images are pulled from the vendor registry with installation
//! credentials, retagged to the name the asset declares, then saved as a
//! `docker save` style archive. Two credential pairs are tried in order:
//! `(customer_id, registry_secret)` then `(customer_id, installation_id)`.

use async_trait::async_trait;
use base64::Engine as _;
use futures::StreamExt;
use futures::stream::BoxStream;
use rigging_core::{ImageSource, ReleaseMetadata};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::{RenderError, Result};
use crate::progress::{self, Progress, ProgressSink};

/// Stream of progress updates from a registry operation
pub type ProgressStream = BoxStream<'static, Result<Progress>>;

/// Registry credentials as sent to the registry client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
}

impl RegistryAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Base64-encoded JSON `{"username": ..., "password": ...}`
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(json))
    }
}

/// Container registry operations the saver needs
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Pull an image; `auth` is the encoded credential blob
    async fn pull(&self, image: &str, auth: Option<&str>) -> Result<ProgressStream>;

    async fn tag(&self, source: &str, target: &str) -> Result<()>;

    /// Save images into a single archive at `dest`
    async fn save(&self, images: &[String], dest: &Path) -> Result<ProgressStream>;
}

/// Split `repo/name:tag` into `(repo/name, tag)`, defaulting the tag
///
/// A digest reference `repo/name@sha256:...` splits at the `@` and yields
/// the digest in place of the tag.
pub fn split_tag(image: &str) -> (&str, &str) {
    if let Some((name, digest)) = image.split_once('@') {
        return (split_tag(name).0, digest);
    }

    let last_slash = image.rfind('/').map(|i| i + 1).unwrap_or(0);
    match image[last_slash..].rfind(':') {
        Some(colon) => {
            let at = last_slash + colon;
            (&image[..at], &image[at + 1..])
        }
        None => (image, "latest"),
    }
}

/// Reference to pull from for an image
///
/// Vendor images with a rewrite entry are pulled as
/// `<registry_host>/<app_slug>/<image_key>:<tag>`.
pub fn pull_url(
    image: &str,
    source: ImageSource,
    metadata: &ReleaseMetadata,
    registry_host: &str,
) -> String {
    if source != ImageSource::Replicated {
        return image.to_string();
    }

    match metadata.image_rewrite(image) {
        Some(rewrite) => {
            let (_, reference) = split_tag(image);
            let separator = if image.contains('@') { '@' } else { ':' };
            let slug = if rewrite.app_slug.is_empty() {
                &metadata.app_slug
            } else {
                &rewrite.app_slug
            };
            format!(
                "{}/{}/{}{}{}",
                registry_host, slug, rewrite.image_key, separator, reference
            )
        }
        None => image.to_string(),
    }
}

/// Saves images to archives, relaying progress to a sink
#[derive(Clone)]
pub struct ImageSaver {
    client: Arc<dyn RegistryClient>,
    sink: Arc<dyn ProgressSink>,
    registry_host: String,
    progress_buffer: usize,
}

impl ImageSaver {
    pub fn new(
        client: Arc<dyn RegistryClient>,
        sink: Arc<dyn ProgressSink>,
        registry_host: impl Into<String>,
        progress_buffer: usize,
    ) -> Self {
        Self {
            client,
            sink,
            registry_host: registry_host.into(),
            progress_buffer,
        }
    }

    /// Save `image` to the archive at `dest`
    ///
    /// Public images get one anonymous attempt. Vendor images fall back to
    /// the installation id when the registry secret is rejected; if both
    /// fail, only the second error is returned.
    pub async fn save(
        &self,
        image: &str,
        source: ImageSource,
        metadata: &ReleaseMetadata,
        dest: &Path,
    ) -> Result<()> {
        let pull = pull_url(image, source, metadata, &self.registry_host);

        if source != ImageSource::Replicated {
            return self.save_once(&pull, image, None, dest).await;
        }

        let primary = RegistryAuth::new(&metadata.customer_id, &metadata.registry_secret).encode()?;
        let first = match self.save_once(&pull, image, Some(&primary), dest).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        debug!(image, error = %first, "registry secret rejected, retrying with installation id");

        let fallback =
            RegistryAuth::new(&metadata.customer_id, &metadata.installation_id).encode()?;
        self.save_once(&pull, image, Some(&fallback), dest)
            .await
            .map_err(|e| RenderError::BothAuthMethodsFailed {
                image: image.to_string(),
                source: Box::new(e),
            })
    }

    async fn save_once(
        &self,
        pull: &str,
        image: &str,
        auth: Option<&str>,
        dest: &Path,
    ) -> Result<()> {
        let client = Arc::clone(&self.client);
        progress::relay(self.sink.as_ref(), self.progress_buffer, |tx| async move {
            let stream = client.pull(pull, auth).await?;
            forward(stream, &tx).await?;

            if pull != image {
                client.tag(pull, image).await?;
            }

            let stream = client.save(&[image.to_string()], dest).await?;
            forward(stream, &tx).await?;

            info!(image, dest = %dest.display(), "saved image");
            Ok::<(), RenderError>(())
        })
        .await
    }

    /// Save `image` and unpack one of its layers into `dest_dir`
    pub async fn save_layer(
        &self,
        image: &str,
        source: ImageSource,
        metadata: &ReleaseMetadata,
        layer: &str,
        dest_dir: &Path,
    ) -> Result<()> {
        let scratch = tempfile::tempdir()?;
        let archive = scratch.path().join("image.tar");

        self.save(image, source, metadata, &archive).await?;

        let layer = layer.to_string();
        let dest_dir = dest_dir.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let result = extract_layer(&archive, &layer, &dest_dir);
            drop(scratch);
            result
        })
        .await
        .map_err(|e| RenderError::Archive {
            message: format!("layer extraction task failed: {}", e),
        })?
    }
}

async fn forward(mut stream: ProgressStream, tx: &mpsc::Sender<Progress>) -> Result<()> {
    while let Some(update) = stream.next().await {
        let update = update?;
        // A closed sink only loses display; the operation continues
        let _ = tx.send(update).await;
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    #[serde(rename = "Layers", default)]
    layers: Vec<String>,
}

/// Unpack `archive`, find `layer` through `manifest.json`, unpack that layer into `dest`
pub fn extract_layer(archive: &Path, layer: &str, dest: &Path) -> Result<()> {
    let unpack_err = |what: &str, e: std::io::Error| RenderError::Archive {
        message: format!("{}: {}", what, e),
    };

    let unpacked = tempfile::tempdir()?;
    tar::Archive::new(File::open(archive)?)
        .unpack(unpacked.path())
        .map_err(|e| unpack_err("unpacking image archive", e))?;

    let manifest = std::fs::read(unpacked.path().join("manifest.json"))
        .map_err(|e| unpack_err("reading manifest.json", e))?;
    let entries: Vec<ManifestEntry> = serde_json::from_slice(&manifest)?;

    let layer_path: PathBuf = entries
        .iter()
        .flat_map(|entry| entry.layers.iter())
        .find(|path| path.as_str() == layer || path.starts_with(&format!("{}/", layer)))
        .map(|path| unpacked.path().join(path))
        .ok_or_else(|| RenderError::Archive {
            message: format!("layer {} not found in image manifest", layer),
        })?;

    std::fs::create_dir_all(dest)?;
    tar::Archive::new(File::open(&layer_path).map_err(|e| unpack_err("opening layer", e))?)
        .unpack(dest)
        .map_err(|e| unpack_err("unpacking layer", e))?;

    debug!(layer, dest = %dest.display(), "unpacked image layer");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigging_core::ImageRewrite;

    #[test]
    fn test_split_tag() {
        assert_eq!(split_tag("nginx"), ("nginx", "latest"));
        assert_eq!(split_tag("nginx:1.25"), ("nginx", "1.25"));
        assert_eq!(
            split_tag("localhost:5000/app/web:2.0"),
            ("localhost:5000/app/web", "2.0")
        );
        assert_eq!(split_tag("localhost:5000/app"), ("localhost:5000/app", "latest"));
        assert_eq!(
            split_tag("quay.io/acme/api@sha256:0123abcd"),
            ("quay.io/acme/api", "sha256:0123abcd")
        );
        assert_eq!(
            split_tag("localhost:5000/api:1.0@sha256:0123abcd"),
            ("localhost:5000/api", "sha256:0123abcd")
        );
    }

    #[test]
    fn test_pull_url_keeps_digest() {
        let metadata = ReleaseMetadata {
            app_slug: "acme".to_string(),
            images: vec![ImageRewrite {
                url: "quay.io/acme/api@sha256:0123abcd".to_string(),
                image_key: "api".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };

        assert_eq!(
            pull_url(
                "quay.io/acme/api@sha256:0123abcd",
                ImageSource::Replicated,
                &metadata,
                "registry.example.com"
            ),
            "registry.example.com/acme/api@sha256:0123abcd"
        );
    }

    #[test]
    fn test_pull_url_rewrite() {
        let metadata = ReleaseMetadata {
            app_slug: "acme".to_string(),
            images: vec![ImageRewrite {
                url: "quay.io/acme/api:1.0".to_string(),
                image_key: "api-key".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };

        assert_eq!(
            pull_url("quay.io/acme/api:1.0", ImageSource::Replicated, &metadata, "registry.example.com"),
            "registry.example.com/acme/api-key:1.0"
        );
        assert_eq!(
            pull_url("quay.io/acme/api:1.0", ImageSource::Public, &metadata, "registry.example.com"),
            "quay.io/acme/api:1.0"
        );
        assert_eq!(
            pull_url("redis:7", ImageSource::Replicated, &metadata, "registry.example.com"),
            "redis:7"
        );
    }

    #[test]
    fn test_auth_encoding() {
        let encoded = RegistryAuth::new("cust", "secret").encode().unwrap();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap();
        let auth: RegistryAuth = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(auth, RegistryAuth::new("cust", "secret"));
        assert_eq!(
            String::from_utf8(decoded).unwrap(),
            r#"{"username":"cust","password":"secret"}"#
        );
    }

    fn append(builder: &mut tar::Builder<Vec<u8>>, path: &str, data: &[u8]) {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, data).unwrap();
    }

    fn image_archive(dir: &Path) -> PathBuf {
        let mut layer = tar::Builder::new(Vec::new());
        append(&mut layer, "etc/app.conf", b"key=value\n");
        let layer = layer.into_inner().unwrap();

        let mut image = tar::Builder::new(Vec::new());
        append(
            &mut image,
            "manifest.json",
            br#"[{"Config":"cfg.json","RepoTags":["app:1"],"Layers":["abc123/layer.tar"]}]"#,
        );
        append(&mut image, "abc123/layer.tar", &layer);

        let path = dir.join("image.tar");
        std::fs::write(&path, image.into_inner().unwrap()).unwrap();
        path
    }

    #[test]
    fn test_extract_layer() {
        let dir = tempfile::tempdir().unwrap();
        let archive = image_archive(dir.path());
        let dest = dir.path().join("out");

        extract_layer(&archive, "abc123", &dest).unwrap();

        assert_eq!(
            std::fs::read_to_string(dest.join("etc/app.conf")).unwrap(),
            "key=value\n"
        );
    }

    #[test]
    fn test_extract_missing_layer() {
        let dir = tempfile::tempdir().unwrap();
        let archive = image_archive(dir.path());

        let err = extract_layer(&archive, "nope", &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, RenderError::Archive { .. }));
    }
}
