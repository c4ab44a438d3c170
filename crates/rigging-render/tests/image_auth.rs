//! Registry credential fallback when saving vendor images

use async_trait::async_trait;
use base64::Engine as _;
use futures::StreamExt;
use rigging_core::{ImageRewrite, ImageSource, ReleaseMetadata};
use rigging_render::{
    CollectingSink, ImageSaver, Progress, ProgressStream, RegistryAuth, RegistryClient,
    RenderError, Result,
};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Registry that only accepts a fixed set of passwords
#[derive(Default)]
struct FakeRegistry {
    accepted: Vec<String>,
    pulls: Mutex<Vec<(String, Option<RegistryAuth>)>>,
    tags: Mutex<Vec<(String, String)>>,
}

impl FakeRegistry {
    fn accepting(passwords: &[&str]) -> Self {
        Self {
            accepted: passwords.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    fn pulls(&self) -> Vec<(String, Option<RegistryAuth>)> {
        self.pulls.lock().unwrap().clone()
    }
}

fn decode(auth: &str) -> RegistryAuth {
    let json = base64::engine::general_purpose::STANDARD.decode(auth).unwrap();
    serde_json::from_slice(&json).unwrap()
}

#[async_trait]
impl RegistryClient for FakeRegistry {
    async fn pull(&self, image: &str, auth: Option<&str>) -> Result<ProgressStream> {
        let auth = auth.map(decode);
        self.pulls.lock().unwrap().push((image.to_string(), auth.clone()));

        if let Some(auth) = auth
            && !self.accepted.contains(&auth.password)
        {
            return Err(RenderError::Registry {
                message: format!("unauthorized: {}", auth.password),
            });
        }

        Ok(futures::stream::iter(vec![Ok(Progress::status(image, "Pulling"))]).boxed())
    }

    async fn tag(&self, source: &str, target: &str) -> Result<()> {
        self.tags
            .lock()
            .unwrap()
            .push((source.to_string(), target.to_string()));
        Ok(())
    }

    async fn save(&self, images: &[String], dest: &Path) -> Result<ProgressStream> {
        std::fs::write(dest, images.join("\n"))?;
        Ok(futures::stream::iter(vec![Ok(Progress::status(&images[0], "Saved"))]).boxed())
    }
}

fn metadata() -> ReleaseMetadata {
    ReleaseMetadata {
        customer_id: "cust-1".to_string(),
        installation_id: "inst-1".to_string(),
        registry_secret: "s3cr3t".to_string(),
        images: vec![ImageRewrite {
            url: "quay.io/acme/api:1.2".to_string(),
            source: "replicated".to_string(),
            app_slug: "acme".to_string(),
            image_key: "api".to_string(),
        }],
        ..Default::default()
    }
}

fn saver(registry: Arc<FakeRegistry>, sink: Arc<CollectingSink>) -> ImageSaver {
    ImageSaver::new(registry, sink, "registry.example.com", 4)
}

#[tokio::test]
async fn test_registry_secret_accepted_first() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(FakeRegistry::accepting(&["s3cr3t"]));
    let sink = Arc::new(CollectingSink::new());
    let dest = dir.path().join("api.tar");

    saver(registry.clone(), sink.clone())
        .save("quay.io/acme/api:1.2", ImageSource::Replicated, &metadata(), &dest)
        .await
        .unwrap();

    let pulls = registry.pulls();
    assert_eq!(pulls.len(), 1);
    assert_eq!(pulls[0].0, "registry.example.com/acme/api:1.2");
    assert_eq!(pulls[0].1, Some(RegistryAuth::new("cust-1", "s3cr3t")));

    assert_eq!(
        registry.tags.lock().unwrap().clone(),
        vec![(
            "registry.example.com/acme/api:1.2".to_string(),
            "quay.io/acme/api:1.2".to_string()
        )]
    );
    assert_eq!(std::fs::read_to_string(&dest).unwrap(), "quay.io/acme/api:1.2");
    assert_eq!(sink.updates().len(), 2);
}

#[tokio::test]
async fn test_falls_back_to_installation_id() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(FakeRegistry::accepting(&["inst-1"]));
    let sink = Arc::new(CollectingSink::new());

    saver(registry.clone(), sink)
        .save(
            "quay.io/acme/api:1.2",
            ImageSource::Replicated,
            &metadata(),
            &dir.path().join("api.tar"),
        )
        .await
        .unwrap();

    let passwords: Vec<_> = registry
        .pulls()
        .into_iter()
        .map(|(_, auth)| auth.unwrap().password)
        .collect();
    assert_eq!(passwords, vec!["s3cr3t", "inst-1"]);
}

#[tokio::test]
async fn test_both_credentials_rejected_reports_second_error() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(FakeRegistry::accepting(&[]));
    let sink = Arc::new(CollectingSink::new());

    let err = saver(registry.clone(), sink)
        .save(
            "quay.io/acme/api:1.2",
            ImageSource::Replicated,
            &metadata(),
            &dir.path().join("api.tar"),
        )
        .await
        .unwrap_err();

    match err {
        RenderError::BothAuthMethodsFailed { image, source } => {
            assert_eq!(image, "quay.io/acme/api:1.2");
            assert!(matches!(
                *source,
                RenderError::Registry { ref message } if message == "unauthorized: inst-1"
            ));
        }
        other => panic!("expected both auth methods to fail, got {other:?}"),
    }
    assert_eq!(registry.pulls().len(), 2);
    assert!(!dir.path().join("api.tar").exists());
}

#[tokio::test]
async fn test_public_image_pulled_once_anonymously() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(FakeRegistry::accepting(&[]));
    let sink = Arc::new(CollectingSink::new());

    saver(registry.clone(), sink)
        .save(
            "redis:7",
            ImageSource::Public,
            &metadata(),
            &dir.path().join("redis.tar"),
        )
        .await
        .unwrap();

    assert_eq!(registry.pulls(), vec![("redis:7".to_string(), None)]);
    assert!(registry.tags.lock().unwrap().is_empty());
}

mod through_plan {
    use super::*;
    use rigging_core::asset::DockerAsset;
    use rigging_core::{Asset, AssetShared, ConfigValues};
    use rigging_render::planner::execute;
    use rigging_render::{Planner, RenderOptions};
    use tokio_util::sync::CancellationToken;

    async fn run(registry: Arc<FakeRegistry>, root: &Path) -> Result<()> {
        let options = RenderOptions::new(root);
        let planner = Planner::new(options)?
            .with_images(saver(registry, Arc::new(CollectingSink::new())));
        let assets = vec![Asset::Docker(DockerAsset {
            shared: AssetShared {
                dest: "images/api.tar".to_string(),
                ..Default::default()
            },
            image: "quay.io/acme/api:1.2".to_string(),
            source: ImageSource::Replicated,
        })];

        let plan = planner.build(root, &assets, &[], &metadata(), &ConfigValues::new())?;
        execute(&CancellationToken::new(), plan).await
    }

    #[tokio::test]
    async fn test_step_succeeds_on_second_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(FakeRegistry::accepting(&["inst-1"]));

        run(registry.clone(), dir.path()).await.unwrap();

        assert_eq!(registry.pulls().len(), 2);
        assert!(dir.path().join("images/api.tar").exists());
    }

    #[tokio::test]
    async fn test_step_error_mentions_only_second_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(FakeRegistry::accepting(&[]));

        let message = run(registry, dir.path()).await.unwrap_err().to_string();

        assert!(message.contains("unauthorized: inst-1"));
        assert!(!message.contains("s3cr3t"));
    }
}
