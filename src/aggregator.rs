//! Fan-in of every source's event stream into the single dashboard feed.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::domain::Event;
use crate::error::{CiWatchError, NotFoundError, Result};
use crate::providers::{build_backend, Backend, EventStream, SourceSpec};

const FEED_CAPACITY: usize = 256;

/// Source identity to backend lookup. Fixed after startup.
#[derive(Default, Clone)]
pub struct SourceRegistry {
    backends: HashMap<String, Arc<dyn Backend>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a backend; a name can only be taken once.
    pub fn insert(&mut self, name: String, backend: Arc<dyn Backend>) -> Result<()> {
        if self.backends.contains_key(&name) {
            return Err(CiWatchError::Config(format!("Duplicate source name '{name}'")));
        }
        self.backends.insert(name, backend);
        Ok(())
    }

    pub fn get(&self, name: &str) -> std::result::Result<Arc<dyn Backend>, NotFoundError> {
        self.backends
            .get(name)
            .cloned()
            .ok_or_else(|| NotFoundError(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

/// Builds every configured source, validating those that ask for it.
///
/// A source that fails to build or to answer its ping is left out. Ending up with no
/// source at all is the only fatal outcome.
pub async fn connect_sources(
    specs: &[SourceSpec],
    force_validate: bool,
    cancel: &CancellationToken,
) -> Result<SourceRegistry> {
    let mut registry = SourceRegistry::new();

    for spec in specs {
        let backend = match build_backend(spec, cancel.child_token()) {
            Ok(backend) => backend,
            Err(e) => {
                warn!("Skipping {} source {}: {e}", spec.kind, spec.name);
                continue;
            }
        };

        if spec.validate || force_validate {
            if let Err(cause) = backend.ping().await {
                let err = CiWatchError::Connectivity {
                    name: spec.name.clone(),
                    cause,
                };
                warn!("Skipping {} source: {err}", spec.kind);
                continue;
            }
            info!("Source {} is reachable", spec.name);
        }

        if let Err(e) = registry.insert(spec.name.clone(), backend) {
            warn!("Skipping {} source: {e}", spec.kind);
        }
    }

    if registry.is_empty() {
        return Err(CiWatchError::NoSources);
    }

    info!("{} source(s) active", registry.len());
    Ok(registry)
}

/// Single-consumer end of the merged event stream.
pub struct Aggregator {
    rx: mpsc::Receiver<Event>,
    workers: JoinSet<()>,
}

impl Aggregator {
    /// Subscribes to every registered source and forwards its events, one worker per
    /// source so that each source's order is preserved.
    pub fn start(registry: &SourceRegistry) -> Self {
        let (tx, rx) = mpsc::channel(FEED_CAPACITY);
        let mut workers = JoinSet::new();

        for (name, backend) in &registry.backends {
            workers.spawn(forward(name.clone(), backend.subscribe(), tx.clone()));
        }

        Self { rx, workers }
    }

    /// Next event from any source; `None` once every source has stopped.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    pub fn shutdown(mut self) {
        self.workers.abort_all();
        self.rx.close();
    }
}

async fn forward(source: String, stream: EventStream, tx: mpsc::Sender<Event>) {
    while let Some(event) = stream.next().await {
        if tx.send(event).await.is_err() {
            break;
        }
    }
    debug!("Forwarding for {source} finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fixtures::pipeline;
    use crate::domain::Status;
    use crate::providers::testing::FakeBackend;
    use crate::providers::SourceKind;

    #[tokio::test]
    async fn test_fan_in_tags_and_preserves_per_source_order() {
        let mut registry = SourceRegistry::new();
        let a: Vec<_> = (0..20)
            .map(|i| pipeline(&i.to_string(), i, Status::Running, vec![]))
            .collect();
        let b: Vec<_> = (0..20)
            .map(|i| pipeline(&i.to_string(), i, Status::Success, vec![]))
            .collect();
        registry.insert("A".to_string(), FakeBackend::new("A", a)).unwrap();
        registry.insert("B".to_string(), FakeBackend::new("B", b)).unwrap();

        let mut aggregator = Aggregator::start(&registry);
        let mut seen: HashMap<String, Vec<String>> = HashMap::new();
        for _ in 0..40 {
            match aggregator.recv().await.unwrap() {
                Event::Update { source, pipeline } => {
                    seen.entry(source).or_default().push(pipeline.id)
                }
                Event::Error { cause, .. } => panic!("unexpected error: {cause}"),
            }
        }

        let expected: Vec<String> = (0..20).map(|i| i.to_string()).collect();
        assert_eq!(seen["A"], expected);
        assert_eq!(seen["B"], expected);
        aggregator.shutdown();
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut registry = SourceRegistry::new();
        registry.insert("A".to_string(), FakeBackend::new("A", vec![])).unwrap();
        assert!(registry.insert("A".to_string(), FakeBackend::new("A", vec![])).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_lookup_miss_is_not_found() {
        let registry = SourceRegistry::new();
        let err = registry.get("ghost").err().unwrap();
        assert_eq!(err, NotFoundError("ghost".to_string()));
    }

    #[tokio::test]
    async fn test_connect_sources_skips_broken_sources() {
        let mut github = SourceSpec::new(SourceKind::Github, "not-a-repo-path");
        github.token = Some("token".into());
        let simulator = SourceSpec::new(SourceKind::Simulator, "demo");

        let registry = connect_sources(&[github, simulator], false, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(registry.names().collect::<Vec<_>>(), ["demo"]);
    }

    #[tokio::test]
    async fn test_connect_sources_fails_without_any_source() {
        let github = SourceSpec::new(SourceKind::Github, "owner/repo");
        let result = connect_sources(&[github], false, &CancellationToken::new()).await;
        assert!(matches!(result, Err(CiWatchError::NoSources)));
    }

    #[tokio::test]
    async fn test_connect_sources_drops_unreachable_validated_source() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Any)
            .with_status(401)
            .create_async()
            .await;

        let mut gitlab = SourceSpec::new(SourceKind::Gitlab, "group/project");
        gitlab.endpoint = Some(server.url());
        gitlab.validate = true;
        let simulator = SourceSpec::new(SourceKind::Simulator, "demo");

        let registry = connect_sources(&[gitlab, simulator], false, &CancellationToken::new())
            .await
            .unwrap();
        assert!(registry.get("group/project").is_err());
        assert!(registry.get("demo").is_ok());
    }
}
