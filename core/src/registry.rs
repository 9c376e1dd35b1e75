use crate::{Error, Result, Source};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Name a source is registered under, e.g. `awskinesis`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceType(String);

impl SourceType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds a ready source from its raw definition.
pub type LoadFn = fn(Vec<u8>) -> BoxFuture<'static, Result<Arc<dyn Source>>>;

/// Registry of source loaders keyed by type
pub struct Registry {
    loaders: HashMap<SourceType, LoadFn>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            loaders: HashMap::new(),
        }
    }

    pub fn register(&mut self, source_type: SourceType, load: LoadFn) {
        self.loaders.insert(source_type, load);
    }

    pub fn contains(&self, source_type: &SourceType) -> bool {
        self.loaders.contains_key(source_type)
    }

    /// Load a source of `source_type` from `definition`.
    pub async fn load(&self, source_type: &SourceType, definition: Vec<u8>) -> Result<Arc<dyn Source>> {
        let load = self
            .loaders
            .get(source_type)
            .ok_or_else(|| Error::UnknownSource(source_type.to_string()))?;

        load(definition).await
    }

    pub fn list_sources(&self) -> Vec<String> {
        let mut names: Vec<String> = self.loaders.keys().map(|t| t.to_string()).collect();
        names.sort();
        names
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Records;
    use async_trait::async_trait;
    use futures::FutureExt;
    use tokio_util::sync::CancellationToken;

    struct Fixed(usize);

    #[async_trait]
    impl Source for Fixed {
        fn number_of_workers(&self) -> usize {
            self.0
        }

        async fn fetch(
            &self,
            _cancel: &CancellationToken,
            _worker: usize,
            last_sequence: &str,
        ) -> Result<Records> {
            Ok(Records::empty(last_sequence))
        }

        fn close(&self, _worker: usize) -> Result<()> {
            Ok(())
        }
    }

    fn load_fixed(definition: Vec<u8>) -> BoxFuture<'static, Result<Arc<dyn Source>>> {
        async move {
            let workers: usize = serde_json::from_slice(&definition)?;
            Ok(Arc::new(Fixed(workers)) as Arc<dyn Source>)
        }
        .boxed()
    }

    #[tokio::test]
    async fn loads_registered_source() {
        let mut registry = Registry::new();
        registry.register(SourceType::new("fixed"), load_fixed);

        let source = registry
            .load(&SourceType::new("fixed"), b"3".to_vec())
            .await
            .unwrap();
        assert_eq!(source.number_of_workers(), 3);
        assert_eq!(registry.list_sources(), vec!["fixed".to_string()]);
    }

    #[tokio::test]
    async fn unknown_type_is_rejected() {
        let registry = Registry::new();

        let err = registry
            .load(&SourceType::new("missing"), Vec::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::UnknownSource(name) if name == "missing"));
    }

    #[tokio::test]
    async fn loader_errors_surface_unchanged() {
        let mut registry = Registry::new();
        registry.register(SourceType::new("fixed"), load_fixed);

        let err = registry
            .load(&SourceType::new("fixed"), b"not json".to_vec())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
