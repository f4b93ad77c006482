#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tessera::source::{
        FixedModule, MemorySources, ModuleContext, SourceCopy, SourceLayer, SourceProvider,
        SourceResolver, SourceResult,
    };

    /// Delays every lookup.
    struct SlowSources {
        inner: MemorySources,
        delay: Duration,
    }

    #[async_trait]
    impl SourceProvider for SlowSources {
        async fn list_sources(
            &self,
            table: &str,
            module: Option<&ModuleContext>,
        ) -> SourceResult<Vec<SourceCopy>> {
            tokio::time::sleep(self.delay).await;
            self.inner.list_sources(table, module).await
        }

        async fn list_tables(&self, module: Option<&ModuleContext>) -> SourceResult<Vec<String>> {
            self.inner.list_tables(module).await
        }
    }

    const TABLES: [&str; 5] = ["classes", "feat", "skills", "spells", "racialtypes"];

    fn slow_resolver(delay: Duration) -> Arc<SourceResolver> {
        let inner = MemorySources::new();
        for table in TABLES {
            inner.put(SourceLayer::Base, table, "2DA V2.0\n\n Label\n0 x\n");
        }
        Arc::new(SourceResolver::new(
            Arc::new(SlowSources { inner, delay }),
            Arc::new(FixedModule::default()),
            1 << 20,
        ))
    }

    fn names() -> Vec<String> {
        TABLES.iter().map(|t| t.to_string()).collect()
    }

    #[tokio::test]
    async fn test_preload_completes_within_deadline() {
        let resolver = slow_resolver(Duration::from_millis(1));
        let report = resolver.preload(names(), Duration::from_secs(10)).await;

        assert_eq!(report.loaded, names());
        assert!(report.remaining.is_empty());
        assert!(!report.timed_out);
        assert_eq!(resolver.stats().entries, TABLES.len());
    }

    #[tokio::test]
    async fn test_deadline_leaves_remaining_for_lazy_resolution() {
        let resolver = slow_resolver(Duration::from_millis(200));
        let report = resolver.preload(names(), Duration::from_millis(300)).await;

        assert!(report.timed_out);
        assert!(report.loaded.len() < TABLES.len());
        assert!(!report.remaining.is_empty());
        assert_eq!(report.loaded.len() + report.remaining.len(), TABLES.len());

        // Whatever was skipped still resolves on demand.
        for table in &report.remaining {
            assert!(resolver.resolve(table).await.unwrap().is_found());
        }
    }

    #[tokio::test]
    async fn test_cancel_stops_between_tables() {
        let resolver = slow_resolver(Duration::from_millis(200));
        let handle = resolver.spawn_preload(names(), Duration::from_secs(30));
        handle.cancel();
        let report = handle.wait().await;

        assert!(!report.timed_out);
        assert!(report.loaded.is_empty());
        assert_eq!(report.remaining, names());
    }

    #[tokio::test]
    async fn test_empty_preload() {
        let resolver = slow_resolver(Duration::from_millis(1));
        let report = resolver.preload(Vec::new(), Duration::from_millis(10)).await;
        assert!(report.loaded.is_empty());
        assert!(!report.timed_out);
    }
}
