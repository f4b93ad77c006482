#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;
    use tessera::cache::{sha256_hex, DiskTableStore};
    use tessera::source::{
        DirectorySources, FixedModule, MemorySources, ModuleContext, Resolution, SourceLayer,
        SourceProvider, SourceResolver,
    };

    const BASE: &str = "2DA V2.0\n\n Label  HitDie\n0 Fighter 10\n";
    const EXPANSION: &str = "2DA V2.0\n\n Label  HitDie\n0 Fighter 12\n";
    const OVERRIDE: &str = "2DA V2.0\n\n Label  HitDie\n0 Fighter 20\n";

    fn resolver(sources: Arc<MemorySources>) -> SourceResolver {
        SourceResolver::new(sources, Arc::new(FixedModule::default()), 1 << 20)
    }

    fn hit_die(resolution: Resolution) -> i64 {
        let resolved = resolution.found().expect("table should resolve");
        resolved.table.cell(0, 1).and_then(|c| c.as_i64()).unwrap()
    }

    #[tokio::test]
    async fn test_resolve_is_idempotent_and_cached() {
        let sources = Arc::new(MemorySources::new().with_table(SourceLayer::Base, "classes", BASE));
        let resolver = resolver(Arc::clone(&sources));

        let first = resolver.resolve("classes").await.unwrap().found().unwrap();
        let second = resolver.resolve("classes").await.unwrap().found().unwrap();

        assert_eq!(first.table, second.table);
        assert_eq!(sources.read_count(), 1);
        let stats = resolver.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test]
    async fn test_precedence_and_invalidation() {
        let sources = Arc::new(
            MemorySources::new()
                .with_table(SourceLayer::Base, "classes", BASE)
                .with_table(SourceLayer::Expansion1, "classes", EXPANSION)
                .with_table(SourceLayer::UserOverride, "classes", OVERRIDE),
        );
        let resolver = resolver(Arc::clone(&sources));
        assert_eq!(hit_die(resolver.resolve("classes").await.unwrap()), 20);

        assert!(sources.remove(SourceLayer::UserOverride, "classes"));
        // Still cached until invalidated.
        assert_eq!(hit_die(resolver.resolve("classes").await.unwrap()), 20);

        assert!(resolver.invalidate("classes"));
        assert_eq!(hit_die(resolver.resolve("classes").await.unwrap()), 12);
    }

    #[tokio::test]
    async fn test_module_layers_outrank_global_layers() {
        let sources = Arc::new(
            MemorySources::new()
                .with_table(SourceLayer::Base, "classes", BASE)
                .with_table(SourceLayer::UserOverride, "classes", EXPANSION),
        );
        sources.put_module("campaign", SourceLayer::ModuleArchive, "classes", OVERRIDE);
        let resolver = resolver(sources);

        assert_eq!(hit_die(resolver.resolve("classes").await.unwrap()), 12);
        resolver.set_module_context(Some(ModuleContext::new("campaign")));
        assert_eq!(hit_die(resolver.resolve("classes").await.unwrap()), 20);
        resolver.set_module_context(Some(ModuleContext::new("other")));
        assert_eq!(hit_die(resolver.resolve("classes").await.unwrap()), 12);
    }

    #[tokio::test]
    async fn test_every_copy_malformed_is_not_found() {
        let sources = Arc::new(
            MemorySources::new()
                .with_table(SourceLayer::Base, "feat", "not a table")
                .with_table(SourceLayer::Workshop, "feat", "2DA V2.0\n\n A\n0 \"open\n"),
        );
        let resolver = resolver(sources);
        assert!(!resolver.resolve("feat").await.unwrap().is_found());
        assert_eq!(resolver.malformed_count(), 2);
    }

    #[tokio::test]
    async fn test_budget_evicts_least_recent() {
        let sources = Arc::new(
            MemorySources::new()
                .with_table(SourceLayer::Base, "a", BASE)
                .with_table(SourceLayer::Base, "b", BASE)
                .with_table(SourceLayer::Base, "c", BASE),
        );
        let probe = resolver(Arc::clone(&sources));
        let one = probe
            .resolve("a")
            .await
            .unwrap()
            .found()
            .unwrap()
            .table
            .approx_size_bytes();

        // Room for two tables of this size.
        let resolver = SourceResolver::new(
            Arc::clone(&sources) as Arc<dyn SourceProvider>,
            Arc::new(FixedModule::default()),
            one * 2 + one / 2,
        );
        for table in ["a", "b", "c"] {
            resolver.resolve(table).await.unwrap();
        }

        let stats = resolver.stats();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.evictions, 1);
        assert!(stats.bytes <= stats.budget);

        let cached: Vec<String> = resolver
            .cache()
            .snapshot()
            .into_iter()
            .map(|(key, _)| key.table)
            .collect();
        assert_eq!(cached, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_directory_layers_and_persisted_tables() {
        let base = TempDir::new().unwrap();
        let overlay = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        std::fs::write(base.path().join("classes.2da"), BASE).unwrap();
        std::fs::write(overlay.path().join("CLASSES.2DA"), OVERRIDE).unwrap();
        std::fs::write(base.path().join("skills.2da"), BASE).unwrap();

        let sources = DirectorySources::new()
            .with_layer(SourceLayer::Base, base.path())
            .with_layer(SourceLayer::EnhancedOverlay, overlay.path());
        let store = DiskTableStore::new(cache.path().join("resolved"));
        let resolver = SourceResolver::new(
            Arc::new(sources),
            Arc::new(FixedModule::default()),
            1 << 20,
        )
        .with_disk_store(store.clone());

        assert_eq!(resolver.list_tables().await.unwrap(), vec!["classes", "skills"]);

        let resolved = resolver.resolve("classes").await.unwrap().found().unwrap();
        assert_eq!(resolved.source.layer, SourceLayer::EnhancedOverlay);
        assert!(resolved.path.is_some());

        let persisted = store
            .get(&sha256_hex(OVERRIDE.as_bytes()))
            .await
            .unwrap()
            .expect("parsed table persisted");
        assert_eq!(&persisted, resolved.table.as_ref());
    }
}
