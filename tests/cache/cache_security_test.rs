#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;
    use tessera::cache::{name_hash, sha256_hex, DiskTableStore, SchemaCache};
    use tessera::schema::{SchemaDescriptor, Synthesizer};
    use tessera::source::{FixedModule, MemorySources, SourceLayer, SourceResolver};
    use tessera::table::{codec, TableData};

    const CLASSES: &str = "2DA V2.0\n\n Label Name\n0 Fighter 111\n";

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    /// Persist a genuine descriptor, then hand the path to `tamper`.
    fn tampered_cache(dir: &TempDir, tamper: impl FnOnce(&std::path::Path)) -> SchemaCache {
        let columns = cols(&["Label", "Name"]);
        let hash = name_hash("classes");
        let cache = SchemaCache::open(dir.path()).unwrap();
        cache
            .get_or_synthesize(&Synthesizer::new(), "classes", &hash, &columns)
            .unwrap();
        tamper(&cache.descriptor_path("classes", &hash).unwrap());
        SchemaCache::open(dir.path()).unwrap()
    }

    #[test]
    fn test_mismatched_descriptor_rejected_and_rebuilt() {
        let dir = TempDir::new().unwrap();
        let cache = tampered_cache(&dir, |path| {
            let text = std::fs::read_to_string(path).unwrap();
            let mut descriptor: SchemaDescriptor = serde_json::from_str(&text).unwrap();
            descriptor.fields = vec!["Label".to_string(), "__import__".to_string()];
            std::fs::write(path, serde_json::to_string(&descriptor).unwrap()).unwrap();
        });

        let schema = cache
            .get_or_synthesize(
                &Synthesizer::new(),
                "classes",
                &name_hash("classes"),
                &cols(&["Label", "Name"]),
            )
            .unwrap();

        assert_eq!(schema.field_names(), vec!["Label", "Name"]);
        assert_eq!(cache.stats().corrupted, 1);

        // The rewritten file is the genuine descriptor again.
        let path = cache.descriptor_path("classes", &name_hash("classes")).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        let descriptor: SchemaDescriptor = serde_json::from_str(&text).unwrap();
        assert_eq!(descriptor, schema.descriptor());
    }

    #[test]
    fn test_unknown_keys_and_garbage_rejected() {
        for payload in [
            r#"{"version":1,"table":"classes","type_name":"Classes","columns":["Label","Name"],
               "fields":["Label","Name"],"display_field":"Label","localized":["Label","Name"],
               "init":"std::process::exit(1)"}"#,
            "not json at all",
            r#"{"version":99}"#,
            "",
        ] {
            let dir = TempDir::new().unwrap();
            let cache = tampered_cache(&dir, |path| std::fs::write(path, payload).unwrap());
            let schema = cache
                .get_or_synthesize(
                    &Synthesizer::new(),
                    "classes",
                    &name_hash("classes"),
                    &cols(&["Label", "Name"]),
                )
                .unwrap();
            assert_eq!(schema.type_name(), "Classes");
            assert_eq!(cache.stats().corrupted, 1, "payload {:?}", payload);
        }
    }

    #[test]
    fn test_descriptor_for_other_table_rejected() {
        let dir = TempDir::new().unwrap();
        let cache = tampered_cache(&dir, |path| {
            let text = std::fs::read_to_string(path).unwrap();
            let mut descriptor: SchemaDescriptor = serde_json::from_str(&text).unwrap();
            descriptor.table = "feat".to_string();
            std::fs::write(path, serde_json::to_string(&descriptor).unwrap()).unwrap();
        });
        cache
            .get_or_synthesize(
                &Synthesizer::new(),
                "classes",
                &name_hash("classes"),
                &cols(&["Label", "Name"]),
            )
            .unwrap();
        assert_eq!(cache.stats().corrupted, 1);
    }

    #[test]
    fn test_corrupted_index_discarded() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.json"), "{ broken").unwrap();
        let cache = SchemaCache::open(dir.path()).unwrap();
        assert_eq!(cache.stats().corrupted, 1);
        assert!(cache.index().is_empty());

        cache
            .get_or_synthesize(&Synthesizer::new(), "feat", "h", &cols(&["Label"]))
            .unwrap();
        assert_eq!(cache.index().len(), 1);
    }

    #[tokio::test]
    async fn test_table_store_rejects_path_like_keys() {
        let dir = TempDir::new().unwrap();
        let store = DiskTableStore::new(dir.path().join("resolved"));
        let table = TableData::parse("classes", CLASSES.as_bytes()).unwrap();

        for key in ["../escape", "/etc/passwd", "ABCDEF", "", "a/b"] {
            store.put(key, &table).await.unwrap();
            assert!(store.get(key).await.unwrap().is_none());
        }
        assert!(!dir.path().join("escape.bin").exists());
        assert!(!dir.path().join("resolved").exists());
    }

    #[tokio::test]
    async fn test_corrupted_table_file_fails_closed() {
        let dir = TempDir::new().unwrap();
        let store = DiskTableStore::new(dir.path());
        let key = sha256_hex(CLASSES.as_bytes());

        // A well-formed file holding different data under the same key.
        let forged = TableData::parse("classes", b"2DA V2.0\n\n Label\n0 Forged\n").unwrap();
        let mut bytes = codec::encode(&forged).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        std::fs::write(dir.path().join(format!("{}.bin", key)), &bytes).unwrap();
        assert!(store.get(&key).await.is_err());

        let sources = Arc::new(MemorySources::new().with_table(SourceLayer::Base, "classes", CLASSES));
        let resolver = SourceResolver::new(sources, Arc::new(FixedModule::default()), 1 << 20)
            .with_disk_store(store.clone());

        let resolved = resolver.resolve("classes").await.unwrap().found().unwrap();
        assert_eq!(resolved.table.cell(0, 0).unwrap().to_string(), "Fighter");
        assert_eq!(resolver.stats().corrupted, 1);

        // Replaced by a valid encoding of the real source.
        let stored = store.get(&key).await.unwrap().unwrap();
        assert_eq!(&stored, resolved.table.as_ref());
    }
}
