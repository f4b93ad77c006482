#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;
    use tessera::cache::{RelationshipCache, RELATIONSHIP_DB};
    use tessera::relationships::{
        load_order, BrokenReference, Relationship, RelationshipDetector, RelationshipGraph,
        RelationshipKind, TableSet, Validator,
    };
    use tessera::schema::{RecordBuilder, RecordTable, StringTable, Synthesizer};
    use tessera::table::TableData;

    fn table_set(sources: &[(&str, &str)]) -> TableSet {
        let synth = Synthesizer::new();
        let strings = StringTable::new();
        sources
            .iter()
            .map(|(name, text)| {
                let data = TableData::parse(*name, text.as_bytes()).unwrap();
                let schema = synth.synthesize(data.name(), data.columns());
                let records = RecordBuilder::new(Arc::clone(&schema), data.columns(), &strings)
                    .build_all(&data);
                (
                    name.to_string(),
                    Arc::new(RecordTable::new(schema, records, None)),
                )
            })
            .collect()
    }

    fn lookup(source: &str, column: &str, target: &str) -> Relationship {
        Relationship::new(source, column, target, RelationshipKind::Lookup)
    }

    fn corpus() -> TableSet {
        table_set(&[
            (
                "classes",
                "2DA V2.0\n\n Label FeatsTable SkillsTable\n\
                 0 Barbarian cls_feat_barb cls_skill_barb\n\
                 1 Bard **** cls_skill_bard\n",
            ),
            ("cls_skill_barb", "2DA V2.0\n\n SkillLabel ClassSkill\n0 Concentration 1\n"),
            (
                "feat",
                "2DA V2.0\n\n LABEL PREREQFEAT1\n0 Alertness ****\n1 Ambidexterity 0\n2 Cleave -1\n",
            ),
            ("packages", "2DA V2.0\n\n Label Class_ID\n0 Barb 0\n1 Lost 7\n"),
        ])
    }

    #[test]
    fn test_corpus_report() {
        let tables = corpus();
        let edges = RelationshipDetector::new(50).detect(&tables);
        let report = Validator::new(false, 100).validate(&edges, &tables);

        // FeatsTable, SkillsTable x2, PREREQFEAT1, Class_ID.
        assert_eq!(report.total_relationships, 5);
        assert_eq!(report.valid_relationships, 1);
        assert_eq!(
            report.missing_tables.iter().collect::<Vec<_>>(),
            vec!["cls_feat_barb", "cls_skill_bard"]
        );
        assert_eq!(report.broken_count, 3);
        assert!(report.broken_references.contains(&BrokenReference {
            table: "packages".to_string(),
            column: "Class_ID".to_string(),
            row: 1,
            value: "7".to_string(),
        }));
        assert!(!report.is_clean());
        assert_eq!(
            report.load_order,
            vec!["cls_skill_barb", "feat", "classes", "packages"]
        );
    }

    #[test]
    fn test_single_broken_reference() {
        let tables = table_set(&[(
            "feat",
            "2DA V2.0\n\n LABEL PREREQFEAT1\n0 Alertness 1\n1 Cleave 42\n",
        )]);
        let report =
            Validator::new(false, 100).validate(&[lookup("feat", "PREREQFEAT1", "feat")], &tables);

        assert_eq!(report.total_relationships, 1);
        assert_eq!(report.valid_relationships, 0);
        assert_eq!(report.broken_count, 1);
        assert_eq!(
            report.broken_references,
            vec![BrokenReference {
                table: "feat".to_string(),
                column: "PREREQFEAT1".to_string(),
                row: 1,
                value: "42".to_string(),
            }]
        );
    }

    #[test]
    fn test_no_reference_marker_is_exempt() {
        let tables = table_set(&[(
            "feat",
            "2DA V2.0\n\n LABEL PREREQFEAT1\n0 Alertness -1\n1 Cleave ****\n",
        )]);
        let report =
            Validator::new(true, 100).validate(&[lookup("feat", "PREREQFEAT1", "feat")], &tables);
        assert!(report.is_clean());
        assert_eq!(report.valid_relationships, 1);
    }

    #[test]
    fn test_strict_mode_rejects_text_values() {
        let tables = table_set(&[
            ("skills", "2DA V2.0\n\n Label\n0 Hide\n"),
            ("feat", "2DA V2.0\n\n LABEL ReqSkill\n0 Stealthy Hide\n1 Quiet 0\n"),
        ]);
        let edges = [lookup("feat", "ReqSkill", "skills")];

        let lenient = Validator::new(false, 100).validate(&edges, &tables);
        assert!(lenient.is_clean());

        let strict = Validator::new(true, 100).validate(&edges, &tables);
        assert_eq!(strict.broken_count, 1);
        assert_eq!(strict.broken_references[0].value, "Hide");
        assert_eq!(strict.broken_references[0].row, 0);
    }

    #[test]
    fn test_missing_target_tables() {
        let tables = table_set(&[(
            "feat",
            "2DA V2.0\n\n LABEL ReqSkill SpellID\n0 Alertness 3 5\n",
        )]);
        let edges = [
            lookup("feat", "ReqSkill", "skills"),
            lookup("feat", "SpellID", "spells"),
        ];
        let report = Validator::new(false, 100).validate(&edges, &tables);

        assert_eq!(report.total_relationships, 2);
        assert_eq!(report.valid_relationships, 0);
        assert_eq!(report.broken_count, 0);
        assert_eq!(
            report.missing_tables.into_iter().collect::<Vec<_>>(),
            vec!["skills", "spells"]
        );
    }

    #[test]
    fn test_load_order_chain_and_cycle() {
        let chain = [lookup("a", "B_ID", "b"), lookup("b", "C_ID", "c")];
        assert_eq!(load_order(["a", "b", "c"], &chain), vec!["c", "b", "a"]);

        let cycle = [
            lookup("a", "B_ID", "b"),
            lookup("b", "A_ID", "a"),
            lookup("d", "C_ID", "c"),
        ];
        let order = load_order(["d", "c", "b", "a"], &cycle);
        assert_eq!(order, vec!["c", "d", "a", "b"]);
    }

    #[test]
    fn test_graph_over_corpus() {
        let tables = corpus();
        let edges = RelationshipDetector::new(50).detect(&tables);
        let graph = RelationshipGraph::new(tables.keys().map(String::as_str), &edges);

        // Four loaded tables plus two referenced but absent.
        assert_eq!(graph.node_count(), 6);
        assert_eq!(graph.edge_count(), edges.len());
        assert_eq!(
            graph.dependencies("classes"),
            vec!["cls_feat_barb", "cls_skill_barb", "cls_skill_bard"]
        );
        assert_eq!(graph.dependents("classes"), vec!["packages"]);

        let dot = graph.to_dot();
        assert!(dot.starts_with("digraph"));
        assert!(dot.contains("label=\"PREREQFEAT1\", style=solid"));
        assert!(dot.contains("label=\"SkillsTable\", style=dashed"));
        assert!(dot.contains("label=\"cls_feat_barb\", style=dashed"));
    }

    #[test]
    fn test_results_persist_across_runs() {
        let dir = TempDir::new().unwrap();
        let tables = corpus();
        let edges = RelationshipDetector::new(50).detect(&tables);
        let report = Validator::new(false, 2).validate(&edges, &tables);
        let shape = |tables: &TableSet| {
            RelationshipCache::fingerprint(tables.iter().map(|(name, table)| {
                (name.as_str(), table.schema().original_names())
            }))
            .unwrap()
        };
        let fingerprint = shape(&tables);

        RelationshipCache::open(dir.path(), 2)
            .unwrap()
            .put(&fingerprint, &edges, &report)
            .unwrap();
        assert!(dir.path().join(RELATIONSHIP_DB).exists());

        let cache = RelationshipCache::open(dir.path(), 2).unwrap();
        let cached = cache.get(&fingerprint).unwrap().expect("stored results");
        assert_eq!(cached.edges, edges);
        let stored = cached.report.unwrap();
        assert_eq!(stored.broken_references.len(), 2);
        assert_eq!(stored.broken_count, 3);

        // A new column changes the shape.
        let mut grown = tables.clone();
        grown.extend(table_set(&[("feat", "2DA V2.0\n\n LABEL PREREQFEAT1 Extra\n0 A 0 x\n")]));
        assert_ne!(shape(&grown), fingerprint);
        assert!(cache.get(&shape(&grown)).unwrap().is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!(stats.stored_bytes > 0);
    }
}
