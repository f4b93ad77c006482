#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tessera::relationships::{
        ColumnPurpose, ColumnPurposeProvider, Relationship, RelationshipDetector,
        RelationshipKind, TableSet,
    };
    use tessera::schema::{RecordBuilder, RecordTable, StringTable, Synthesizer};
    use tessera::table::TableData;

    const CLASSES: &str = "2DA V2.0\n\n\
        Label      Name  FeatsTable     SkillsTable\n\
        0 Barbarian  111  cls_feat_barb  cls_skill_barb\n\
        1 Bard       112  ****           CLS_SKILL_BARD.2da\n";

    const FEAT: &str = "2DA V2.0\n\n\
        LABEL  FEAT  PREREQFEAT1  PREREQFEAT2\n\
        0 Alertness      289  ****  ****\n\
        1 Ambidexterity  290  0     ****\n";

    const PACKAGES: &str = "2DA V2.0\n\n\
        Label  Class_ID  Skill_ID  Spell_ID\n\
        0 Barb  0  1  3\n";

    const SKILLS: &str = "2DA V2.0\n\n Label\n0 AnimalEmpathy\n1 Concentration\n";

    /// Parse and materialize every `(name, text)` pair with one synthesizer.
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

    fn rendered(edges: &[Relationship]) -> Vec<String> {
        edges.iter().map(|e| e.to_string()).collect()
    }

    #[test]
    fn test_rules_corpus_edges() {
        let tables = table_set(&[
            ("classes", CLASSES),
            ("feat", FEAT),
            ("packages", PACKAGES),
            ("skills", SKILLS),
        ]);
        let edges = RelationshipDetector::new(50).detect(&tables);

        assert_eq!(
            rendered(&edges),
            vec![
                "classes.FeatsTable ~> cls_feat_barb",
                "classes.SkillsTable ~> cls_skill_barb",
                "classes.SkillsTable ~> cls_skill_bard",
                "feat.PREREQFEAT1 -> feat",
                "packages.Class_ID -> classes",
                "packages.Skill_ID -> skills",
            ]
        );
    }

    #[test]
    fn test_prerequisite_self_reference() {
        let tables = table_set(&[("feat", FEAT)]);
        let edges = RelationshipDetector::new(50).detect(&tables);

        // PREREQFEAT2 holds only the null sentinel.
        assert_eq!(
            edges,
            vec![Relationship::new("feat", "PREREQFEAT1", "feat", RelationshipKind::Lookup)]
        );
    }

    #[test]
    fn test_id_suffix_needs_loaded_target() {
        let tables = table_set(&[("packages", PACKAGES)]);
        assert!(RelationshipDetector::new(50).detect(&tables).is_empty());

        let tables = table_set(&[("packages", PACKAGES), ("skills", SKILLS)]);
        assert_eq!(
            rendered(&RelationshipDetector::new(50).detect(&tables)),
            vec!["packages.Skill_ID -> skills"]
        );
    }

    #[test]
    fn test_detection_is_deterministic() {
        let sources = [("classes", CLASSES), ("feat", FEAT), ("packages", PACKAGES)];
        let detector = RelationshipDetector::new(50);
        let first = detector.detect(&table_set(&sources));
        let mut reversed = sources;
        reversed.reverse();
        assert_eq!(first, detector.detect(&table_set(&reversed)));
    }

    /// Declares the spell book column of `classes`.
    struct ClassColumns;

    impl ColumnPurposeProvider for ClassColumns {
        fn get_column_purpose(&self, table: &str, column: &str) -> Option<ColumnPurpose> {
            match (table, column) {
                ("classes", "SpellBook") => Some(ColumnPurpose::TableName),
                ("classes", "SkillsTable") => Some(ColumnPurpose::Plain),
                ("classes", "Primary") => Some(ColumnPurpose::Lookup {
                    target: "IPRP_ABILITIES.2da".to_string(),
                }),
                _ => None,
            }
        }
    }

    #[test]
    fn test_declared_purposes_override_names() {
        let tables = table_set(&[(
            "classes",
            "2DA V2.0\n\n Label SpellBook SkillsTable Primary\n\
             0 Wizard cls_spell_wiz cls_skill_wiz 3\n",
        )]);
        let edges = RelationshipDetector::new(50)
            .with_purposes(Arc::new(ClassColumns))
            .detect(&tables);

        assert_eq!(
            rendered(&edges),
            vec![
                "classes.Primary -> iprp_abilities",
                "classes.SpellBook ~> cls_spell_wiz",
            ]
        );
    }
}
