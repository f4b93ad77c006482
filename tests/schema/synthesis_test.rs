#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tessera::schema::{
        FieldError, KeyMode, Record, RecordBuilder, RecordTable, StringTable, Synthesizer,
        TableView,
    };
    use tessera::table::{Cell, TableData};

    fn feat() -> TableData {
        TableData::parse(
            "feat",
            b"2DA V2.0\n\n LABEL  FEAT  DESCRIPTION  PREREQFEAT1  MOD-COLUMN  MOD_COLUMN  type\n\
              0 Alertness 289 446 **** a b 1\n\
              1 Ambidexterity 290 447 0 c d 2\n",
        )
        .unwrap()
    }

    #[test]
    fn test_schema_shape() {
        let table = feat();
        let schema = Synthesizer::new().synthesize(table.name(), table.columns());

        assert_eq!(schema.type_name(), "Feat");
        assert_eq!(
            schema.field_names(),
            vec![
                "LABEL",
                "FEAT",
                "DESCRIPTION",
                "PREREQFEAT1",
                "MOD_COLUMN",
                "MOD_COLUMN_2",
                "type_"
            ]
        );
        assert_eq!(schema.original_names()[4], "MOD-COLUMN");
        assert_eq!(schema.localized_fields(), vec![0, 2]);
    }

    #[test]
    fn test_field_access_by_any_name() {
        let table = feat();
        let strings = StringTable::new();
        let schema = Synthesizer::new().synthesize(table.name(), table.columns());
        let records = RecordBuilder::new(schema, table.columns(), &strings).build_all(&table);

        let record = &records[1];
        assert_eq!(record.get_str("LABEL").unwrap().as_deref(), Some("Ambidexterity"));
        assert_eq!(record.get_str("label").unwrap().as_deref(), Some("Ambidexterity"));
        assert_eq!(record.get_i64("PrereqFeat1").unwrap(), Some(0));
        assert_eq!(record.get_str("MOD-COLUMN").unwrap().as_deref(), Some("c"));
        assert_eq!(record.get_str("MOD_COLUMN_2").unwrap().as_deref(), Some("d"));
        assert_eq!(record.get_i64("type").unwrap(), Some(2));
        assert!(records[0].get("PREREQFEAT1").unwrap().is_null());
    }

    #[test]
    fn test_unknown_field_lists_valid_names() {
        let table = feat();
        let schema = Synthesizer::new().synthesize(table.name(), table.columns());
        let mut record = Record::from_pairs(schema, [("LABEL", "Alertness")]);

        let err = record.get("Spell").unwrap_err();
        let FieldError::UnknownField { field, valid, .. } = &err;
        assert_eq!(field, "Spell");
        assert_eq!(valid.len(), 7);
        assert!(err.to_string().contains("LABEL, FEAT, DESCRIPTION"));

        assert!(record.set("Spell", Cell::Int(1)).is_err());
        record.set("feat", Cell::Int(7)).unwrap();
        assert_eq!(record.get_i64("FEAT").unwrap(), Some(7));
    }

    #[test]
    fn test_round_trip_to_original_names() {
        let table = feat();
        let strings = StringTable::new();
        let schema = Synthesizer::new().synthesize(table.name(), table.columns());
        let builder = RecordBuilder::new(schema, table.columns(), &strings);

        for (idx, row) in table.rows().iter().enumerate() {
            let map = builder.build_row(row).to_map(KeyMode::Original);
            for (col, cell) in table.columns().iter().zip(row) {
                if !cell.is_null() {
                    assert_eq!(map.get(col), Some(cell), "row {} column {}", idx, col);
                }
            }
        }
    }

    #[test]
    fn test_duplicate_headers_keep_every_column() {
        let table = TableData::parse(
            "spells",
            b"2DA V2.0\n\n Label LABEL Label\n0 first second third\n",
        )
        .unwrap();
        let schema = Synthesizer::new().synthesize(table.name(), table.columns());
        assert_eq!(schema.field_names(), vec!["Label", "LABEL_2", "Label_3"]);

        let strings = StringTable::new();
        let records = RecordBuilder::new(Arc::clone(&schema), table.columns(), &strings)
            .build_all(&table);
        let values: Vec<String> = records[0].values().iter().map(|c| c.to_string()).collect();
        assert_eq!(values, vec!["first", "second", "third"]);
        assert_eq!(records[0].get_str("LABEL").unwrap().as_deref(), Some("second"));

        let rebuilt = Record::from_pairs(
            Arc::clone(&schema),
            [("Label", "first"), ("LABEL", "second"), ("Label", "third")],
        );
        assert_eq!(rebuilt, records[0]);
    }

    #[test]
    fn test_string_references_resolved_eagerly() {
        let table = feat();
        let strings = StringTable::with_resolver(Arc::new(|id: u32| match id {
            446 => Some("Alertness description".to_string()),
            _ => None,
        }));
        let schema = Synthesizer::new().synthesize(table.name(), table.columns());
        let records = RecordBuilder::new(schema, table.columns(), &strings).build_all(&table);

        assert_eq!(
            records[0].get_str("DESCRIPTION").unwrap().as_deref(),
            Some("Alertness description")
        );
        assert_eq!(records[0].string_ref("DESCRIPTION").unwrap(), Some(446));
        // Unresolved references keep their number.
        assert_eq!(records[1].get_i64("DESCRIPTION").unwrap(), Some(447));
        assert_eq!(records[1].string_ref("DESCRIPTION").unwrap(), Some(447));
        // FEAT is not a localized column.
        assert_eq!(records[0].string_ref("FEAT").unwrap(), None);
        assert_eq!(strings.len(), 2);
    }

    #[test]
    fn test_type_names_unique_per_run() {
        let synth = Synthesizer::new();
        let a = synth.synthesize("my-table", &["A".to_string()]);
        let b = synth.synthesize("my_table", &["A".to_string()]);
        let again = synth.synthesize("MY-TABLE.2da", &["A".to_string()]);

        assert_eq!(a.type_name(), "My_table");
        assert_eq!(b.type_name(), "My_table_2");
        assert_eq!(again.type_name(), "My_table");
    }

    #[test]
    fn test_descriptor_round_trip() {
        let table = feat();
        let synth = Synthesizer::new();
        let schema = synth.synthesize(table.name(), table.columns());
        let descriptor = schema.descriptor();

        let rebuilt = synth
            .from_descriptor(&descriptor, table.name(), table.columns())
            .unwrap();
        assert_eq!(rebuilt, schema);

        let mut other_columns = table.columns().to_vec();
        other_columns.push("Extra".to_string());
        assert!(synth
            .from_descriptor(&descriptor, table.name(), &other_columns)
            .is_err());
    }

    #[test]
    fn test_table_view_is_uniform() {
        let table = feat();
        let strings = StringTable::new();
        let schema = Synthesizer::new().synthesize(table.name(), table.columns());
        let records = RecordBuilder::new(Arc::clone(&schema), table.columns(), &strings)
            .build_all(&table);
        let view: Box<dyn TableView> = Box::new(RecordTable::new(schema, records, None));

        assert_eq!(view.name(), "feat");
        assert_eq!(view.columns()[0], "LABEL");
        assert_eq!(view.row_count(), 2);
        assert!(view.row(1).is_some());
        assert!(view.row(2).is_none());
    }
}
