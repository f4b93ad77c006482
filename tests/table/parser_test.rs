#[cfg(test)]
mod tests {
    use tessera::table::{codec, Cell, ParseError, TableData};

    const CLASSES: &str = "\
2DA V2.0
DEFAULT: ****

        Label       Name    HitDie  SkillsTable        Description
0       Fighter     111     10      cls_skill_fight    269
1       \"Arcane Archer\" 112 8  cls_skill_arcarch   ****
2       ****        ****    ****    ****               ****
";

    #[test]
    fn test_parse_header_and_rows() {
        let table = TableData::parse("classes", CLASSES.as_bytes()).unwrap();
        assert_eq!(table.name(), "classes");
        assert_eq!(
            table.columns(),
            &["Label", "Name", "HitDie", "SkillsTable", "Description"]
        );
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.default_value(), Some("****"));

        assert_eq!(table.cell(0, 0), Some(&Cell::Text("Fighter".to_string())));
        assert_eq!(table.cell(0, 2), Some(&Cell::Int(10)));
        assert_eq!(table.cell(1, 0), Some(&Cell::Text("Arcane Archer".to_string())));
        assert_eq!(table.cell(1, 4), Some(&Cell::Null));
        assert!(table.row(2).unwrap().iter().all(Cell::is_null));
    }

    #[test]
    fn test_case_insensitive_column_lookup() {
        let table = TableData::parse("classes", CLASSES.as_bytes()).unwrap();
        assert_eq!(table.column_index("hitdie"), Some(2));
        assert_eq!(table.column_index("SKILLSTABLE"), Some(3));
        assert_eq!(table.column_index("missing"), None);
    }

    #[test]
    fn test_short_rows_padded_long_rows_counted() {
        let text = "2DA V2.0\n\n A B\n0 1\n1 1 2 3\n";
        let table = TableData::parse("t", text.as_bytes()).unwrap();
        assert_eq!(table.row(0).unwrap(), &[Cell::Int(1), Cell::Null]);
        assert_eq!(table.row(1).unwrap(), &[Cell::Int(1), Cell::Int(2)]);
        assert_eq!(table.ragged_rows(), 1);
    }

    #[test]
    fn test_canonical_integers_only() {
        assert_eq!(Cell::parse("12"), Cell::Int(12));
        assert_eq!(Cell::parse("-3"), Cell::Int(-3));
        assert_eq!(Cell::parse("012"), Cell::Text("012".to_string()));
        assert_eq!(Cell::parse("0x10"), Cell::Text("0x10".to_string()));
        assert_eq!(Cell::parse("0x10").as_i64(), Some(16));
        assert_eq!(Cell::parse("****"), Cell::Null);
    }

    #[test]
    fn test_bom_and_crlf() {
        let text = "\u{feff}2DA V2.0\r\n\r\n Label\r\n0 Fighter\r\n";
        let table = TableData::parse("classes", text.as_bytes()).unwrap();
        assert_eq!(table.columns(), &["Label"]);
        assert_eq!(table.cell(0, 0), Some(&Cell::Text("Fighter".to_string())));
    }

    #[test]
    fn test_malformed_inputs() {
        assert!(matches!(
            TableData::parse("t", b""),
            Err(ParseError::Empty { .. })
        ));
        assert!(matches!(
            TableData::parse("t", b"2DA V1.0\n\nA\n"),
            Err(ParseError::BadSignature { .. })
        ));
        assert!(matches!(
            TableData::parse("t", b"2DA V2.0\n\n"),
            Err(ParseError::MissingHeader { .. })
        ));
        assert!(matches!(
            TableData::parse("t", b"2DA V2.0\n\n A\n0 \"open\n"),
            Err(ParseError::UnterminatedQuote { line: 4, .. })
        ));
    }

    #[test]
    fn test_render_reparses_to_same_table() {
        let table = TableData::parse("classes", CLASSES.as_bytes()).unwrap();
        let rendered = table.to_2da_string();
        let again = TableData::parse("classes", rendered.as_bytes()).unwrap();
        assert_eq!(again, table);
    }

    #[test]
    fn test_codec_preserves_table() {
        let table = TableData::parse("classes", CLASSES.as_bytes()).unwrap();
        let bytes = codec::encode(&table).unwrap();
        assert_eq!(codec::decode(&bytes).unwrap(), table);
    }

    #[test]
    fn test_codec_fails_closed() {
        let table = TableData::parse("classes", CLASSES.as_bytes()).unwrap();
        let bytes = codec::encode(&table).unwrap();

        let mut flipped = bytes.clone();
        let mid = flipped.len() / 2;
        flipped[mid] ^= 0xff;
        assert!(codec::decode(&flipped).is_err());

        assert!(codec::decode(&bytes[..bytes.len() - 1]).is_err());
        assert!(codec::decode(b"TSRT").is_err());
        assert!(codec::decode(b"{\"name\":\"classes\"}").is_err());

        let mut extended = bytes;
        extended.push(0);
        assert!(codec::decode(&extended).is_err());
    }
}
