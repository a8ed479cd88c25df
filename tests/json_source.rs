use data_cruncher::processing::{Query, Rule, Statistics, Tally};
use data_cruncher::sources::{generate_path, DataSource, JsonFile, JsonLayout, OpenMode, Rows};
use data_cruncher::types::Value;
use data_cruncher::CruncherError;

#[test]
fn ndjson_flattens_nested_objects() {
    let mut src = JsonFile::reader("tests/fixtures/people.ndjson");
    src.open().unwrap();
    let rows = Rows::new(&mut src).collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(rows.len(), 4);
    assert_eq!(
        rows[0].field_names().collect::<Vec<_>>(),
        vec!["name", "age", "contact.phone", "contact.email"]
    );
    assert_eq!(rows[1].get("age"), Some(&Value::Int64(35)));
    src.close().unwrap();
}

#[test]
fn document_records_at_dot_path() {
    let mut src = JsonFile::reader("tests/fixtures/people_document.json").with_records_at("data.people");
    src.open().unwrap();
    let rows = Rows::new(&mut src).collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].get("tags"), Some(&Value::from(r#"["admin","ops"]"#)));
    assert_eq!(rows[2].get("age"), Some(&Value::Float64(15.5)));

    src.reset().unwrap();
    assert_eq!(Rows::new(&mut src).count(), 3);
    src.close().unwrap();
}

#[test]
fn missing_record_path_is_unreadable() {
    let mut src = JsonFile::reader("tests/fixtures/people_document.json")
        .with_layout(JsonLayout::Document {
            records: Some("data.customers".to_string()),
        });
    let err = src.open().unwrap_err();
    assert!(matches!(err, CruncherError::SourceNotReadable { .. }));
    assert!(!src.is_open());
}

#[test]
fn query_over_ndjson_uses_dotted_fields() {
    let mut src = generate_path("tests/fixtures/people.ndjson", None, OpenMode::Read).unwrap();
    let out = Query::new()
        .from_source(src.as_mut())
        .select(["name"])
        .unwrap()
        .condition("CONTAINS")
        .unwrap()
        .where_field("contact.phone")
        .value("samsung")
        .execute(None, None)
        .unwrap()
        .into_data();
    let names: Vec<_> = out
        .rows()
        .unwrap()
        .iter()
        .map(|r| r.get("name").unwrap().as_text().into_owned())
        .collect();
    assert_eq!(names, vec!["matthew", "tony"]);
}

#[test]
fn statistics_over_typed_json_values() {
    let mut src = JsonFile::reader("tests/fixtures/people.ndjson");
    let out = Statistics::new()
        .from_source(&mut src)
        .add_rule(Rule::new("age").group_numeric(20.0).unwrap())
        .execute(None)
        .unwrap()
        .into_data();
    let buckets = out.rule(0).unwrap();
    assert_eq!(buckets.get("20, 40"), Some(Tally::Count(3)));
    assert_eq!(buckets.get("0, 20"), Some(Tally::Count(1)));
}

#[test]
fn ndjson_sink_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("young.ndjson");

    let mut src = JsonFile::reader("tests/fixtures/people.ndjson");
    let mut sink = JsonFile::writer(&path);
    let out = Query::new()
        .from_source(&mut src)
        .select(["name", "age"])
        .unwrap()
        .condition("LESS")
        .unwrap()
        .where_field("age")
        .value("26")
        .execute(Some(&mut sink), None)
        .unwrap()
        .into_data();
    assert_eq!(out.written(), Some(2));
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "{\"name\":\"tony\",\"age\":25}\n{\"name\":\"john\",\"age\":15}\n"
    );
}
