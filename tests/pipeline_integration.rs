// End-to-end: source file → clean → summarize → export → reload → seed → query

use std::fs;
use std::path::Path;

use urban_insights::schema::{self, source_headers};
use urban_insights::{
    aggregate_by_decade, clean, export_csv, export_spreadsheet, load, summarize, DatasetKind,
    MissingPolicy, PipelineError, SeedOutcome, Store, StoreQuery, Value,
};

fn quoted_header(headers: &[&str]) -> String {
    headers
        .iter()
        .map(|h| format!("\"{}\"", h))
        .collect::<Vec<_>>()
        .join(",")
}

fn write_trends(path: &Path) {
    let header = quoted_header(&[
        source_headers::TIME,
        "Time Code",
        source_headers::COUNTRY_NAME,
        "Country Code",
        source_headers::URBAN_POPULATION,
        source_headers::UNEMPLOYMENT_RATE,
        source_headers::INTERNET_USERS,
    ]);
    let body = "1991,YR1991,South Africa,ZAF,52.0,..,0.0\n\
                1995,YR1995,South Africa,ZAF,54.1,16.9,0.7\n\
                1995,YR1995,South Africa,ZAF,54.1,16.9,0.7\n\
                2005,YR2005,South Africa,ZAF,59.3,23.8,7.5\n\
                2015,YR2015,South Africa,ZAF,64.8,25.2,51.9\n\
                2020,YR2020,South Africa,ZAF,67.4,29.2,70.0\n\
                \n\
                Data from database: World Development Indicators,,,,,,\n";
    fs::write(path, format!("{}\n{}", header, body)).unwrap();
}

fn write_social(path: &Path) {
    let header = quoted_header(&[
        source_headers::TIME,
        source_headers::COUNTRY_NAME,
        source_headers::SECONDARY_ENROLLMENT,
        source_headers::GINI_INDEX,
        source_headers::FEMALE_LABOR_PARTICIPATION,
    ]);
    let body = "2000,South Africa,60.0,57.8,40.0\n\
                2005,South Africa,62.0,..,44.0\n\
                2010,South Africa,..,63.4,45.0\n\
                2014,South Africa,..,..,..\n";
    fs::write(path, format!("{}\n{}", header, body)).unwrap();
}

#[test]
fn trends_pipeline_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("datasets.csv");
    write_trends(&source);

    let schema = schema::DatasetSchema::trends();
    let raw = load(&source).unwrap();
    let cleaned = clean(&raw, &schema.cleaning);

    // Duplicate 1995 row, the 1991 row with no unemployment figure, and the
    // blank/footer lines are all gone
    let table = cleaned.ensure_rows().unwrap();
    assert_eq!(table.len(), 4);
    assert_eq!(cleaned.report.duplicates_removed, 1);
    assert!(table.has_column(schema::YEAR));
    assert!(table.has_column(schema::COUNTRY));
    assert!(table.has_column("Country Code"));
    assert_eq!(table.get(0, schema::YEAR), Some(&Value::Integer(1995)));

    let numeric = schema.numeric_columns();
    let summary = summarize(table, &numeric).unwrap();
    let internet = summary.column(schema::INTERNET_USERS).unwrap();
    assert_eq!(internet.count, 4);
    assert!((internet.max - 70.0).abs() < 1e-9);
    let r = summary
        .correlation_between(schema::URBAN_POPULATION, schema::INTERNET_USERS)
        .unwrap();
    assert!(r > 0.9);

    let decades = aggregate_by_decade(table, schema::YEAR, &numeric).unwrap();
    let decade_keys: Vec<i64> = decades.rows.iter().map(|d| d.decade).collect();
    assert_eq!(decade_keys, vec![1990, 2000, 2010, 2020]);

    // Cleaning an exported table again changes nothing
    let exported = dir.path().join("trends_cleaned.csv");
    export_csv(table, &exported).unwrap();
    let reloaded = load(&exported).unwrap();
    let again = clean(&reloaded, &schema.cleaning);
    assert_eq!(&again.table, table);
    assert_eq!(again.report.rows_dropped, 0);

    let workbook = dir.path().join("trends_formatted.xlsx");
    let sheet = export_spreadsheet(table, &schema.format_rules, &workbook).unwrap();
    assert_eq!(sheet.rows, 4);
    assert!(sheet.flagged_cells() > 0);
    assert!(fs::metadata(&workbook).unwrap().len() > 0);

    // Seeding is a no-op the second time around
    let store = Store::new(dir.path().join("sa_trends.db"));
    match store.seed(&schema, table).unwrap() {
        SeedOutcome::Inserted { rows, .. } => assert_eq!(rows, 4),
        other => panic!("expected insert, got {:?}", other),
    }
    assert_eq!(
        store.seed(&schema, table).unwrap(),
        SeedOutcome::Skipped { existing: 4 }
    );
    assert_eq!(store.events().unwrap().len(), 1);

    let above = store
        .query(
            &schema.store,
            &StoreQuery::AboveThreshold {
                column: schema::UNEMPLOYMENT_RATE.to_string(),
                threshold: 25.0,
            },
        )
        .unwrap();
    assert_eq!(above.len(), 2);

    let by_decade = store.query(&schema.store, &StoreQuery::ByDecade).unwrap();
    assert_eq!(by_decade.len(), 4);
}

#[test]
fn social_pipeline_fills_gaps() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("dataset2.csv");
    write_social(&source);

    let schema = DatasetKind::Social.schema();
    let cleaned = clean(&load(&source).unwrap(), &schema.cleaning);
    let table = cleaned.ensure_rows().unwrap();

    // The all-empty 2014 row goes, the rest are filled with column means
    assert_eq!(table.len(), 3);
    assert_eq!(cleaned.report.empty_rows_dropped, 1);
    for column in schema.numeric_columns() {
        assert_eq!(table.missing_count(column), 0, "{} still has gaps", column);
    }
    let gini = table.get(1, schema::GINI_INDEX).and_then(Value::as_f64).unwrap();
    assert!((gini - 60.6).abs() < 1e-9);

    // The same file under the drop policy keeps only the complete row
    let strict = schema.cleaning.clone().with_policy(MissingPolicy::DropMissing);
    let dropped = clean(&load(&source).unwrap(), &strict);
    assert_eq!(dropped.table.len(), 1);
}

#[test]
fn missing_source_and_unreachable_store() {
    let dir = tempfile::tempdir().unwrap();

    let err = load(&dir.path().join("nope.csv")).unwrap_err();
    assert!(matches!(err, PipelineError::FileNotFound { .. }));

    let store = Store::new(dir.path().join("missing").join("sa_trends.db"));
    let err = store
        .query(&DatasetKind::Trends.schema().store, &StoreQuery::Averages)
        .unwrap_err();
    assert!(err.is_store_unavailable());
}
