use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use rarekb_loader::app::{App, AppSettings, ProgressEvent, ProgressSink, RunOptions};
use rarekb_loader::destination::{DestinationStore, SqliteDestination};
use rarekb_loader::domain::Namespace;
use rarekb_loader::error::LoaderError;
use rarekb_loader::fields::FieldMap;
use rarekb_loader::loader::LoadSettings;
use rarekb_loader::output::JsonOutput;
use rarekb_loader::reconcile::MatchPath;
use rarekb_loader::report::RunMode;
use rarekb_loader::source::TsvSource;

const ANNOTATIONS: &str = "#date: 2024-04-26\n\
    database_id\thpo_id\tevidence\tfrequency\n\
    ORPHA:558\tHP:0001166\tTAS\tHP:0040281\n\
    OMIM:154700\tHP:0001519\tpcs\t3/5\n\
    OMIM:999999\tHP:0001166\tIEA\t\n\
    ORPHA:558\tHP:0000001\tTAS\t\n";

const CROSS_REFERENCES: &str = "omim_code\torpha_code\n154700\tORPHA:558\n";

#[derive(Default)]
struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.messages.lock().unwrap().push(event.message);
    }
}

struct Fixture {
    _temp: tempfile::TempDir,
    associations: Utf8PathBuf,
    cross_references: Utf8PathBuf,
    destination: Utf8PathBuf,
}

fn fixture(annotations: &str) -> Fixture {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let associations = root.join("phenotype.hpoa");
    let cross_references = root.join("orpha_omim.tsv");
    let destination = root.join("kb.sqlite");
    std::fs::write(&associations, annotations).unwrap();
    std::fs::write(&cross_references, CROSS_REFERENCES).unwrap();

    let store = SqliteDestination::open(&destination).unwrap();
    store.init_schema().unwrap();
    store.add_disease("558", Some("Marfan syndrome")).unwrap();
    store.add_hpo_term("HP:0001166", Some("Arachnodactyly")).unwrap();
    store.add_hpo_term("HP:0001519", Some("Disproportionate tall stature")).unwrap();
    store.close().unwrap();

    Fixture {
        _temp: temp,
        associations,
        cross_references,
        destination,
    }
}

fn settings() -> AppSettings {
    AppSettings {
        source_label: "tsv:phenotype.hpoa".to_string(),
        destination_label: "kb.sqlite".to_string(),
        fields: FieldMap::default(),
        numeric_fallback: false,
        load: LoadSettings {
            batch_size: 2,
            ..LoadSettings::default()
        },
    }
}

fn app(fixture: &Fixture) -> App<TsvSource, SqliteDestination> {
    let source = TsvSource::new(
        fixture.associations.clone(),
        Some(fixture.cross_references.clone()),
    );
    let destination = SqliteDestination::open(&fixture.destination).unwrap();
    App::new(source, destination, settings())
}

#[test]
fn load_reconciles_and_reports() {
    let fixture = fixture(ANNOTATIONS);
    let mut app = app(&fixture);
    let sink = RecordingSink::default();

    let report = app.load(RunOptions::default(), &sink).unwrap();

    assert_eq!(report.mode, RunMode::Load);
    assert_eq!(report.stats.total_seen, 4);
    assert_eq!(report.stats.inserted, 2);
    assert_eq!(report.stats.skipped_missing_left, 1);
    assert_eq!(report.stats.skipped_missing_right, 1);
    assert!(report.stats.is_balanced());
    assert!(!report.has_errors());
    assert_eq!(report.counters["imported"], 2);
    assert_eq!(report.map.omim_codes, 1);
    assert_eq!(report.unresolved_diseases, vec!["OMIM:999999".to_string()]);
    assert_eq!(report.unresolved_phenotypes, vec!["HP:0000001".to_string()]);

    let messages = sink.messages.lock().unwrap();
    assert!(messages.iter().any(|m| m.starts_with("phase=Reconcile")));
    assert!(messages.iter().any(|m| m.starts_with("phase=Load")));

    let (_, destination) = app.into_parts();
    let rows = destination.associations().unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row.disease_id == rows[0].disease_id));
    assert!(
        rows.iter()
            .any(|row| row.evidence.as_deref() == Some("PCS")
                && row.frequency.as_deref() == Some("3/5"))
    );
}

#[test]
fn second_run_changes_nothing() {
    let fixture = fixture(ANNOTATIONS);

    let first = app(&fixture).load(RunOptions::default(), &JsonOutput).unwrap();
    let before = SqliteDestination::open(&fixture.destination)
        .unwrap()
        .associations()
        .unwrap();

    let second = app(&fixture).load(RunOptions::default(), &JsonOutput).unwrap();
    let after = SqliteDestination::open(&fixture.destination)
        .unwrap()
        .associations()
        .unwrap();

    assert_eq!(before, after);
    assert_eq!(second.stats.inserted, 0);
    assert_eq!(second.stats.duplicates, first.stats.inserted);
    assert_eq!(second.stats.imported(), first.stats.imported());
}

#[test]
fn placeholders_make_unmapped_rows_load() {
    let fixture = fixture(ANNOTATIONS);
    let options = RunOptions {
        create_placeholders: Some(true),
        ..RunOptions::default()
    };

    let report = app(&fixture).load(options, &JsonOutput).unwrap();
    assert_eq!(report.stats.inserted, 3);
    assert_eq!(report.stats.placeholders_created, 1);

    let mut rerun = app(&fixture);
    let lookup = rerun
        .lookup("OMIM:999999", None, &JsonOutput)
        .unwrap();
    assert_eq!(lookup.matched_by, Some(MatchPath::Placeholder));

    let report = rerun.load(RunOptions::default(), &JsonOutput).unwrap();
    assert_eq!(report.stats.placeholders_created, 0);
    assert_eq!(report.stats.duplicates, 3);
}

#[test]
fn audit_writes_nothing() {
    let fixture = fixture(ANNOTATIONS);
    let options = RunOptions {
        dry_run: true,
        create_placeholders: Some(true),
        ..RunOptions::default()
    };

    let report = app(&fixture).load(options, &JsonOutput).unwrap();
    assert_eq!(report.mode, RunMode::Audit);
    assert_eq!(report.stats.inserted, 2);

    let destination = SqliteDestination::open(&fixture.destination).unwrap();
    assert_eq!(destination.count_associations().unwrap(), 0);
    assert_eq!(destination.load_diseases().unwrap().len(), 1);
}

#[test]
fn lookup_reports_match_path() {
    let fixture = fixture(ANNOTATIONS);
    let mut app = app(&fixture);

    let omim = app.lookup("154700", Some(Namespace::Omim), &JsonOutput).unwrap();
    assert_eq!(omim.normalized, "OMIM:154700");
    assert_eq!(omim.matched_by, Some(MatchPath::CrossReference));

    let orpha = app.lookup("ORPHA:558", None, &JsonOutput).unwrap();
    assert_eq!(orpha.destination_id, omim.destination_id);
    assert_eq!(orpha.matched_by, Some(MatchPath::Direct));

    let hpo = app.lookup("hp:0001519", None, &JsonOutput).unwrap();
    assert_eq!(hpo.namespace, Namespace::Hpo);
    assert!(hpo.destination_id.is_some());

    let unknown = app.lookup("ORPHA:1", None, &JsonOutput).unwrap();
    assert_eq!(unknown.destination_id, None);
    assert_eq!(unknown.matched_by, None);
}

#[test]
fn missing_source_column_is_a_config_error() {
    let fixture = fixture("disease\tterm\nORPHA:558\tHP:0001166\n");
    let result = app(&fixture).load(RunOptions::default(), &JsonOutput);
    assert_matches!(
        result,
        Err(LoaderError::MissingColumn { field, .. }) if field == "phenotype"
    );
}

#[test]
fn empty_source_imports_nothing() {
    let fixture = fixture("#no rows\n");
    let report = app(&fixture).load(RunOptions::default(), &JsonOutput).unwrap();
    assert_eq!(report.stats.total_seen, 0);
    assert!(report.problems.is_empty());
}
