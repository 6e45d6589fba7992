//! End-to-end runs against a throwaway SQLite record store
//!
//! Each test builds an `assignments` table in a temp dir, points the
//! configuration at it and checks the files the pipeline leaves behind.

use rusqlite::{params, Connection};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};
use trialflow::anonymizer::derive_pseudonym;
use trialflow::error::StoreError;
use trialflow::{Config, ParticipantRecord, RecordSource, RunOptions};

const VERSION: &str = "1.0";

const DATASTRING: &str = r#"{
    "data": [
        {"current_trial": 0, "dateTime": 1700000000000, "trialdata": {"trial_type": "learn_rewards", "reward": 5}},
        {"current_trial": 1, "dateTime": 1700000001000, "trialdata": {"trial_type": "main", "rt": 812}}
    ],
    "eventdata": [
        {"eventtype": "initialized", "value": null, "interval": 0, "timestamp": 1700000000000}
    ],
    "questiondata": {}
}"#;

struct Fixture {
    dir: TempDir,
    db_path: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("participants.db");

        let conn = Connection::open(&db_path).unwrap();
        conn.execute(
            "CREATE TABLE assignments (
                uniqueid TEXT PRIMARY KEY,
                workerid TEXT,
                cond INTEGER,
                counterbalance INTEGER,
                codeversion TEXT,
                status INTEGER,
                datastring TEXT
            )",
            [],
        )
        .unwrap();

        Self { dir, db_path }
    }

    fn insert(&self, uniqueid: &str, datastring: &str) {
        let conn = Connection::open(&self.db_path).unwrap();
        conn.execute(
            "INSERT INTO assignments (uniqueid, workerid, cond, counterbalance, codeversion, status, datastring)
             VALUES (?1, ?2, 1, 0, ?3, 3, ?4)",
            params![uniqueid, uniqueid.split(':').next().unwrap(), VERSION, datastring],
        )
        .unwrap();
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn config_with_url(&self, database_url: &str) -> Config {
        let root = self.root().to_path_buf();
        let url = database_url.to_string();
        Config::from_lookup(move |name: &str| {
            let value = match name {
                "DATABASE_URL" => url.clone(),
                "TRIALFLOW_DATABASE_URL_CACHE" => root.join(".database_url").display().to_string(),
                "TRIALFLOW_DATA_ROOT" => root.join("data").display().to_string(),
                "TRIALFLOW_BONUS_PATH" => root.join("bonus.csv").display().to_string(),
                _ => return None,
            };
            Some(value)
        })
        .unwrap()
    }

    fn config(&self) -> Config {
        self.config_with_url(&format!("sqlite:///{}", self.db_path.display()))
    }

    fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.root().join(relative)).unwrap()
    }

    fn read_json(&self, relative: &str) -> Vec<Value> {
        serde_json::from_str(&self.read(relative)).unwrap()
    }
}

fn options(nofetch: bool) -> RunOptions {
    RunOptions {
        version: VERSION.to_string(),
        nofetch,
        include_debug_sessions: false,
    }
}

#[test]
fn test_two_participants_without_bonus() {
    let fx = Fixture::new();
    fx.insert("op1:s1", DATASTRING);
    fx.insert("op2:s1", DATASTRING);

    let summary = trialflow::run(&fx.config(), &options(false)).unwrap();

    let report = summary.aggregation.unwrap();
    assert_eq!(report.fetched, 2);
    assert_eq!(report.completed, 2);
    assert!(report.failures.is_empty());

    let w1 = derive_pseudonym("op1");
    let w2 = derive_pseudonym("op2");

    let trials = fx.read_json("data/human/1.0/trials.json");
    assert_eq!(trials.len(), 2);
    let wids: Vec<&str> = trials.iter().map(|t| t["wid"].as_str().unwrap()).collect();
    assert_eq!(wids, vec![w1.as_str(), w2.as_str()]);
    assert_eq!(trials[0]["rt"], 812);

    assert_eq!(fx.read_json("data/human/1.0/learn_rewards.json").len(), 2);
    assert!(fx.read_json("data/human/1.0/calibration.json").is_empty());
    assert_eq!(fx.read("data/human/1.0/survey.csv"), "");
    assert_eq!(fx.read("bonus.csv"), "");

    let identifiers = fx.read("data/human_raw/1.0/identifiers.csv");
    assert_eq!(
        identifiers,
        format!("workerid,wid\nop1,{}\nop2,{}\n", w1, w2)
    );

    let participants = fx.read("data/human/1.0/participants.csv");
    assert_eq!(
        participants,
        format!(
            "wid,condition,counterbalance,status\n{},1,0,3\n{},1,0,3\n",
            w1, w2
        )
    );
}

#[test]
fn test_raw_exports_carry_no_operator_ids() {
    let fx = Fixture::new();
    fx.insert("op1:s1", DATASTRING);
    fx.insert("op2:s1", DATASTRING);

    trialflow::run(&fx.config(), &options(false)).unwrap();

    for file in ["trialdata.csv", "eventdata.csv", "questiondata.csv"] {
        let body = fx.read(&format!("data/human_raw/1.0/{}", file));
        assert!(!body.is_empty(), "{} should have rows", file);
        assert!(!body.contains("op1"), "{} leaks an operator id", file);
        assert!(!body.contains("op2"), "{} leaks an operator id", file);
    }
}

#[test]
fn test_bonus_uses_real_operator_ids() {
    let fx = Fixture::new();
    fx.insert("op1:s1", &DATASTRING.replace(r#""questiondata": {}"#, r#""questiondata": {"bonus": "1.25"}"#));
    fx.insert("op2:s1", DATASTRING);

    let summary = trialflow::run(&fx.config(), &options(false)).unwrap();

    assert_eq!(summary.reshape.bonuses, 1);
    assert_eq!(fx.read("bonus.csv"), "op1,1.25\n");
}

#[test]
fn test_rerun_is_byte_identical() {
    let fx = Fixture::new();
    fx.insert("op1:s1", DATASTRING);
    fx.insert("op2:s1", DATASTRING);
    let config = fx.config();

    trialflow::run(&config, &options(false)).unwrap();
    let first_ids = fx.read("data/human_raw/1.0/identifiers.csv");
    let first_trials = fx.read("data/human_raw/1.0/trialdata.csv");
    let first_wide = fx.read("data/human/1.0/participants.csv");

    trialflow::run(&config, &options(false)).unwrap();
    assert_eq!(fx.read("data/human_raw/1.0/identifiers.csv"), first_ids);
    assert_eq!(fx.read("data/human_raw/1.0/trialdata.csv"), first_trials);
    assert_eq!(fx.read("data/human/1.0/participants.csv"), first_wide);
}

#[test]
fn test_nofetch_reshapes_existing_raw_exports() {
    let fx = Fixture::new();
    fx.insert("op1:s1", DATASTRING);
    trialflow::run(&fx.config(), &options(false)).unwrap();

    fs::remove_dir_all(fx.root().join("data/human")).unwrap();
    fs::remove_file(&fx.db_path).unwrap();

    let summary = trialflow::run(&fx.config(), &options(true)).unwrap();

    assert!(summary.aggregation.is_none());
    assert_eq!(fx.read_json("data/human/1.0/trials.json").len(), 1);
}

#[test]
fn test_debug_sessions_dropped_by_default() {
    let fx = Fixture::new();
    fx.insert("op1:s1", DATASTRING);
    fx.insert("debugABC:debug1", DATASTRING);

    let summary = trialflow::run(&fx.config(), &options(false)).unwrap();

    let report = summary.aggregation.unwrap();
    assert_eq!(report.debug_dropped, 1);
    assert_eq!(
        fx.read("data/human_raw/1.0/identifiers.csv"),
        format!("workerid,wid\nop1,{}\n", derive_pseudonym("op1"))
    );
}

#[test]
fn test_unreachable_store_clears_cached_location() {
    let fx = Fixture::new();
    let missing = fx.root().join("nowhere/absent.db");
    let config = fx.config_with_url(&format!("sqlite:///{}", missing.display()));

    let err = trialflow::run(&config, &options(false)).unwrap_err();

    assert!(err.is_store_unavailable());
    assert!(!config.database_url_cache.exists());
    assert!(!fx.root().join("data/human_raw/1.0/identifiers.csv").exists());
}

#[test]
fn test_wrong_store_schema_clears_cached_location() {
    let fx = Fixture::new();
    let other = fx.root().join("other.db");
    Connection::open(&other)
        .unwrap()
        .execute("CREATE TABLE assignments (uniqueid TEXT PRIMARY KEY)", [])
        .unwrap();
    let config = fx.config_with_url(&format!("sqlite:///{}", other.display()));

    let err = trialflow::run(&config, &options(false)).unwrap_err();

    assert!(err.is_store_unavailable());
    assert!(!config.database_url_cache.exists());
}

struct InMemorySource(Vec<ParticipantRecord>);

impl RecordSource for InMemorySource {
    fn fetch(&self, version: &str) -> Result<Vec<ParticipantRecord>, StoreError> {
        assert_eq!(version, VERSION);
        Ok(self.0.clone())
    }

    fn backend_type(&self) -> &'static str {
        "in-memory"
    }
}

fn participant(id: &str, datastring: &str) -> ParticipantRecord {
    ParticipantRecord {
        id: id.to_string(),
        completion_status: 3,
        condition: Some(0),
        counterbalance: Some(1),
        datastring: Some(datastring.to_string()),
    }
}

#[test]
fn test_run_with_custom_source() {
    let fx = Fixture::new();
    let config = fx.config();
    let source = InMemorySource(vec![
        participant("op1:s1", DATASTRING),
        participant("op2:s1", DATASTRING),
        participant("op3:s1", r#"{"data": [5], "eventdata": [], "questiondata": {}}"#),
    ]);

    let summary = trialflow::run_with_source(&config, &options(false), &source).unwrap();

    let report = summary.aggregation.unwrap();
    assert_eq!(report.fetched, 3);
    // op3's trial log is broken; its question rows still count
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].record_id, "op3:s1");
    assert_eq!(summary.reshape.participants, 3);

    assert_eq!(
        fx.read("data/human_raw/1.0/identifiers.csv"),
        format!(
            "workerid,wid\nop1,{}\nop2,{}\nop3,{}\n",
            derive_pseudonym("op1"),
            derive_pseudonym("op2"),
            derive_pseudonym("op3")
        )
    );
    assert_eq!(fx.read_json("data/human/1.0/trials.json").len(), 2);
    assert!(!config.database_url_cache.exists());
}
