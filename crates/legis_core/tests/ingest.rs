use legis_core::db::{Collection, Store};
use legis_core::fetch::{LocalFetcher, SourceKind};
use legis_core::ingest::Ingestor;
use legis_core::report::{MemorySink, Status};
use legis_core::schema::{Bill, Legislator, Roll};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const SESSION: u32 = 111;

const HR1: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<bill session="111" type="h" number="1" updated="2009-03-01T12:00:00-05:00">
  <state datetime="2009-02-17">ENACTED:SIGNED</state>
  <introduced datetime="2009-01-26"/>
  <titles>
    <title type="short" as="introduced">Recovery Act of 2009</title>
    <title type="short" as="enacted">American Recovery and Reinvestment Act of 2009</title>
    <title type="official" as="introduced">Making supplemental appropriations for job preservation.</title>
  </titles>
  <sponsor id="400031"/>
  <cosponsors>
    <cosponsor id="400032" joined="2009-01-27"/>
    <cosponsor id="400033" joined="2009-01-27" withdrawn="2009-01-28"/>
    <cosponsor id="499999" joined="2009-01-27"/>
  </cosponsors>
  <actions>
    <action datetime="2009-01-26"><text>Referred to the Committee on Appropriations.</text></action>
    <vote datetime="2009-01-28T19:05:00-05:00" where="h" type="vote" result="pass" how="roll" roll="46"><text>On passage Passed by recorded vote: 244 - 188.</text></vote>
    <vote datetime="2009-02-10T12:00:00-05:00" where="s" type="vote" result="pass" how="roll" roll="61"><text>Passed Senate with an amendment.</text></vote>
    <vote2 datetime="2009-02-13T15:30:00-05:00" where="s" type="vote2" result="pass" how="roll" roll="64"><text>Senate agreed to conference report.</text></vote2>
    <topresident datetime="2009-02-13"><text>Presented to President.</text></topresident>
    <enacted datetime="2009-02-17"><text>Became Public Law No: 111-5.</text></enacted>
  </actions>
  <subjects>
    <term name="Economics and public finance"/>
  </subjects>
  <summary>Making supplemental appropriations.</summary>
</bill>"#;

const S5: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<bill session="111" type="s" number="5">
  <state datetime="2009-01-06">REFERRED</state>
  <introduced datetime="2009-01-06"/>
  <titles>
    <title type="official" as="introduced">A bill to reform the health care system.</title>
  </titles>
  <sponsor id="400033"/>
  <cosponsors/>
  <actions>
    <action datetime="2009-01-06"><text>Read twice and referred to the Committee on Finance.</text></action>
  </actions>
</bill>"#;

/// Unknown type: no type code, so the record fails validation.
const UNKNOWN_TYPE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<bill session="111" type="x" number="9">
  <introduced datetime="2009-01-06"/>
  <actions/>
</bill>"#;

const ROLL_H46: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<roll where="house" session="111" year="2009" roll="46" datetime="2009-01-28T19:05:00-05:00">
  <type>On Passage</type>
  <question>On Passage: H R 1 Making supplemental appropriations</question>
  <required>QUORUM</required>
  <result>Passed</result>
  <bill session="111" type="h" number="1"/>
  <voter id="400031" vote="+" value="Yea" state="WI"/>
  <voter id="400032" vote="+" value="Yea" state="OH"/>
  <voter id="400033" vote="-" value="Nay" state="CA"/>
  <voter id="499999" vote="0" value="Not Voting" state="TX"/>
  <voter vote="P" value="Present" state="VACANT"/>
</roll>"#;

fn legislator(govtrack_id: &str, bioguide_id: &str, last_name: &str, party: &str) -> Legislator {
    Legislator {
        bioguide_id: bioguide_id.to_string(),
        govtrack_id: govtrack_id.to_string(),
        first_name: "Pat".to_string(),
        nickname: None,
        last_name: last_name.to_string(),
        name_suffix: None,
        title: Some("Rep".to_string()),
        state: "OH".to_string(),
        party: party.to_string(),
        district: Some("8".to_string()),
        chamber: Some("house".to_string()),
        in_office: true,
    }
}

struct Fixture {
    _dir: TempDir,
    data_dir: std::path::PathBuf,
    store: Store,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let store = Store::open(&dir.path().join("legis.db")).unwrap();
        for legislator in [
            legislator("400031", "O000001", "Obey", "D"),
            legislator("400032", "B000589", "Boehner", "R"),
            legislator("400033", "W000001", "Waxman", "D"),
        ] {
            store.upsert(&legislator).unwrap();
        }
        Self {
            _dir: dir,
            data_dir,
            store,
        }
    }

    fn write(&self, kind: SourceKind, filename: &str, contents: &str) {
        let dir = self.data_dir.join(SESSION.to_string()).join(kind.as_str());
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(filename), contents).unwrap();
    }

    fn fetcher(&self) -> LocalFetcher {
        LocalFetcher {
            data_dir: self.data_dir.clone(),
        }
    }

    fn lock_root(&self) -> &Path {
        &self.data_dir
    }
}

#[test]
fn bills_are_parsed_stored_and_reported() {
    let fixture = Fixture::new();
    fixture.write(SourceKind::Bills, "h1.xml", HR1);
    fixture.write(SourceKind::Bills, "s5.xml", S5);

    let sink = MemorySink::default();
    let fetcher = fixture.fetcher();
    let summary = Ingestor::new(&fixture.store, &fetcher, &sink).run(SourceKind::Bills, SESSION);

    assert_eq!(summary.count, 2);
    assert!(summary.aborted.is_none());
    assert!(summary.failed.is_empty());

    let bill: Bill = fixture.store.get("hr1-111").unwrap().unwrap();
    assert_eq!(bill.code, "hr1");
    assert_eq!(bill.chamber, "house");
    assert_eq!(bill.state, "ENACTED:SIGNED");
    assert_eq!(bill.short_title.as_deref(), Some("American Recovery and Reinvestment Act of 2009"));
    assert_eq!(bill.sponsor_id.as_deref(), Some("O000001"));
    assert_eq!(bill.cosponsor_ids, ["B000589"]);
    assert_eq!(bill.cosponsors_count, 1);
    assert_eq!(bill.keywords, ["Economics and public finance"]);
    assert_eq!(bill.votes_count, 3);
    assert_eq!(bill.votes[0].roll_id.as_deref(), Some("h46-2009"));
    assert_eq!(bill.introduced_at.as_deref(), Some("2009-01-26T00:00:00Z"));
    assert_eq!(bill.last_action_at.as_deref(), Some("2009-02-17T00:00:00Z"));
    assert_eq!(bill.timeline.house_result.as_deref(), Some("pass"));
    assert!(bill.timeline.passed);
    assert!(bill.timeline.enacted);
    assert!(!bill.timeline.awaiting_signature);

    let reports = sink.reports();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].status, Status::Success);
    assert_eq!(reports[0].source, "Bill");
    assert_eq!(reports[0].message, "Synced 2 bills for session #111.");
    assert_eq!(reports[0].metadata["count"], 2);

    assert_eq!(reports[1].status, Status::Warning);
    assert_eq!(reports[1].message, "Found 1 missing legislator ids, attached.");
    assert_eq!(
        reports[1].metadata["missing_ids"],
        serde_json::json!([{"id": "499999", "filename": "h1.xml"}])
    );
}

#[test]
fn rerunning_a_session_is_idempotent() {
    let fixture = Fixture::new();
    fixture.write(SourceKind::Bills, "h1.xml", HR1);
    fixture.write(SourceKind::Bills, "s5.xml", S5);
    let fetcher = fixture.fetcher();

    let sink = MemorySink::default();
    Ingestor::new(&fixture.store, &fetcher, &sink).run(SourceKind::Bills, SESSION);
    let first: Bill = fixture.store.get("hr1-111").unwrap().unwrap();

    let summary = Ingestor::new(&fixture.store, &fetcher, &sink).run(SourceKind::Bills, SESSION);
    let second: Bill = fixture.store.get("hr1-111").unwrap().unwrap();

    assert_eq!(summary.count, 2);
    assert_eq!(first, second);
    assert_eq!(fixture.store.count(Collection::Bills).unwrap(), 2);
}

#[test]
fn fetch_failure_reports_and_stops() {
    let fixture = Fixture::new();
    let sink = MemorySink::default();
    let fetcher = fixture.fetcher();

    let summary = Ingestor::new(&fixture.store, &fetcher, &sink).run(SourceKind::Rolls, SESSION);

    assert!(summary.aborted.is_some());
    assert_eq!(summary.count, 0);
    let reports = sink.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, Status::Failure);
    assert_eq!(reports[0].source, "Roll");
    assert_eq!(reports[0].message, "Couldn't sync roll calls for session #111.");
    assert_eq!(fixture.store.count(Collection::Rolls).unwrap(), 0);
}

#[test]
fn invalid_records_are_collected_and_the_run_continues() {
    let fixture = Fixture::new();
    fixture.write(SourceKind::Bills, "h1.xml", HR1);
    fixture.write(SourceKind::Bills, "s5.xml", S5);
    fixture.write(SourceKind::Bills, "x9.xml", UNKNOWN_TYPE);

    let sink = MemorySink::default();
    let fetcher = fixture.fetcher();
    let summary = Ingestor::new(&fixture.store, &fetcher, &sink).run(SourceKind::Bills, SESSION);

    assert_eq!(summary.count, 2);
    assert!(summary.aborted.is_none());
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].error_messages, ["type can't be blank"]);
    assert_eq!(summary.failed[0].attributes["filename"], "x9.xml");

    let failure = sink
        .reports()
        .into_iter()
        .find(|report| report.status == Status::Failure)
        .unwrap();
    assert_eq!(
        failure.message,
        "Failed to save 1 bills. Attached the failed records' attributes and errors."
    );
    assert_eq!(failure.metadata["count"], 1);
    assert_eq!(failure.metadata["last"]["error_messages"][0], "type can't be blank");
}

#[test]
fn malformed_file_aborts_but_keeps_earlier_records() {
    let fixture = Fixture::new();
    fixture.write(SourceKind::Bills, "h1.xml", HR1);
    fixture.write(SourceKind::Bills, "h2.xml", "<bill session=\"111\" type=\"h\"");
    fixture.write(SourceKind::Bills, "s5.xml", S5);

    let sink = MemorySink::default();
    let fetcher = fixture.fetcher();
    let summary = Ingestor::new(&fixture.store, &fetcher, &sink).run(SourceKind::Bills, SESSION);

    assert_eq!(summary.count, 1);
    assert!(summary.aborted.is_some());
    assert!(fixture.store.get::<Bill>("hr1-111").unwrap().is_some());
    assert!(fixture.store.get::<Bill>("s5-111").unwrap().is_none());

    let reports = sink.reports();
    let success = reports.iter().find(|report| report.status == Status::Success).unwrap();
    assert_eq!(success.message, "Synced 1 bills for session #111.");

    let exception = reports.last().unwrap();
    assert_eq!(exception.status, Status::Failure);
    assert_eq!(exception.message, "Exception while saving bills. Attached the error.");
    assert_eq!(exception.metadata["exception"]["file"], "h2.xml");
}

#[test]
fn rolls_carry_voters_breakdowns_and_the_bill_snapshot() {
    let fixture = Fixture::new();
    fixture.write(SourceKind::Bills, "h1.xml", HR1);
    fixture.write(SourceKind::Rolls, "h2009-46.xml", ROLL_H46);
    let fetcher = fixture.fetcher();

    let sink = MemorySink::default();
    Ingestor::new(&fixture.store, &fetcher, &sink).run(SourceKind::Bills, SESSION);

    let roll_sink = MemorySink::default();
    let summary = Ingestor::new(&fixture.store, &fetcher, &roll_sink).run(SourceKind::Rolls, SESSION);
    assert_eq!(summary.count, 1);

    let roll: Roll = fixture.store.get("h46-2009").unwrap().unwrap();
    assert_eq!(roll.chamber, "house");
    assert_eq!(roll.year, "2009");
    assert_eq!(roll.number, "46");
    assert_eq!(roll.session, "111");
    assert_eq!(roll.result, "Passed");
    assert_eq!(roll.bill_id.as_deref(), Some("hr1-111"));
    assert_eq!(roll.voted_at, "2009-01-29T00:05:00Z");
    assert_eq!(roll.voters.len(), 3);
    assert_eq!(roll.voter_ids[2].voter_id, "W000001");
    assert_eq!(roll.vote_breakdown["ayes"], 2);
    assert_eq!(roll.vote_breakdown["nays"], 1);
    assert_eq!(roll.vote_breakdown["not_voting"], 0);
    assert_eq!(roll.party_vote_breakdown["R"]["ayes"], 1);
    assert_eq!(roll.party_vote_breakdown["R"]["nays"], 0);
    assert_eq!(roll.party_vote_breakdown["D"]["nays"], 1);

    let bill = roll.bill.unwrap();
    assert_eq!(bill["bill_id"], "hr1-111");
    assert_eq!(bill["enacted"], true);
    assert!(bill.get("actions").is_none());
    assert!(bill.get("sponsor").is_none());

    let warning = roll_sink
        .reports()
        .into_iter()
        .find(|report| report.status == Status::Warning)
        .unwrap();
    assert_eq!(
        warning.message,
        "Found 1 missing legislator ids, attached. Vote counts on roll calls may be inaccurate until these are fixed."
    );
    assert_eq!(warning.metadata["missing_ids"][0]["filename"], Value::from("h2009-46.xml"));
}

#[test]
fn a_held_lock_refuses_the_run() {
    let fixture = Fixture::new();
    fixture.write(SourceKind::Bills, "h1.xml", HR1);
    let lock = fixture.lock_root().join(SESSION.to_string()).join(".bills.lock");
    fs::write(&lock, "").unwrap();

    let sink = MemorySink::default();
    let fetcher = fixture.fetcher();
    let summary = Ingestor::new(&fixture.store, &fetcher, &sink)
        .with_lock_dir(fixture.lock_root())
        .run(SourceKind::Bills, SESSION);

    assert!(summary.aborted.is_some());
    assert_eq!(fixture.store.count(Collection::Bills).unwrap(), 0);
    let reports = sink.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, Status::Failure);

    fs::remove_file(&lock).unwrap();
    let summary = Ingestor::new(&fixture.store, &fetcher, &sink)
        .with_lock_dir(fixture.lock_root())
        .run(SourceKind::Bills, SESSION);
    assert_eq!(summary.count, 1);
    assert!(!lock.exists());
}
