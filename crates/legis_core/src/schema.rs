use crate::db::{Collection, Document};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Vote counts keyed by ballot category ("ayes", "nays", a candidate name, ...).
pub type Tally = BTreeMap<String, u32>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Legislator {
    pub bioguide_id: String, // public, stable
    pub govtrack_id: String, // id used by the source feeds
    pub first_name: String,
    pub nickname: Option<String>,
    pub last_name: String,
    pub name_suffix: Option<String>,
    pub title: Option<String>, // "Rep", "Sen", "Del", "Com"
    pub state: String,
    pub party: String,
    pub district: Option<String>,
    pub chamber: Option<String>,
    #[serde(default = "in_office_default")]
    pub in_office: bool,
}

fn in_office_default() -> bool {
    true
}

/// The slice of a legislator copied into bills and rolls at ingestion time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LegislatorSnapshot {
    pub first_name: String,
    pub nickname: Option<String>,
    pub last_name: String,
    pub name_suffix: Option<String>,
    pub title: Option<String>,
    pub state: String,
    pub party: String,
    pub district: Option<String>,
    pub govtrack_id: String,
    pub bioguide_id: String,
}

impl From<&Legislator> for LegislatorSnapshot {
    fn from(legislator: &Legislator) -> Self {
        Self {
            first_name: legislator.first_name.clone(),
            nickname: legislator.nickname.clone(),
            last_name: legislator.last_name.clone(),
            name_suffix: legislator.name_suffix.clone(),
            title: legislator.title.clone(),
            state: legislator.state.clone(),
            party: legislator.party.clone(),
            district: legislator.district.clone(),
            govtrack_id: legislator.govtrack_id.clone(),
            bioguide_id: legislator.bioguide_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Title {
    #[serde(rename = "type")]
    pub title_type: Option<String>, // "short", "official", "popular"
    #[serde(rename = "as")]
    pub as_of: Option<String>, // e.g. "introduced", "passed house"
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Action {
    pub acted_at: String, // RFC 3339, UTC
    #[serde(rename = "type")]
    pub action_type: String, // element name: "action", "vote", "topresident", ...
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Vote {
    pub how: Option<String>,
    pub result: Option<String>, // "pass" / "fail"
    pub voted_at: String,
    pub text: String,
    pub chamber: Option<String>,
    #[serde(rename = "type")]
    pub vote_type: Option<String>, // "vote", "vote2", "override", ...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll_id: Option<String>,
}

/// Procedural status derived from a bill's votes and marker actions.
///
/// Optional pairs are omitted from the document entirely when the event
/// never happened; the four flags are always written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Timeline {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub house_result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub house_result_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub senate_result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub senate_result_at: Option<String>,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed_at: Option<String>,
    pub vetoed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vetoed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_house_result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_house_result_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_senate_result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_senate_result_at: Option<String>,
    pub enacted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enacted_at: Option<String>,
    pub awaiting_signature: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awaiting_signature_since: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Bill {
    pub bill_id: String, // "{code}-{session}", e.g. "hr3590-111"
    pub filename: String,
    #[serde(rename = "type")]
    pub bill_type: String, // "hr", "hres", "sjres", ...
    pub number: String,
    pub code: String,
    pub session: String,
    pub chamber: String,
    pub state: String,
    pub short_title: Option<String>,
    pub official_title: Option<String>,
    pub titles: Vec<Title>,
    pub keywords: Vec<String>,
    pub summary: Option<String>,
    pub sponsor: Option<LegislatorSnapshot>,
    pub sponsor_id: Option<String>,
    pub cosponsors: Vec<LegislatorSnapshot>,
    pub cosponsor_ids: Vec<String>,
    pub cosponsors_count: usize,
    pub actions: Vec<Action>,
    pub last_action: Option<Action>,
    pub last_action_at: Option<String>,
    pub votes: Vec<Vote>,
    pub votes_count: usize,
    pub last_vote_at: Option<String>,
    pub introduced_at: Option<String>,
    #[serde(flatten)]
    pub timeline: Timeline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VoterId {
    pub vote: String,
    pub voter_id: String, // bioguide id
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Voter {
    pub vote: String, // raw ballot value: "+", "-", "0", "P" or a candidate name
    pub voter: LegislatorSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Roll {
    pub roll_id: String, // "{h|s}{number}-{year}"
    pub filename: String,
    pub chamber: String,
    pub year: String,
    pub number: String,
    pub session: String,
    pub result: String,
    pub bill_id: Option<String>,
    pub voted_at: String,
    #[serde(rename = "type")]
    pub roll_type: Option<String>,
    pub question: Option<String>,
    pub required: Option<String>,
    pub bill: Option<Value>, // basic fields of the stored bill, if any
    pub voter_ids: Vec<VoterId>,
    pub voters: Vec<Voter>,
    pub vote_breakdown: Tally,
    pub party_vote_breakdown: BTreeMap<String, Tally>,
}

fn require(errors: &mut Vec<String>, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(format!("{field} can't be blank"));
    }
}

impl Document for Legislator {
    const COLLECTION: Collection = Collection::Legislators;

    fn key(&self) -> &str {
        &self.bioguide_id
    }

    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        require(&mut errors, "bioguide_id", &self.bioguide_id);
        require(&mut errors, "govtrack_id", &self.govtrack_id);
        require(&mut errors, "last_name", &self.last_name);
        errors
    }
}

impl Document for Bill {
    const COLLECTION: Collection = Collection::Bills;

    fn key(&self) -> &str {
        &self.bill_id
    }

    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        require(&mut errors, "bill_id", &self.bill_id);
        require(&mut errors, "type", &self.bill_type);
        require(&mut errors, "code", &self.code);
        require(&mut errors, "chamber", &self.chamber);
        require(&mut errors, "session", &self.session);
        require(&mut errors, "state", &self.state);
        errors
    }
}

impl Document for Roll {
    const COLLECTION: Collection = Collection::Rolls;

    fn key(&self) -> &str {
        &self.roll_id
    }

    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        require(&mut errors, "roll_id", &self.roll_id);
        require(&mut errors, "chamber", &self.chamber);
        require(&mut errors, "session", &self.session);
        require(&mut errors, "result", &self.result);
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeline_json(timeline: &Timeline) -> serde_json::Map<String, Value> {
        match serde_json::to_value(timeline).unwrap() {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn empty_timeline_only_writes_flags() {
        let map = timeline_json(&Timeline::default());
        let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(keys, ["awaiting_signature", "enacted", "passed", "vetoed"]);
        assert!(map.values().all(|value| value == &Value::Bool(false)));
    }

    #[test]
    fn legislator_defaults_to_in_office() {
        let legislator: Legislator = serde_json::from_value(serde_json::json!({
            "bioguide_id": "P000197",
            "govtrack_id": "400314",
            "first_name": "Nancy",
            "last_name": "Pelosi",
            "state": "CA",
            "party": "D",
        }))
        .unwrap();
        assert!(legislator.in_office);
        assert_eq!(legislator.nickname, None);
        assert!(legislator.validate().is_empty());
    }

    #[test]
    fn blank_required_fields_are_reported() {
        let legislator = Legislator {
            bioguide_id: " ".to_string(),
            govtrack_id: "1".to_string(),
            first_name: "A".to_string(),
            nickname: None,
            last_name: String::new(),
            name_suffix: None,
            title: None,
            state: "NY".to_string(),
            party: "I".to_string(),
            district: None,
            chamber: None,
            in_office: true,
        };
        assert_eq!(
            legislator.validate(),
            ["bioguide_id can't be blank", "last_name can't be blank"]
        );
    }
}
