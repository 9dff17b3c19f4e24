//! Bill documents: parsing, title selection and timeline reconstruction.

use crate::error::ParseError;
use crate::legislators::{LegislatorIndex, MissingIds};
use crate::schema::{Action, Bill, LegislatorSnapshot, Timeline, Title, Vote};
use crate::timestamp;
use crate::xml;
use roxmltree::{Document, Node};

/// Maps the feed's bill type to the public type code.
pub fn type_for(raw_type: &str) -> Option<&'static str> {
    match raw_type {
        "h" => Some("hr"),
        "hr" => Some("hres"),
        "hj" => Some("hjres"),
        "hc" => Some("hcres"),
        "s" => Some("s"),
        "sr" => Some("sres"),
        "sj" => Some("sjres"),
        "sc" => Some("scres"),
        _ => None,
    }
}

pub fn chamber_for(raw_type: &str) -> &'static str {
    if raw_type
        .chars()
        .next()
        .is_some_and(|first| first.eq_ignore_ascii_case(&'h'))
    {
        "house"
    } else {
        "senate"
    }
}

fn chamber_for_code(code: &str) -> Option<&'static str> {
    match code {
        "h" => Some("house"),
        "s" => Some("senate"),
        _ => None,
    }
}

/// Timestamps of the marker actions the timeline depends on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Markers {
    pub vetoed_at: Option<String>,      // first <vetoed>
    pub enacted_at: Option<String>,     // first <enacted>
    pub to_president_at: Option<String>, // last <topresident>
}

pub fn parse_bill(
    text: &str,
    filename: &str,
    session: &str,
    legislators: &LegislatorIndex,
    missing: &mut MissingIds,
) -> Result<Bill, ParseError> {
    let doc = xml::parse_document(text)?;
    let root = doc.root_element();

    let raw_type = root.attribute("type").unwrap_or_default();
    let bill_type = type_for(raw_type).unwrap_or_default().to_string();
    let number = root.attribute("number").unwrap_or_default().to_string();
    let code = format!("{bill_type}{number}");

    let titles = titles_for(&doc);
    let sponsor = sponsor_for(&doc, filename, legislators, missing);
    let cosponsors = cosponsors_for(&doc, filename, legislators, missing);
    let actions = actions_for(&doc)?;
    let votes = votes_for(&doc)?;
    let markers = markers_for(&doc)?;

    let introduced_at = match xml::first(&doc, "introduced") {
        Some(node) => Some(timestamp::to_utc_string(xml::datetime(node)?)?),
        None => None,
    };
    let state = xml::first(&doc, "state")
        .map(|node| xml::inner_text(node).trim().to_string())
        .unwrap_or_else(|| "UNKNOWN".to_string());

    Ok(Bill {
        bill_id: format!("{code}-{session}"),
        filename: filename.to_string(),
        chamber: chamber_for(raw_type).to_string(),
        session: session.to_string(),
        state,
        short_title: most_recent_title(&titles, "short"),
        official_title: most_recent_title(&titles, "official"),
        keywords: keywords_for(&doc),
        summary: summary_for(&doc),
        sponsor_id: sponsor.as_ref().map(|sponsor| sponsor.bioguide_id.clone()),
        sponsor,
        cosponsor_ids: cosponsors
            .iter()
            .map(|cosponsor| cosponsor.bioguide_id.clone())
            .collect(),
        cosponsors_count: cosponsors.len(),
        cosponsors,
        last_action: actions.last().cloned(),
        last_action_at: actions.last().map(|action| action.acted_at.clone()),
        actions,
        last_vote_at: votes.last().map(|vote| vote.voted_at.clone()),
        votes_count: votes.len(),
        timeline: timeline_for(&votes, &markers),
        votes,
        introduced_at,
        titles,
        bill_type,
        number,
        code,
    })
}

/// Every `<title>` in document order. Order matters for `most_recent_title`.
pub fn titles_for(doc: &Document) -> Vec<Title> {
    xml::elements(doc, "title")
        .map(|node| Title {
            title_type: xml::attribute(node, "type"),
            as_of: xml::attribute(node, "as"),
            title: xml::inner_text(node),
        })
        .collect()
}

/// Picks the current title of a type: titles are grouped by their `as`
/// value in order of first appearance, the last group wins, and its first
/// title is returned. Relies on the feed listing titles oldest first.
pub fn most_recent_title(titles: &[Title], title_type: &str) -> Option<String> {
    let matching: Vec<&Title> = titles
        .iter()
        .filter(|title| title.title_type.as_deref() == Some(title_type))
        .collect();

    let mut groups: Vec<Option<&str>> = Vec::new();
    for title in &matching {
        let key = title.as_of.as_deref();
        if !groups.contains(&key) {
            groups.push(key);
        }
    }

    let recent = groups.last()?;
    matching
        .iter()
        .find(|title| title.as_of.as_deref() == *recent)
        .map(|title| title.title.clone())
}

fn summary_for(doc: &Document) -> Option<String> {
    let summary = xml::inner_text(xml::first(doc, "summary")?);
    let summary = summary.trim();
    if summary.is_empty() {
        None
    } else {
        Some(summary.to_string())
    }
}

fn keywords_for(doc: &Document) -> Vec<String> {
    xml::elements(doc, "term")
        .filter(|term| term.parent_element().is_some_and(|parent| parent.has_tag_name("subjects")))
        .filter_map(|term| xml::attribute(term, "name"))
        .collect()
}

/// Resolves a sponsor-like element. Withdrawn or id-less entries resolve to
/// nothing and are not reported missing.
fn person_for(
    node: Node,
    filename: &str,
    legislators: &LegislatorIndex,
    missing: &mut MissingIds,
) -> Option<LegislatorSnapshot> {
    if node.attribute("withdrawn").is_some() {
        return None;
    }
    let id = node.attribute("id").filter(|id| !id.trim().is_empty())?;
    legislators.resolve(id, filename, missing)
}

fn sponsor_for(
    doc: &Document,
    filename: &str,
    legislators: &LegislatorIndex,
    missing: &mut MissingIds,
) -> Option<LegislatorSnapshot> {
    let node = xml::first(doc, "sponsor")?;
    person_for(node, filename, legislators, missing)
}

fn cosponsors_for(
    doc: &Document,
    filename: &str,
    legislators: &LegislatorIndex,
    missing: &mut MissingIds,
) -> Vec<LegislatorSnapshot> {
    xml::elements(doc, "cosponsor")
        .filter_map(|node| person_for(node, filename, legislators, missing))
        .collect()
}

pub fn actions_for(doc: &Document) -> Result<Vec<Action>, ParseError> {
    xml::action_children(doc)
        .map(|node| {
            Ok(Action {
                acted_at: timestamp::to_utc_string(xml::datetime(node)?)?,
                action_type: node.tag_name().name().to_string(),
                text: xml::nested_text(node),
            })
        })
        .collect()
}

pub fn votes_for(doc: &Document) -> Result<Vec<Vote>, ParseError> {
    xml::action_children(doc)
        .filter(|node| matches!(node.tag_name().name(), "vote" | "vote2" | "vote-aux"))
        .map(|node| {
            let voted_at = xml::datetime(node)?;
            let chamber_code = node.attribute("where").unwrap_or_default();
            let roll_id = node
                .attribute("roll")
                .filter(|roll| !roll.trim().is_empty())
                .map(|roll| format!("{chamber_code}{roll}-{}", voted_at.year()));

            Ok(Vote {
                how: xml::attribute(node, "how"),
                result: xml::attribute(node, "result"),
                voted_at: timestamp::to_utc_string(voted_at)?,
                text: xml::nested_text(node),
                chamber: chamber_for_code(chamber_code).map(str::to_string),
                vote_type: xml::attribute(node, "type"),
                roll_id,
            })
        })
        .collect()
}

pub fn markers_for(doc: &Document) -> Result<Markers, ParseError> {
    let marker = |name: &str, last: bool| -> Result<Option<String>, ParseError> {
        let mut nodes = xml::action_children(doc).filter(|node| node.has_tag_name(name));
        let node = if last { nodes.last() } else { nodes.next() };
        match node {
            Some(node) => Ok(Some(timestamp::to_utc_string(xml::datetime(node)?)?)),
            None => Ok(None),
        }
    };

    Ok(Markers {
        vetoed_at: marker("vetoed", false)?,
        enacted_at: marker("enacted", false)?,
        to_president_at: marker("topresident", true)?,
    })
}

/// Derives the procedural flags from the vote log and marker actions.
/// Each step only fills its fields when the event it describes happened.
pub fn timeline_for(votes: &[Vote], markers: &Markers) -> Timeline {
    let mut timeline = Timeline::default();

    let last_vote = |chamber: &str, is_override: bool| {
        votes.iter().rev().find(|vote| {
            vote.chamber.as_deref() == Some(chamber)
                && (vote.vote_type.as_deref() == Some("override")) == is_override
        })
    };

    if let Some(vote) = last_vote("house", false) {
        timeline.house_result = vote.result.clone();
        timeline.house_result_at = Some(vote.voted_at.clone());
    }

    if let Some(vote) = last_vote("senate", false) {
        timeline.senate_result = vote.result.clone();
        timeline.senate_result_at = Some(vote.voted_at.clone());
    }

    if let Some(concurring) = votes
        .iter()
        .rev()
        .find(|vote| vote.vote_type.as_deref() == Some("vote2"))
    {
        timeline.passed = concurring.result.as_deref() == Some("pass");
        timeline.passed_at = Some(concurring.voted_at.clone());
    }

    if let Some(vetoed_at) = &markers.vetoed_at {
        timeline.vetoed = true;
        timeline.vetoed_at = Some(vetoed_at.clone());
    }

    if let Some(vote) = last_vote("house", true) {
        timeline.override_house_result = vote.result.clone();
        timeline.override_house_result_at = Some(vote.voted_at.clone());
    }

    if let Some(vote) = last_vote("senate", true) {
        timeline.override_senate_result = vote.result.clone();
        timeline.override_senate_result_at = Some(vote.voted_at.clone());
    }

    if let Some(enacted_at) = &markers.enacted_at {
        timeline.enacted = true;
        timeline.enacted_at = Some(enacted_at.clone());
    }

    if timeline.passed && !timeline.vetoed && !timeline.enacted {
        if let Some(since) = &markers.to_president_at {
            timeline.awaiting_signature = true;
            timeline.awaiting_signature_since = Some(since.clone());
        }
    }

    timeline
}
