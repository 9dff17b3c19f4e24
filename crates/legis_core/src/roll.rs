//! Roll-call documents and their vote breakdowns.

use crate::bill::type_for;
use crate::error::ParseError;
use crate::legislators::{LegislatorIndex, MissingIds};
use crate::schema::{Roll, Tally, Voter, VoterId};
use crate::timestamp;
use crate::xml;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteCategory {
    Ayes,
    Nays,
    NotVoting,
    Present,
    /// Anything else, e.g. a candidate's name in a Speaker election.
    Other(String),
}

impl VoteCategory {
    pub const CANONICAL: [VoteCategory; 4] = [
        VoteCategory::Ayes,
        VoteCategory::Nays,
        VoteCategory::NotVoting,
        VoteCategory::Present,
    ];

    pub fn from_ballot(value: &str) -> Self {
        match value {
            "+" => VoteCategory::Ayes,
            "-" => VoteCategory::Nays,
            "0" => VoteCategory::NotVoting,
            "P" => VoteCategory::Present,
            other => VoteCategory::Other(other.to_string()),
        }
    }
}

impl fmt::Display for VoteCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            VoteCategory::Ayes => "ayes",
            VoteCategory::Nays => "nays",
            VoteCategory::NotVoting => "not_voting",
            VoteCategory::Present => "present",
            VoteCategory::Other(name) => name.as_str(),
        };
        write!(f, "{value}")
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoteBreakdown {
    pub total: Tally,
    pub parties: BTreeMap<String, Tally>,
}

/// Counts ballots overall and per party. Every tally ends up with the same
/// keys: the canonical categories plus any category seen in any ballot.
pub fn vote_breakdown_for(voters: &[Voter]) -> VoteBreakdown {
    let mut breakdown = VoteBreakdown::default();

    for voter in voters {
        let category = VoteCategory::from_ballot(&voter.vote).to_string();
        *breakdown
            .parties
            .entry(voter.voter.party.clone())
            .or_default()
            .entry(category.clone())
            .or_insert(0) += 1;
        *breakdown.total.entry(category).or_insert(0) += 1;
    }

    let categories: BTreeSet<String> = breakdown
        .total
        .keys()
        .cloned()
        .chain(VoteCategory::CANONICAL.iter().map(ToString::to_string))
        .collect();
    for tally in std::iter::once(&mut breakdown.total).chain(breakdown.parties.values_mut()) {
        for category in &categories {
            tally.entry(category.clone()).or_insert(0);
        }
    }

    breakdown
}

/// Splits `h2009-12.xml` into ("h", "2009", "12").
pub fn parse_roll_filename(filename: &str) -> Result<(String, String, String), ParseError> {
    let invalid = || ParseError::RollFilename(filename.to_string());

    let stem = filename.strip_suffix(".xml").ok_or_else(invalid)?;
    let mut chars = stem.chars();
    let chamber = chars.next().filter(|c| matches!(*c, 'h' | 's')).ok_or_else(invalid)?;
    let (year, number) = chars.as_str().split_once('-').ok_or_else(invalid)?;

    let is_number = |part: &str| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit());
    if !is_number(year) || !is_number(number) {
        return Err(invalid());
    }
    Ok((chamber.to_string(), year.to_string(), number.to_string()))
}

pub fn parse_roll(
    text: &str,
    filename: &str,
    session: &str,
    legislators: &LegislatorIndex,
    missing: &mut MissingIds,
) -> Result<Roll, ParseError> {
    let (chamber_code, year, number) = parse_roll_filename(filename)?;
    let doc = xml::parse_document(text)?;
    let root = doc.root_element();

    let voted_at = timestamp::to_utc_string(xml::datetime(root)?)?;
    let text_of = |name: &str| xml::first(&doc, name).map(|node| xml::inner_text(node).trim().to_string());

    let bill_id = xml::first(&doc, "bill").map(|bill| {
        format!(
            "{}{}-{}",
            type_for(bill.attribute("type").unwrap_or_default()).unwrap_or_default(),
            bill.attribute("number").unwrap_or_default(),
            bill.attribute("session").unwrap_or_default()
        )
    });

    let mut voter_ids = Vec::new();
    let mut voters = Vec::new();
    for node in xml::elements(&doc, "voter") {
        let Some(govtrack_id) = node.attribute("id") else {
            continue;
        };
        let vote = node.attribute("vote").unwrap_or_default().to_string();
        if let Some(voter) = legislators.resolve(govtrack_id, filename, missing) {
            voter_ids.push(VoterId {
                vote: vote.clone(),
                voter_id: voter.bioguide_id.clone(),
            });
            voters.push(Voter { vote, voter });
        }
    }

    let breakdown = vote_breakdown_for(&voters);

    Ok(Roll {
        roll_id: format!("{chamber_code}{number}-{year}"),
        filename: filename.to_string(),
        chamber: root.attribute("where").unwrap_or_default().to_string(),
        year,
        number,
        session: session.to_string(),
        result: text_of("result").unwrap_or_default(),
        bill_id,
        voted_at,
        roll_type: text_of("type"),
        question: text_of("question"),
        required: text_of("required"),
        bill: None,
        voter_ids,
        voters,
        vote_breakdown: breakdown.total,
        party_vote_breakdown: breakdown.parties,
    })
}
