//! Recorded sessions and their metadata.

use chrono::{DateTime, TimeZone};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Length of generated subject identifiers.
pub const IDENTIFIER_LEN: usize = 10;

const IDENTIFIER_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// One captured point, `time` in seconds since the recording started.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecordedSample {
    pub time: f64,
    pub x: f64,
    pub y: f64,
}

impl RecordedSample {
    pub fn new(time: f64, x: f64, y: f64) -> Self {
        Self { time, x, y }
    }
}

/// Operator-entered details about the subject and the test condition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubjectInfo {
    pub stance: String,
    pub eyes: String,
    pub identifier: String,
    pub age: String,
    pub height: String,
    pub weight: String,
    pub condition: String,
    pub medication: String,
    pub fall_history: String,
    pub notes: String,
}

/// Session metadata. Every field is stored as text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionMetadata {
    /// `dd/mm/YYYY`
    pub date: String,
    /// `HH:MM:SS`
    pub time: String,
    pub duration: String,
    pub stance: String,
    pub eyes: String,
    pub identifier: String,
    pub age: String,
    pub height: String,
    pub weight: String,
    pub condition: String,
    pub medication: String,
    #[serde(rename = "fallhistory")]
    pub fall_history: String,
    pub notes: String,
    pub practitioner: String,
}

impl SessionMetadata {
    /// Column names, in storage order.
    pub const FIELDS: [&'static str; 14] = [
        "date",
        "time",
        "duration",
        "stance",
        "eyes",
        "identifier",
        "age",
        "height",
        "weight",
        "condition",
        "medication",
        "fallhistory",
        "notes",
        "practitioner",
    ];

    /// Metadata for a recording that started at `started` and lasted
    /// `duration`.
    pub fn new<Tz: TimeZone>(
        started: &DateTime<Tz>,
        duration: Duration,
        subject: &SubjectInfo,
        practitioner: &str,
    ) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        Self {
            date: started.format("%d/%m/%Y").to_string(),
            time: started.format("%H:%M:%S").to_string(),
            duration: format_duration(duration.as_secs_f64()),
            stance: subject.stance.clone(),
            eyes: subject.eyes.clone(),
            identifier: subject.identifier.clone(),
            age: subject.age.clone(),
            height: subject.height.clone(),
            weight: subject.weight.clone(),
            condition: subject.condition.clone(),
            medication: subject.medication.clone(),
            fall_history: subject.fall_history.clone(),
            notes: subject.notes.clone(),
            practitioner: practitioner.to_string(),
        }
    }

    /// Value of a storage column.
    pub fn get(&self, field: &str) -> Option<&str> {
        let value = match field {
            "date" => &self.date,
            "time" => &self.time,
            "duration" => &self.duration,
            "stance" => &self.stance,
            "eyes" => &self.eyes,
            "identifier" => &self.identifier,
            "age" => &self.age,
            "height" => &self.height,
            "weight" => &self.weight,
            "condition" => &self.condition,
            "medication" => &self.medication,
            "fallhistory" => &self.fall_history,
            "notes" => &self.notes,
            "practitioner" => &self.practitioner,
            _ => return None,
        };
        Some(value.as_str())
    }

    /// Set a storage column. Unknown columns are ignored.
    pub fn set(&mut self, field: &str, value: String) -> bool {
        let slot = match field {
            "date" => &mut self.date,
            "time" => &mut self.time,
            "duration" => &mut self.duration,
            "stance" => &mut self.stance,
            "eyes" => &mut self.eyes,
            "identifier" => &mut self.identifier,
            "age" => &mut self.age,
            "height" => &mut self.height,
            "weight" => &mut self.weight,
            "condition" => &mut self.condition,
            "medication" => &mut self.medication,
            "fallhistory" => &mut self.fall_history,
            "notes" => &mut self.notes,
            "practitioner" => &mut self.practitioner,
            _ => return false,
        };
        *slot = value;
        true
    }

    /// `(column, value)` pairs in storage order.
    pub fn pairs(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        Self::FIELDS
            .iter()
            .map(move |&f| (f, self.get(f).unwrap_or_default()))
    }
}

/// A frozen capture: metadata plus ordered samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub metadata: SessionMetadata,
    pub samples: Vec<RecordedSample>,
}

impl Recording {
    pub fn new(metadata: SessionMetadata, samples: Vec<RecordedSample>) -> Self {
        Self { metadata, samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Time of the last sample, in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.last().map(|s| s.time).unwrap_or(0.0)
    }
}

/// Plain seconds, without trailing zeros or unit: `30`, `2.5`.
pub(crate) fn format_duration(secs: f64) -> String {
    format!("{secs}")
}

/// Random identifier of uppercase letters and digits for anonymous subjects.
pub fn random_identifier() -> String {
    let mut rng = rand::thread_rng();
    (0..IDENTIFIER_LEN)
        .filter_map(|_| IDENTIFIER_ALPHABET.choose(&mut rng))
        .map(|&b| b as char)
        .collect()
}
