//! Editable fields of the assessment and the values they accept.

use serde::{Deserialize, Serialize};
use crate::draft::{CareTargetStatus, Gender, MealType};

/// A field of [`crate::AssessmentDraft`] that can be written by the UI.
///
/// The member id is deliberately absent: it is fixed by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    /// Member's gender
    Gender,
    /// Year of birth
    BirthYear,
    /// ADL: moving about (1..=3)
    MobilityLevel,
    /// ADL: eating (1..=3)
    EatingLevel,
    /// ADL: toileting (1..=3)
    ToiletLevel,
    /// ADL: communication (1..=3)
    CommunicationLevel,
    /// Long-term care insurance grade (1..=8)
    LtciGrade,
    /// Where care is sought
    CareTargetStatus,
    /// Meal form
    MealType,
    /// Diagnosed conditions, free text
    DiseaseTypes,
    /// Free-form notes
    Notes,
    /// Who filled in the assessment
    AssessorName,
    /// Assessor's relation to the member
    AssessorRelation,
}

impl Field {
    /// Every editable field, in form order.
    pub const ALL: [Field; 13] = [
        Field::Gender,
        Field::BirthYear,
        Field::MobilityLevel,
        Field::EatingLevel,
        Field::ToiletLevel,
        Field::CommunicationLevel,
        Field::LtciGrade,
        Field::CareTargetStatus,
        Field::MealType,
        Field::DiseaseTypes,
        Field::Notes,
        Field::AssessorName,
        Field::AssessorRelation,
    ];

    /// The four activities-of-daily-living sub-scores.
    pub const ADL: [Field; 4] = [
        Field::MobilityLevel,
        Field::EatingLevel,
        Field::ToiletLevel,
        Field::CommunicationLevel,
    ];

    /// Wire name (camelCase, as persisted).
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Gender => "gender",
            Field::BirthYear => "birthYear",
            Field::MobilityLevel => "mobilityLevel",
            Field::EatingLevel => "eatingLevel",
            Field::ToiletLevel => "toiletLevel",
            Field::CommunicationLevel => "communicationLevel",
            Field::LtciGrade => "ltciGrade",
            Field::CareTargetStatus => "careTargetStatus",
            Field::MealType => "mealType",
            Field::DiseaseTypes => "diseaseTypes",
            Field::Notes => "notes",
            Field::AssessorName => "assessorName",
            Field::AssessorRelation => "assessorRelation",
        }
    }

    /// Kind of value this field accepts.
    pub fn kind(&self) -> FieldKind {
        match self {
            Field::Gender => FieldKind::Gender,
            Field::BirthYear
            | Field::MobilityLevel
            | Field::EatingLevel
            | Field::ToiletLevel
            | Field::CommunicationLevel
            | Field::LtciGrade => FieldKind::Integer,
            Field::CareTargetStatus => FieldKind::CareTarget,
            Field::MealType => FieldKind::Meal,
            Field::DiseaseTypes | Field::Notes | Field::AssessorName | Field::AssessorRelation => {
                FieldKind::Text
            }
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown field: {}", s))
    }
}

/// Kind of value a field accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Whole number
    Integer,
    /// Free text
    Text,
    /// [`Gender`]
    Gender,
    /// [`CareTargetStatus`]
    CareTarget,
    /// [`MealType`]
    Meal,
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FieldKind::Integer => "integer",
            FieldKind::Text => "text",
            FieldKind::Gender => "gender",
            FieldKind::CareTarget => "care target status",
            FieldKind::Meal => "meal type",
        };
        f.write_str(s)
    }
}

/// A value written to or read from a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum FieldValue {
    /// No value; clears the field.
    Empty,
    /// Whole number
    Integer(i64),
    /// Free text
    Text(String),
    /// Gender
    Gender(Gender),
    /// Care target status
    CareTarget(CareTargetStatus),
    /// Meal type
    Meal(MealType),
}

impl FieldValue {
    /// Parse user input for `field`. Blank input yields `Empty`.
    pub fn parse(field: Field, input: &str) -> Result<Self, String> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(FieldValue::Empty);
        }

        match field.kind() {
            FieldKind::Integer => input
                .parse::<i64>()
                .map(FieldValue::Integer)
                .map_err(|_| format!("{} expects a whole number, got '{}'", field, input)),
            FieldKind::Text => Ok(FieldValue::Text(input.to_string())),
            FieldKind::Gender => input.parse().map(FieldValue::Gender),
            FieldKind::CareTarget => input.parse().map(FieldValue::CareTarget),
            FieldKind::Meal => input.parse().map(FieldValue::Meal),
        }
    }

    /// Whether this value counts as filled in.
    pub fn is_present(&self) -> bool {
        match self {
            FieldValue::Empty => false,
            FieldValue::Text(s) => !s.trim().is_empty(),
            _ => true,
        }
    }

    /// Integer payload, if any.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub(crate) fn fits(&self, kind: FieldKind) -> bool {
        matches!(
            (self, kind),
            (FieldValue::Empty, _)
                | (FieldValue::Integer(_), FieldKind::Integer)
                | (FieldValue::Text(_), FieldKind::Text)
                | (FieldValue::Gender(_), FieldKind::Gender)
                | (FieldValue::CareTarget(_), FieldKind::CareTarget)
                | (FieldValue::Meal(_), FieldKind::Meal)
        )
    }

    pub(crate) fn into_integer(self) -> Option<i64> {
        self.as_integer()
    }

    pub(crate) fn into_text(self) -> Option<String> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub(crate) fn into_gender(self) -> Option<Gender> {
        match self {
            FieldValue::Gender(g) => Some(g),
            _ => None,
        }
    }

    pub(crate) fn into_care_target(self) -> Option<CareTargetStatus> {
        match self {
            FieldValue::CareTarget(c) => Some(c),
            _ => None,
        }
    }

    pub(crate) fn into_meal(self) -> Option<MealType> {
        match self {
            FieldValue::Meal(m) => Some(m),
            _ => None,
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Empty => f.write_str("-"),
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Gender(g) => write!(f, "{:?}", g),
            FieldValue::CareTarget(c) => write!(f, "{:?}", c),
            FieldValue::Meal(m) => write!(f, "{:?}", m),
        }
    }
}
