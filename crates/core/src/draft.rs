//! Assessment draft - the record under edit.

use serde::{Deserialize, Serialize};
use crate::field::{Field, FieldKind, FieldValue};
use crate::id::MemberId;

/// The in-progress, unsubmitted assessment record.
///
/// Ordinal inputs are kept as raw integers: an out-of-range entry is stored
/// as typed so that validation can report it back against the field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentDraft {
    /// Member being assessed
    pub member_id: MemberId,

    /// Gender
    #[serde(default)]
    pub gender: Option<Gender>,

    /// Year of birth
    #[serde(default)]
    pub birth_year: Option<i64>,

    /// Mobility (1 independent, 2 partial assistance, 3 full assistance)
    #[serde(default)]
    pub mobility_level: Option<i64>,

    /// Eating
    #[serde(default)]
    pub eating_level: Option<i64>,

    /// Toileting
    #[serde(default)]
    pub toilet_level: Option<i64>,

    /// Communication
    #[serde(default)]
    pub communication_level: Option<i64>,

    /// Long-term-care-insurance grade (1..=8), absent when not yet graded
    #[serde(default)]
    pub ltci_grade: Option<i64>,

    /// Current care arrangement
    #[serde(default)]
    pub care_target_status: Option<CareTargetStatus>,

    /// Meal form
    #[serde(default)]
    pub meal_type: Option<MealType>,

    /// Known diseases, free text
    #[serde(default)]
    pub disease_types: Option<String>,

    /// Notes
    #[serde(default)]
    pub notes: Option<String>,

    /// Person filling in the assessment
    #[serde(default)]
    pub assessor_name: Option<String>,

    /// Relation of the assessor to the member
    #[serde(default)]
    pub assessor_relation: Option<String>,
}

impl AssessmentDraft {
    /// Create an empty draft for a member.
    pub fn new(member_id: MemberId) -> Self {
        Self {
            member_id,
            gender: None,
            birth_year: None,
            mobility_level: None,
            eating_level: None,
            toilet_level: None,
            communication_level: None,
            ltci_grade: None,
            care_target_status: None,
            meal_type: None,
            disease_types: None,
            notes: None,
            assessor_name: None,
            assessor_relation: None,
        }
    }

    /// Read a field as a [`FieldValue`].
    pub fn get(&self, field: Field) -> FieldValue {
        let int = |v: Option<i64>| v.map(FieldValue::Integer).unwrap_or(FieldValue::Empty);
        let text = |v: &Option<String>| {
            v.clone().map(FieldValue::Text).unwrap_or(FieldValue::Empty)
        };

        match field {
            Field::Gender => self.gender.map(FieldValue::Gender).unwrap_or(FieldValue::Empty),
            Field::BirthYear => int(self.birth_year),
            Field::MobilityLevel => int(self.mobility_level),
            Field::EatingLevel => int(self.eating_level),
            Field::ToiletLevel => int(self.toilet_level),
            Field::CommunicationLevel => int(self.communication_level),
            Field::LtciGrade => int(self.ltci_grade),
            Field::CareTargetStatus => self
                .care_target_status
                .map(FieldValue::CareTarget)
                .unwrap_or(FieldValue::Empty),
            Field::MealType => self.meal_type.map(FieldValue::Meal).unwrap_or(FieldValue::Empty),
            Field::DiseaseTypes => text(&self.disease_types),
            Field::Notes => text(&self.notes),
            Field::AssessorName => text(&self.assessor_name),
            Field::AssessorRelation => text(&self.assessor_relation),
        }
    }

    /// Write a field.
    ///
    /// `FieldValue::Empty` always clears. A value of the wrong kind leaves the
    /// draft untouched and returns the kind the field expects.
    pub fn set(&mut self, field: Field, value: FieldValue) -> Result<(), FieldKind> {
        let expected = field.kind();
        if !value.fits(expected) {
            return Err(expected);
        }

        match (field, value) {
            (Field::Gender, v) => self.gender = v.into_gender(),
            (Field::BirthYear, v) => self.birth_year = v.into_integer(),
            (Field::MobilityLevel, v) => self.mobility_level = v.into_integer(),
            (Field::EatingLevel, v) => self.eating_level = v.into_integer(),
            (Field::ToiletLevel, v) => self.toilet_level = v.into_integer(),
            (Field::CommunicationLevel, v) => self.communication_level = v.into_integer(),
            (Field::LtciGrade, v) => self.ltci_grade = v.into_integer(),
            (Field::CareTargetStatus, v) => self.care_target_status = v.into_care_target(),
            (Field::MealType, v) => self.meal_type = v.into_meal(),
            (Field::DiseaseTypes, v) => self.disease_types = v.into_text(),
            (Field::Notes, v) => self.notes = v.into_text(),
            (Field::AssessorName, v) => self.assessor_name = v.into_text(),
            (Field::AssessorRelation, v) => self.assessor_relation = v.into_text(),
        }
        Ok(())
    }

    /// Whether a field holds a value. Blank free text counts as absent.
    pub fn is_present(&self, field: Field) -> bool {
        self.get(field).is_present()
    }
}

/// Gender as recorded on the assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    /// Male
    M,
    /// Female
    F,
}

impl std::str::FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "M" | "MALE" => Ok(Gender::M),
            "F" | "FEMALE" => Ok(Gender::F),
            other => Err(format!("unknown gender: {}", other)),
        }
    }
}

/// Current care arrangement of the member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CareTargetStatus {
    /// Cared for at home
    Home,
    /// Already in a care facility
    Facility,
    /// Currently hospitalised
    Hospital,
    /// Not decided yet
    Undecided,
}

impl std::str::FromStr for CareTargetStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "home" => Ok(Self::Home),
            "facility" => Ok(Self::Facility),
            "hospital" => Ok(Self::Hospital),
            "undecided" => Ok(Self::Undecided),
            other => Err(format!("unknown care target status: {}", other)),
        }
    }
}

/// Meal form the member can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MealType {
    /// Regular diet
    Regular,
    /// Soft food
    Soft,
    /// Minced food
    Minced,
    /// Liquid diet
    Liquid,
    /// Tube feeding
    Tube,
}

impl std::str::FromStr for MealType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "regular" => Ok(Self::Regular),
            "soft" => Ok(Self::Soft),
            "minced" => Ok(Self::Minced),
            "liquid" => Ok(Self::Liquid),
            "tube" => Ok(Self::Tube),
            other => Err(format!("unknown meal type: {}", other)),
        }
    }
}
