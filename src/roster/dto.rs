use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{CourseListing, Meeting, Professor, Section, SectionGroup};

/// Envelope shared by every roster API endpoint.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn into_data(self) -> Result<T, AppError> {
        match (self.status.as_str(), self.data) {
            ("success", Some(data)) => Ok(data),
            (status, _) => Err(AppError::Remote(
                self.message
                    .unwrap_or_else(|| format!("unexpected response status {:?}", status)),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RostersData {
    pub rosters: Vec<Roster>,
}

/// A term as listed by the roster API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Roster {
    pub slug: String,
    pub descr: String,
}

#[derive(Debug, Deserialize)]
pub struct SubjectsData {
    pub subjects: Vec<Subject>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub value: String,
    #[serde(default)]
    pub descr: Option<String>,
    #[serde(default)]
    pub descrformal: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClassesData {
    pub classes: Vec<ClassDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassDto {
    pub subject: String,
    pub crse_id: i64,
    pub catalog_nbr: String,
    pub title_long: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enroll_groups: Vec<EnrollGroupDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollGroupDto {
    #[serde(default)]
    pub units_minimum: f64,
    #[serde(default)]
    pub units_maximum: f64,
    #[serde(default)]
    pub components_required: Vec<String>,
    #[serde(default)]
    pub class_sections: Vec<ClassSectionDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSectionDto {
    pub class_nbr: i64,
    pub section: String,
    pub ssr_component: String,
    #[serde(default)]
    pub campus: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub meetings: Vec<MeetingDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingDto {
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub time_start: Option<String>,
    #[serde(default)]
    pub time_end: Option<String>,
    #[serde(default)]
    pub start_dt: Option<String>,
    #[serde(default)]
    pub end_dt: Option<String>,
    #[serde(default)]
    pub facility_descr: Option<String>,
    #[serde(default)]
    pub instructors: Vec<InstructorDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructorDto {
    pub netid: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(field: &str, value: String, crse_id: i64) -> Result<String, AppError> {
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(AppError::Remote(format!(
            "course {} is missing required field {}",
            crse_id, field
        )));
    }
    Ok(value)
}

impl TryFrom<ClassDto> for CourseListing {
    type Error = AppError;

    fn try_from(dto: ClassDto) -> Result<Self, Self::Error> {
        let crse_id = dto.crse_id;

        Ok(CourseListing {
            subject: required("subject", dto.subject, crse_id)?,
            crse_id,
            catalog_nbr: required("catalogNbr", dto.catalog_nbr, crse_id)?,
            title_long: required("titleLong", dto.title_long, crse_id)?,
            description: non_empty(dto.description),
            groups: dto.enroll_groups.into_iter().map(SectionGroup::from).collect(),
        })
    }
}

impl From<EnrollGroupDto> for SectionGroup {
    fn from(dto: EnrollGroupDto) -> Self {
        SectionGroup {
            units_min: dto.units_minimum,
            units_max: dto.units_maximum,
            components_required: dto.components_required,
            sections: dto.class_sections.into_iter().map(Section::from).collect(),
        }
    }
}

impl From<ClassSectionDto> for Section {
    fn from(dto: ClassSectionDto) -> Self {
        Section {
            class_nbr: dto.class_nbr,
            section: dto.section,
            component: dto.ssr_component,
            campus: non_empty(dto.campus),
            location: non_empty(dto.location),
            meetings: dto.meetings.into_iter().map(Meeting::from).collect(),
        }
    }
}

impl From<MeetingDto> for Meeting {
    fn from(dto: MeetingDto) -> Self {
        let mut professors: Vec<Professor> = Vec::with_capacity(dto.instructors.len());
        for instructor in dto.instructors {
            // The join table holds one row per professor and meeting.
            if professors.iter().any(|p| p.netid == instructor.netid) {
                continue;
            }
            professors.push(Professor {
                netid: instructor.netid,
                first_name: instructor.first_name,
                last_name: instructor.last_name,
            });
        }

        Meeting {
            pattern: non_empty(dto.pattern),
            time_start: non_empty(dto.time_start),
            time_end: non_empty(dto.time_end),
            start_date: non_empty(dto.start_dt),
            end_date: non_empty(dto.end_dt),
            facility: non_empty(dto.facility_descr),
            professors,
        }
    }
}
