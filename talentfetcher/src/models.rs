use chrono::NaiveDate;
use serde::Deserialize;

/// One entry of a row's embedded employment-episode array, as it appears
/// in the source JSON. All fields are optional at the wire level; the
/// deriver and mapper decide what is usable.
#[derive(Debug, Clone, Deserialize)]
pub struct EmploymentEpisode {
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

/// Source column names for the talent CSV. Kept as data so the same
/// mapper serves exports with renamed headers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TalentColumns {
    pub id: String,
    pub full_name: String,
    pub headline: String,
    pub city: String,
    pub country: String,
    pub skills: String,
    pub episodes: String,
    pub status_flag: String,
}

impl Default for TalentColumns {
    fn default() -> Self {
        Self {
            id: "talent_id".to_string(),
            full_name: "full_name".to_string(),
            headline: "headline".to_string(),
            city: "city".to_string(),
            country: "country".to_string(),
            skills: "skills".to_string(),
            episodes: "employment_history".to_string(),
            status_flag: "employment_status".to_string(),
        }
    }
}
