use crate::episodes::{derive_intervals, DeriveOptions, StateInterval};
use crate::models::{EmploymentEpisode, TalentColumns};
use gstorage::entity::{Entity, EntityRef, EntitySet, PropValue, Relationship};
use gstorage::source::{RawRecord, RecordTransformer, SkipReason, Transformed};

pub const LABEL_PERSON: &str = "Person";
pub const LABEL_CITY: &str = "City";
pub const LABEL_COMPANY: &str = "Company";
pub const LABEL_SKILL: &str = "Skill";
pub const LABEL_STATE: &str = "EmploymentState";

pub const REL_LIVES_IN: &str = "LIVES_IN";
pub const REL_WORKED_AT: &str = "WORKED_AT";
pub const REL_HAS_SKILL: &str = "HAS_SKILL";
pub const REL_HAS_STATE: &str = "HAS_STATE";

/// Maps one talent row to its entity set: the person, the shared
/// reference entities it mentions, and the derived employment-state
/// intervals. Pure per record; safe to call from anywhere.
pub struct TalentMapper {
    columns: TalentColumns,
    derive: DeriveOptions,
}

impl TalentMapper {
    pub fn new(columns: TalentColumns, derive: DeriveOptions) -> Self {
        Self { columns, derive }
    }

    fn person_entity(&self, record: &RawRecord, id: &str, intervals: &[StateInterval]) -> Entity {
        let mut person = Entity::new(LABEL_PERSON, id)
            .with_prop("full_name", record.opt_str(&self.columns.full_name))
            .with_prop("headline", record.opt_str(&self.columns.headline));

        // Current status comes from the derived interval sequence, which
        // reflects the episode data; the row's cached flag is only a
        // fallback for rows with no episode list, and is marked as such.
        if let Some(current) = intervals.iter().find(|i| i.is_current) {
            person = person
                .with_prop("current_status", current.state.as_str())
                .with_prop("status_source", "episodes");
        } else if intervals.is_empty() {
            if let Some(flag) = record.opt_str(&self.columns.status_flag) {
                person = person
                    .with_prop("current_status", flag.to_ascii_uppercase())
                    .with_prop("status_source", "flag");
            }
        }
        person
    }
}

impl RecordTransformer for TalentMapper {
    fn transform(&self, record: &RawRecord) -> Transformed {
        let Some(id) = record.required_str(&self.columns.id) else {
            return Transformed::Skip(SkipReason::MissingKey("talent_id"));
        };
        let id = id.to_string();

        let episodes: Vec<EmploymentEpisode> =
            match record.json_list(&self.columns.episodes) {
                Ok(list) => list.unwrap_or_default(),
                Err(e) => return Transformed::Skip(SkipReason::BadEmbeddedList(e.to_string())),
            };
        let skills: Vec<String> = match record.json_list(&self.columns.skills) {
            Ok(list) => list.unwrap_or_default(),
            Err(e) => return Transformed::Skip(SkipReason::BadEmbeddedList(e.to_string())),
        };

        let intervals = derive_intervals(&episodes, &self.derive);
        let person_ref = EntityRef::new(LABEL_PERSON, &id);
        let mut set = EntitySet::new(self.person_entity(record, &id, &intervals));

        if let Some(city) = record.opt_str(&self.columns.city) {
            let city_key = city.trim().to_lowercase();
            set.add_reference(
                Entity::new(LABEL_CITY, &city_key)
                    .with_prop("name", city.trim())
                    .with_prop("country", record.opt_str(&self.columns.country)),
            );
            set.add_relationship(Relationship::new(
                REL_LIVES_IN,
                person_ref.clone(),
                EntityRef::new(LABEL_CITY, &city_key),
            ));
        }

        for skill in &skills {
            let skill_key = skill.trim().to_lowercase();
            if skill_key.is_empty() {
                continue;
            }
            set.add_reference(
                Entity::new(LABEL_SKILL, &skill_key).with_prop("name", skill.trim()),
            );
            set.add_relationship(Relationship::new(
                REL_HAS_SKILL,
                person_ref.clone(),
                EntityRef::new(LABEL_SKILL, &skill_key),
            ));
        }

        for episode in &episodes {
            let (Some(company), Some(start)) = (&episode.company, episode.start_date) else {
                continue;
            };
            let company_key = company.trim().to_lowercase();
            if company_key.is_empty() {
                continue;
            }
            set.add_reference(
                Entity::new(LABEL_COMPANY, &company_key).with_prop("name", company.trim()),
            );
            let mut rel = Relationship::new(
                REL_WORKED_AT,
                person_ref.clone(),
                EntityRef::new(LABEL_COMPANY, &company_key),
            )
            .with_prop("start_date", start.to_string())
            .with_prop("title", episode.title.as_deref());
            if let Some(end) = episode.end_date.filter(|d| !crate::episodes::is_open_end(*d)) {
                rel = rel.with_prop("end_date", end.to_string());
            }
            set.add_relationship(rel);
        }

        for (seq, interval) in intervals.iter().enumerate() {
            let state_key = format!("{}#{}", id, seq);
            let mut state = Entity::new(LABEL_STATE, &state_key)
                .with_prop("state", interval.state.as_str())
                .with_prop("start_date", interval.start.to_string())
                .with_prop("is_current", interval.is_current);
            if let Some(end) = interval.end {
                state = state.with_prop("end_date", end.to_string());
            } else {
                state = state.with_prop("end_date", PropValue::Null);
            }
            set.add_reference(state);
            set.add_relationship(
                Relationship::new(
                    REL_HAS_STATE,
                    person_ref.clone(),
                    EntityRef::new(LABEL_STATE, &state_key),
                )
                .with_prop("seq", seq as i64),
            );
        }

        Transformed::Set(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::HashMap;

    fn mapper() -> TalentMapper {
        TalentMapper::new(
            TalentColumns::default(),
            DeriveOptions {
                idle_gap_days: 90,
                infer_initial: false,
                default_start: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
            },
        )
    }

    fn record(fields: &[(&str, &str)]) -> RawRecord {
        let map = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        RawRecord::new(0, map)
    }

    #[test]
    fn full_row_produces_all_entity_kinds() {
        let rec = record(&[
            ("talent_id", "p-1"),
            ("full_name", "Ada Lovelace"),
            ("city", "Berlin"),
            ("country", "DE"),
            ("skills", r#"["Rust","SQL"]"#),
            (
                "employment_history",
                r#"[{"company":"Acme","status":"employed","start_date":"2020-01-01"}]"#,
            ),
        ]);

        let Transformed::Set(set) = mapper().transform(&rec) else {
            panic!("row should transform");
        };
        let primary = set.primary.unwrap();
        assert_eq!(primary.label, LABEL_PERSON);
        assert_eq!(
            primary.props["current_status"],
            PropValue::Str("EMPLOYED".into())
        );
        assert_eq!(
            primary.props["status_source"],
            PropValue::Str("episodes".into())
        );

        let labels: Vec<_> = set.references.iter().map(|e| e.label.as_str()).collect();
        assert!(labels.contains(&LABEL_CITY));
        assert!(labels.contains(&LABEL_COMPANY));
        assert!(labels.contains(&LABEL_SKILL));
        assert!(labels.contains(&LABEL_STATE));

        let rel_types: Vec<_> = set
            .relationships
            .iter()
            .map(|r| r.rel_type.as_str())
            .collect();
        assert!(rel_types.contains(&REL_LIVES_IN));
        assert!(rel_types.contains(&REL_WORKED_AT));
        assert!(rel_types.contains(&REL_HAS_SKILL));
        assert!(rel_types.contains(&REL_HAS_STATE));
    }

    #[test]
    fn missing_id_is_a_skip_not_an_error() {
        let rec = record(&[("full_name", "Nobody")]);
        match mapper().transform(&rec) {
            Transformed::Skip(SkipReason::MissingKey(field)) => assert_eq!(field, "talent_id"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn malformed_episode_list_is_a_skip() {
        let rec = record(&[("talent_id", "p-1"), ("employment_history", "[oops")]);
        match mapper().transform(&rec) {
            Transformed::Skip(SkipReason::BadEmbeddedList(_)) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn status_flag_is_only_a_fallback() {
        // With episodes, the flag is ignored even when present and stale.
        let rec = record(&[
            ("talent_id", "p-1"),
            ("employment_status", "unemployed"),
            (
                "employment_history",
                r#"[{"company":"Acme","status":"employed","start_date":"2020-01-01"}]"#,
            ),
        ]);
        let Transformed::Set(set) = mapper().transform(&rec) else {
            panic!("row should transform");
        };
        let primary = set.primary.unwrap();
        assert_eq!(
            primary.props["current_status"],
            PropValue::Str("EMPLOYED".into())
        );

        // Without episodes, the flag fills in and says so.
        let rec = record(&[("talent_id", "p-2"), ("employment_status", "unemployed")]);
        let Transformed::Set(set) = mapper().transform(&rec) else {
            panic!("row should transform");
        };
        let primary = set.primary.unwrap();
        assert_eq!(
            primary.props["current_status"],
            PropValue::Str("UNEMPLOYED".into())
        );
        assert_eq!(primary.props["status_source"], PropValue::Str("flag".into()));
    }

    #[test]
    fn city_keys_are_normalized() {
        let rec_a = record(&[("talent_id", "p-1"), ("city", "Berlin")]);
        let rec_b = record(&[("talent_id", "p-2"), ("city", " berlin ")]);
        let Transformed::Set(a) = mapper().transform(&rec_a) else {
            panic!()
        };
        let Transformed::Set(b) = mapper().transform(&rec_b) else {
            panic!()
        };
        assert_eq!(a.references[0].key, b.references[0].key);
    }
}
