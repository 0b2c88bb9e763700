//! Attendance, lesson marks and lesson topic

use omni_types::{Division, PresentStudent};
use serde_json::json;

use crate::error::CoreError;
use crate::session::PortalRequest;

pub const SET_WAS_PATH: &str = "presents/set-was";
pub const SET_MARK_PATH: &str = "presents/set-mark";
pub const SET_THEME_PATH: &str = "presents/set-theme";

/// Attendance value as the portal encodes it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Absent = 0,
    Present = 1,
    Late = 2,
}

impl Presence {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Which mark column of the roster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkKind {
    ControlWork = 2,
    Classwork = 4,
}

impl MarkKind {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Reject marks outside the division's scale
pub fn validate_mark(division: Division, mark: u8) -> Result<(), CoreError> {
    let max = division.max_mark();
    if mark == 0 || mark > max {
        return Err(CoreError::InvalidMutation {
            message: format!("{} marks are 1..={}, got {}", division, max, mark),
        });
    }
    Ok(())
}

/// Set one student's presence for a lesson
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitMark {
    pub key: String,
    pub schedule_id: String,
    pub visit_id: String,
    pub student_id: String,
    pub presence: Presence,
    pub theme: Option<String>,
}

impl VisitMark {
    pub fn new(key: String, student: &PresentStudent, presence: Presence) -> Self {
        Self {
            key,
            schedule_id: student.id_rasp.clone(),
            visit_id: student.id_vizit.clone(),
            student_id: student.id_stud.clone(),
            presence,
            theme: student.theme.clone(),
        }
    }

    pub fn request(&self) -> PortalRequest {
        PortalRequest::mutation(
            SET_WAS_PATH,
            json!({
                "visits": {
                    &self.key: {
                        "was": self.presence.code(),
                        "vizit": self.visit_id,
                        "id_stud": self.student_id,
                        "id_schedule": self.schedule_id,
                        "primary_teach": "0",
                        "theme": self.theme,
                    }
                },
                "schedule": self.schedule_id,
            }),
        )
    }
}

/// Set a control-work or classwork mark
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonMark {
    pub key: String,
    pub schedule_id: String,
    pub visit_id: String,
    pub kind: MarkKind,
    pub mark: u8,
}

impl LessonMark {
    pub fn new(
        key: String,
        division: Division,
        student: &PresentStudent,
        kind: MarkKind,
        mark: u8,
    ) -> Result<Self, CoreError> {
        validate_mark(division, mark)?;
        Ok(Self {
            key,
            schedule_id: student.id_rasp.clone(),
            visit_id: student.id_vizit.clone(),
            kind,
            mark,
        })
    }

    pub fn request(&self) -> PortalRequest {
        PortalRequest::mutation(
            SET_MARK_PATH,
            json!({
                "marks": {
                    &self.key: {
                        "type": self.kind.code(),
                        "mark": self.mark,
                        "vizit": self.visit_id,
                    }
                },
                "schedule": self.schedule_id,
            }),
        )
    }
}

/// Record the topic of a lesson
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicUpdate {
    pub schedule_id: String,
    /// YYYY-MM-DD
    pub date: String,
    pub period: u32,
    pub theme: String,
}

impl TopicUpdate {
    pub fn request(&self) -> PortalRequest {
        PortalRequest::mutation(
            SET_THEME_PATH,
            json!({
                "date": self.date,
                "lenta": self.period,
                "theme": self.theme,
                "schedule": self.schedule_id,
                "scheduleType": "lesson",
                "teach_type": 0,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student() -> PresentStudent {
        PresentStudent {
            id_vizit: "900".to_string(),
            id_stud: "501".to_string(),
            fio_stud: "Petrov P.".to_string(),
            photo_pas: None,
            id_rasp: "7788".to_string(),
            was: None,
            mark2: None,
            mark4: None,
            prize: None,
            group: Some("P-21".to_string()),
            theme: Some("Joins".to_string()),
        }
    }

    #[test]
    fn test_visit_body() {
        let req = VisitMark::new("k1".to_string(), &student(), Presence::Late).request();
        assert_eq!(req.path, SET_WAS_PATH);
        assert!(req.mutating);

        let body = req.body.unwrap();
        assert_eq!(body["schedule"], "7788");
        let visit = &body["visits"]["k1"];
        assert_eq!(visit["was"], 2);
        assert_eq!(visit["vizit"], "900");
        assert_eq!(visit["id_stud"], "501");
        assert_eq!(visit["id_schedule"], "7788");
        assert_eq!(visit["primary_teach"], "0");
        assert_eq!(visit["theme"], "Joins");
    }

    #[test]
    fn test_mark_body() {
        let mark = LessonMark::new(
            "k2".to_string(),
            Division::Academy,
            &student(),
            MarkKind::Classwork,
            11,
        )
        .unwrap();
        let body = mark.request().body.unwrap();
        assert_eq!(body["marks"]["k2"]["type"], 4);
        assert_eq!(body["marks"]["k2"]["mark"], 11);
        assert_eq!(body["marks"]["k2"]["vizit"], "900");
        assert_eq!(body["schedule"], "7788");
    }

    #[test]
    fn test_mark_range_per_division() {
        assert!(validate_mark(Division::Academy, 12).is_ok());
        assert!(validate_mark(Division::College, 5).is_ok());
        assert!(validate_mark(Division::College, 6).is_err());
        assert!(validate_mark(Division::Academy, 0).is_err());

        let err = LessonMark::new(
            "k".to_string(),
            Division::College,
            &student(),
            MarkKind::ControlWork,
            12,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidMutation { .. }));
    }

    #[test]
    fn test_topic_body() {
        let topic = TopicUpdate {
            schedule_id: "7788".to_string(),
            date: "2025-05-19".to_string(),
            period: 3,
            theme: "Indexes".to_string(),
        };
        let body = topic.request().body.unwrap();
        assert_eq!(body["lenta"], 3);
        assert_eq!(body["scheduleType"], "lesson");
        assert_eq!(body["teach_type"], 0);
    }
}
