//! Student reviews

use omni_types::ReviewStudent;
use serde_json::json;

use crate::error::CoreError;
use crate::session::PortalRequest;

pub const SEND_REVIEW_PATH: &str = "reviews/send-review";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewComment {
    pub student_id: String,
    pub specialization_id: String,
    pub comment: String,
}

impl ReviewComment {
    pub fn new(student: &ReviewStudent, comment: impl Into<String>) -> Result<Self, CoreError> {
        let comment = comment.into();
        if comment.trim().is_empty() {
            return Err(CoreError::InvalidMutation {
                message: format!("empty review for student {}", student.id_stud),
            });
        }
        Ok(Self {
            student_id: student.id_stud.clone(),
            specialization_id: student.id_spec.clone(),
            comment,
        })
    }

    pub fn request(&self) -> PortalRequest {
        PortalRequest::mutation(
            SEND_REVIEW_PATH,
            json!({
                "id_stud": self.student_id,
                "comment": self.comment,
                "id_spec": self.specialization_id,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student() -> ReviewStudent {
        serde_json::from_str(r#"{"id_stud": "501", "id_spec": "12", "fio_stud": "Ivanova A."}"#)
            .unwrap()
    }

    #[test]
    fn test_review_body() {
        let review = ReviewComment::new(&student(), "Solid progress").unwrap();
        let req = review.request();
        assert_eq!(req.path, SEND_REVIEW_PATH);

        let body = req.body.unwrap();
        assert_eq!(body["id_stud"], "501");
        assert_eq!(body["id_spec"], "12");
        assert_eq!(body["comment"], "Solid progress");
    }

    #[test]
    fn test_blank_review_rejected() {
        let err = ReviewComment::new(&student(), "   ").unwrap_err();
        assert!(matches!(err, CoreError::InvalidMutation { .. }));
    }
}
