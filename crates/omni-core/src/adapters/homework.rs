//! Homework grading

use omni_types::{Division, Homework};
use serde_json::{json, Value};

use super::attendance::validate_mark;
use crate::error::CoreError;
use crate::session::PortalRequest;

pub const SAVE_HOMEWORK_PATH: &str = "homework/save-homework";

/// The portal expects this teacher id on every saved submission
const HOMEWORK_TEACHER_ID: &str = "56";

/// Status code of a checked submission
const STATUS_CHECKED: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HomeworkGrade {
    pub key: String,
    pub homework: Homework,
    pub mark: Option<u8>,
    pub comment: Option<String>,
}

impl HomeworkGrade {
    pub fn new(
        key: String,
        division: Division,
        homework: Homework,
        mark: Option<u8>,
        comment: Option<String>,
    ) -> Result<Self, CoreError> {
        if let Some(mark) = mark {
            validate_mark(division, mark)?;
        }
        let comment = comment.filter(|c| !c.trim().is_empty());
        if mark.is_none() && comment.is_none() {
            return Err(CoreError::InvalidMutation {
                message: format!("homework {} needs a mark or a comment", homework.id),
            });
        }
        Ok(Self {
            key,
            homework,
            mark,
            comment,
        })
    }

    fn form(&self) -> Value {
        let hw = &self.homework;
        let mark = self.mark.map(|m| m.to_string());
        json!({
            "id_domzadstud": hw.id,
            "filename": hw.st_filename,
            "id_teach": HOMEWORK_TEACHER_ID,
            "id_stud": hw.id_stud,
            "time": hw.stud_date,
            "id_domzad": hw.id_domzad,
            "ospr": hw.ospr,
            "bad_dz": hw.bad_dz,
            "coment": self.comment,
            "fake_dz": "0",
            "mark": mark,
            "nlenta": hw.lenta,
            "date_vizit": hw.teach_date,
            "tmp_file": hw.tmp_file,
            "is_retake": "0",
            "is_system_delete": "0",
            "assessment_without_homework": "0",
            "id_domzad_teach": hw.teach_dz,
            "stud_stud": hw.id_stud,
            "comment_attach": null,
            "comment_attach_file": null,
            "disabled": hw.disabled,
            "automark": "0",
            "answer_text": hw.answer_text,
            "theme": hw.theme,
            "fio_stud": hw.fio_stud,
            "group": hw.group,
            "dzs_answer_status": hw.dzs_answer_status,
            "teach_filename": hw.file_teach,
            "download_url": hw.download_url,
            "download_url_stud": hw.download_url_stud,
            "status": STATUS_CHECKED,
            "old_comment": null,
            "marks": {
                &self.key: {
                    "id": hw.id_domzad,
                    "mark": mark,
                    "ospr": hw.ospr,
                    "stud": hw.id_stud,
                }
            },
        })
    }

    pub fn request(&self) -> PortalRequest {
        PortalRequest::mutation(SAVE_HOMEWORK_PATH, json!({ "HomeworkForm": self.form() }))
    }
}
