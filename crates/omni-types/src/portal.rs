//! Read-side portal records: profile, dashboard counters, attendance
//! roster, homework submissions.

use crate::serde_helpers::{lenient_opt_string, lenient_string};
use serde::{Deserialize, Serialize};

/// `profile/get-profile`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileResponse {
    #[serde(default)]
    pub teach_info: Option<TeacherInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeacherInfo {
    #[serde(rename = "fio_teach", default, deserialize_with = "lenient_opt_string")]
    pub full_name: Option<String>,
    #[serde(rename = "photo_pas", default, deserialize_with = "lenient_opt_string")]
    pub photo_url: Option<String>,
}

/// `dashboard/get-counters`: work waiting for the teacher
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounters {
    #[serde(rename = "dzStud", default)]
    pub homework: HomeworkCounter,
    #[serde(rename = "reviewsStud", default)]
    pub reviews: ReviewsDue,
    #[serde(rename = "counterNodDoneTask", default)]
    pub not_done_tasks: u32,
}

impl TaskCounters {
    pub fn new_homework(&self) -> u32 {
        self.homework.new_home_work
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeworkCounter {
    #[serde(default)]
    pub new_home_work: u32,
}

/// Students waiting for a review
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewsDue {
    #[serde(rename = "count_students", default)]
    pub count: u32,
    #[serde(rename = "students_list", default)]
    pub students: Vec<ReviewStudent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewStudent {
    #[serde(deserialize_with = "lenient_string")]
    pub id_stud: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub id_teach: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub id_form: String,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub date_last_comments: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name_spec: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub id_spec: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub id_streams: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub id_dir: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub dir_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name_streams: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub fio_stud: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name_tgroups: String,
}

/// `presents/get-presents`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentsResponse {
    #[serde(default)]
    pub cur_lenta: Option<i64>,
    #[serde(default)]
    pub students: Vec<PresentStudent>,
}

/// One row of a lesson's attendance roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentStudent {
    #[serde(deserialize_with = "lenient_string")]
    pub id_vizit: String,
    #[serde(deserialize_with = "lenient_string")]
    pub id_stud: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub fio_stud: String,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub photo_pas: Option<String>,
    /// Schedule entry the roster belongs to
    #[serde(deserialize_with = "lenient_string")]
    pub id_rasp: String,
    /// 0 absent, 1 present, 2 late
    #[serde(default)]
    pub was: Option<i64>,
    /// Control work mark
    #[serde(default)]
    pub mark2: Option<i64>,
    /// Classwork mark
    #[serde(default)]
    pub mark4: Option<i64>,
    #[serde(default)]
    pub prize: Option<i64>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub group: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub theme: Option<String>,
}

/// `homework/get-new-homeworks`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeworkListResponse {
    #[serde(default)]
    pub homework: Vec<Homework>,
}

/// A student's homework submission awaiting a grade
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Homework {
    /// Submission id
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub fio_stud: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub group: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub theme: String,
    #[serde(default)]
    pub mark: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub id_stud: String,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub file_teach: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub teach_date: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub lenta: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub stud_date: String,
    #[serde(rename = "teach_Dz", default, deserialize_with = "lenient_opt_string")]
    pub teach_dz: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub answer_text: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub download_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub download_url_stud: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub ospr: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub bad_dz: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub coment: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub disabled: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub tmp_file: Option<String>,
    /// Assignment id
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub id_domzad: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub st_filename: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub dzs_answer_status: Option<String>,
}
