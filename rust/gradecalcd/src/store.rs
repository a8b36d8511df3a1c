use crate::band::{parse_finite, parse_int_prefix, score_to_z_band};
use crate::db::BlobStore;
use crate::error::GradeError;
use crate::model::{
    GradeRecord, Semester, Student, StudentId, Subject, SubjectId, SubjectType, ZScoreSetting,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Key of the single blob the whole gradebook is saved under.
pub const STORAGE_KEY: &str = "gradeCalculatorData";

pub type SemesterGrades = BTreeMap<SubjectId, GradeRecord>;
pub type StudentGrades = BTreeMap<Semester, SemesterGrades>;

#[derive(Debug, Clone)]
pub struct NewSubject {
    pub name: String,
    pub units: u32,
    pub kind: SubjectType,
    pub z_score: Option<ZScoreSetting>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StudentFilter<'a> {
    pub semester: Option<Semester>,
    pub year: Option<&'a str>,
    pub class_name: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gradebook {
    subjects: BTreeMap<Semester, Vec<Subject>>,
    z_score_settings: BTreeMap<Semester, BTreeMap<SubjectId, ZScoreSetting>>,
    students: Vec<Student>,
    grades: BTreeMap<StudentId, StudentGrades>,
}

impl Default for Gradebook {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StoredWorldRef<'a> {
    subjects: &'a BTreeMap<Semester, Vec<Subject>>,
    students: &'a [Student],
    grades: &'a BTreeMap<StudentId, StudentGrades>,
    z_score_settings: &'a BTreeMap<Semester, BTreeMap<SubjectId, ZScoreSetting>>,
}

type LooseStudentGrades = BTreeMap<String, Option<BTreeMap<String, serde_json::Value>>>;

// Loose shape for loading: every level may be missing or null, and semester keys are plain
// strings so documents from older builds don't fail on one bad entry.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct StoredWorld {
    subjects: Option<BTreeMap<String, Option<Vec<serde_json::Value>>>>,
    students: Option<Vec<serde_json::Value>>,
    grades: Option<BTreeMap<String, Option<LooseStudentGrades>>>,
    z_score_settings: Option<BTreeMap<String, Option<BTreeMap<String, serde_json::Value>>>>,
}

impl Gradebook {
    pub fn new() -> Self {
        Self {
            subjects: Semester::ALL.iter().map(|s| (*s, Vec::new())).collect(),
            z_score_settings: BTreeMap::new(),
            students: Vec::new(),
            grades: BTreeMap::new(),
        }
    }

    pub fn subjects(&self, semester: Semester) -> &[Subject] {
        self.subjects
            .get(&semester)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn subject(&self, semester: Semester, id: &SubjectId) -> Option<&Subject> {
        self.subjects(semester).iter().find(|s| &s.id == id)
    }

    pub fn z_score_setting(&self, semester: Semester, id: &SubjectId) -> Option<&ZScoreSetting> {
        self.z_score_settings.get(&semester).and_then(|m| m.get(id))
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn student(&self, id: &StudentId) -> Option<&Student> {
        self.students.iter().find(|s| &s.id == id)
    }

    pub fn grades(&self, student: &StudentId, semester: Semester) -> Option<&SemesterGrades> {
        self.grades.get(student).and_then(|m| m.get(&semester))
    }

    pub fn grade_record(
        &self,
        student: &StudentId,
        semester: Semester,
        subject: &SubjectId,
    ) -> Option<&GradeRecord> {
        self.grades(student, semester).and_then(|m| m.get(subject))
    }

    pub fn add_subject(
        &mut self,
        semester: Semester,
        new: NewSubject,
    ) -> Result<SubjectId, GradeError> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(GradeError::bad_params("subject name is required"));
        }
        if new.units == 0 {
            return Err(GradeError::bad_params("units must be a positive integer"));
        }
        let setting = match new.kind {
            SubjectType::Direct => None,
            SubjectType::ZScore => match new.z_score {
                Some(z) if z.is_valid() => Some(z),
                _ => {
                    return Err(GradeError::bad_params(
                        "z-score subjects need a finite mean and a std greater than 0",
                    ))
                }
            },
        };

        let kind = new.kind;
        let subject = Subject {
            id: SubjectId::generate(),
            name: name.to_string(),
            units: new.units,
            kind,
        };
        let id = subject.id.clone();
        self.subjects.entry(semester).or_default().push(subject);
        if let Some(z) = setting {
            self.z_score_settings
                .entry(semester)
                .or_default()
                .insert(id.clone(), z);
        }
        tracing::info!(
            semester = %semester,
            subject = %id,
            subject_name = name,
            kind = kind.code(),
            "subject added"
        );
        Ok(id)
    }

    /// Drops the subject and its z-score setting. Grade records that point at it stay stored.
    pub fn remove_subject(
        &mut self,
        semester: Semester,
        id: &SubjectId,
    ) -> Result<Subject, GradeError> {
        let list = self.subjects.entry(semester).or_default();
        let Some(pos) = list.iter().position(|s| &s.id == id) else {
            return Err(GradeError::not_found("subject", id.as_str()));
        };
        let removed = list.remove(pos);
        if let Some(settings) = self.z_score_settings.get_mut(&semester) {
            settings.remove(id);
        }
        tracing::info!(semester = %semester, subject = %id, "subject removed");
        Ok(removed)
    }

    /// Remove-then-insert move. `to_index` may equal the list length to move to the end.
    pub fn reorder_subjects(
        &mut self,
        semester: Semester,
        from_index: usize,
        to_index: usize,
    ) -> Result<(), GradeError> {
        let list = self.subjects.entry(semester).or_default();
        if from_index >= list.len() || to_index > list.len() {
            return Err(GradeError::bad_params(format!(
                "reorder index out of range: {} -> {} (len {})",
                from_index,
                to_index,
                list.len()
            )));
        }
        if from_index == to_index {
            return Ok(());
        }
        let moved = list.remove(from_index);
        let to_index = to_index.min(list.len());
        list.insert(to_index, moved);
        Ok(())
    }

    pub fn add_student(
        &mut self,
        semester: Semester,
        class_name: &str,
        name: &str,
    ) -> Result<StudentId, GradeError> {
        let class_name = class_name.trim();
        let name = name.trim();
        if class_name.is_empty() || name.is_empty() {
            return Err(GradeError::bad_params("class and student name are required"));
        }
        let student = Student {
            id: StudentId::generate(),
            grade: semester.year().to_string(),
            class_name: class_name.to_string(),
            name: name.to_string(),
            semester,
        };
        let id = student.id.clone();
        self.students.push(student);
        Ok(id)
    }

    pub fn update_student(
        &mut self,
        id: &StudentId,
        class_name: &str,
        name: &str,
    ) -> Result<(), GradeError> {
        let class_name = class_name.trim();
        let name = name.trim();
        if class_name.is_empty() || name.is_empty() {
            return Err(GradeError::bad_params("class and student name are required"));
        }
        let Some(student) = self.students.iter_mut().find(|s| &s.id == id) else {
            return Err(GradeError::not_found("student", id.as_str()));
        };
        student.class_name = class_name.to_string();
        student.name = name.to_string();
        Ok(())
    }

    pub fn remove_student(&mut self, id: &StudentId) -> Result<Student, GradeError> {
        let Some(pos) = self.students.iter().position(|s| &s.id == id) else {
            return Err(GradeError::not_found("student", id.as_str()));
        };
        let removed = self.students.remove(pos);
        self.grades.remove(id);
        Ok(removed)
    }

    /// Batch delete; ids that don't exist are ignored. Returns how many students went away.
    pub fn remove_students(&mut self, ids: &[StudentId]) -> usize {
        let wanted: HashSet<&StudentId> = ids.iter().collect();
        let before = self.students.len();
        self.students.retain(|s| !wanted.contains(&s.id));
        for id in &wanted {
            self.grades.remove(*id);
        }
        before - self.students.len()
    }

    /// Band for an already-accepted numeric cell, or `None` when it can't be determined.
    pub fn derive_grade(&self, semester: Semester, subject: &Subject, raw: &str) -> Option<i64> {
        match subject.kind {
            SubjectType::Direct => parse_int_prefix(raw),
            SubjectType::ZScore => {
                let score = parse_finite(raw)?;
                let z = self.z_score_setting(semester, &subject.id)?;
                score_to_z_band(score, z.mean, z.std).map(i64::from)
            }
        }
    }

    fn write_grade(
        &mut self,
        student: &StudentId,
        semester: Semester,
        subject: &Subject,
        raw: &str,
    ) -> GradeRecord {
        let record = GradeRecord {
            raw: raw.trim().to_string(),
            grade: self.derive_grade(semester, subject, raw),
            units: subject.units,
        };
        self.grades
            .entry(student.clone())
            .or_default()
            .entry(semester)
            .or_default()
            .insert(subject.id.clone(), record.clone());
        record
    }

    /// Writes one cell. Empty or non-numeric input is ignored (`Ok(None)`); a z-score subject
    /// without a usable setting stores the raw value with an indeterminate grade.
    pub fn save_grade(
        &mut self,
        student: &StudentId,
        semester: Semester,
        subject: &SubjectId,
        raw: &str,
    ) -> Result<Option<GradeRecord>, GradeError> {
        if self.student(student).is_none() {
            return Err(GradeError::not_found("student", student.as_str()));
        }
        let Some(subject) = self.subject(semester, subject).cloned() else {
            return Err(GradeError::not_found("subject", subject.as_str()));
        };
        if parse_finite(raw).is_none() {
            return Ok(None);
        }
        Ok(Some(self.write_grade(student, semester, &subject, raw)))
    }

    /// Single-record form save: everything is validated before anything is written.
    pub fn save_grades(
        &mut self,
        student: &StudentId,
        semester: Semester,
        values: &[(SubjectId, String)],
    ) -> Result<usize, GradeError> {
        if self.student(student).is_none() {
            return Err(GradeError::not_found("student", student.as_str()));
        }
        if self.subjects(semester).is_empty() {
            return Err(GradeError::NoSubjects(semester.label()));
        }

        let mut accepted: Vec<(Subject, &str)> = Vec::new();
        for (subject_id, raw) in values {
            if raw.trim().is_empty() {
                continue;
            }
            let Some(subject) = self.subject(semester, subject_id) else {
                return Err(GradeError::not_found("subject", subject_id.as_str()));
            };
            if parse_finite(raw).is_none() {
                return Err(GradeError::bad_params(format!(
                    "{}: '{}' is not a number",
                    subject.name,
                    raw.trim()
                )));
            }
            if subject.kind == SubjectType::ZScore
                && !self
                    .z_score_setting(semester, &subject.id)
                    .map(ZScoreSetting::is_valid)
                    .unwrap_or(false)
            {
                return Err(GradeError::MissingZScore {
                    subject: subject.name.clone(),
                });
            }
            accepted.push((subject.clone(), raw.as_str()));
        }
        if accepted.is_empty() {
            return Err(GradeError::bad_params("enter at least one grade"));
        }

        for (subject, raw) in &accepted {
            self.write_grade(student, semester, subject, raw);
        }
        Ok(accepted.len())
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn students_matching(&self, filter: StudentFilter<'_>) -> Vec<&Student> {
        self.students
            .iter()
            .filter(|s| filter.semester.map(|sem| s.semester == sem).unwrap_or(true))
            .filter(|s| filter.year.map(|y| s.in_school_year(y)).unwrap_or(true))
            .filter(|s| {
                filter
                    .class_name
                    .map(|c| s.class_name == c.trim())
                    .unwrap_or(true)
            })
            .collect()
    }

    pub fn find_student(
        &self,
        year: Option<&str>,
        class_name: &str,
        name: &str,
    ) -> Option<&Student> {
        let class_name = class_name.trim();
        let name = name.trim();
        self.students
            .iter()
            .filter(|s| year.map(|y| s.in_school_year(y)).unwrap_or(true))
            .find(|s| s.class_name == class_name && s.name == name)
    }

    /// Distinct class labels in first-seen order.
    pub fn classes(&self, year: Option<&str>) -> Vec<String> {
        let mut seen = HashSet::new();
        self.students
            .iter()
            .filter(|s| year.map(|y| s.in_school_year(y)).unwrap_or(true))
            .filter(|s| seen.insert(s.class_name.as_str()))
            .map(|s| s.class_name.clone())
            .collect()
    }

    pub fn to_json(&self) -> Result<String, GradeError> {
        Ok(serde_json::to_string(&StoredWorldRef {
            subjects: &self.subjects,
            students: &self.students,
            grades: &self.grades,
            z_score_settings: &self.z_score_settings,
        })?)
    }

    /// Parses a stored document. Entries that can't be understood are dropped and reported in
    /// the returned warnings; a document that isn't JSON at all is an error.
    pub fn from_json(text: &str) -> Result<(Self, Vec<String>), GradeError> {
        let raw: StoredWorld = serde_json::from_str(text)?;
        let mut book = Self::new();
        let mut warnings = Vec::new();

        for (key, list) in raw.subjects.unwrap_or_default() {
            let Some(semester) = Semester::parse(&key) else {
                warnings.push(format!("dropped subjects for unknown semester '{key}'"));
                continue;
            };
            for value in list.unwrap_or_default() {
                match serde_json::from_value::<Subject>(value) {
                    Ok(subject) => book.subjects.entry(semester).or_default().push(subject),
                    Err(e) => warnings.push(format!("dropped subject in {semester}: {e}")),
                }
            }
        }

        for (key, settings) in raw.z_score_settings.unwrap_or_default() {
            let Some(semester) = Semester::parse(&key) else {
                warnings.push(format!("dropped z-score settings for unknown semester '{key}'"));
                continue;
            };
            let slot = book.z_score_settings.entry(semester).or_default();
            for (subject_id, value) in settings.unwrap_or_default() {
                match serde_json::from_value::<ZScoreSetting>(value) {
                    Ok(z) => {
                        slot.insert(SubjectId::from(subject_id), z);
                    }
                    Err(e) => warnings.push(format!(
                        "dropped z-score setting {semester}/{subject_id}: {e}"
                    )),
                }
            }
        }

        for value in raw.students.unwrap_or_default() {
            match serde_json::from_value::<Student>(value) {
                Ok(student) => book.students.push(student),
                Err(e) => warnings.push(format!("dropped student: {e}")),
            }
        }

        for (student_id, by_semester) in raw.grades.unwrap_or_default() {
            let student_id = StudentId::from(student_id);
            for (key, records) in by_semester.unwrap_or_default() {
                let Some(semester) = Semester::parse(&key) else {
                    warnings.push(format!(
                        "dropped grades of {student_id} for unknown semester '{key}'"
                    ));
                    continue;
                };
                for (subject_id, value) in records.unwrap_or_default() {
                    match serde_json::from_value::<GradeRecord>(value) {
                        Ok(record) => {
                            book.grades
                                .entry(student_id.clone())
                                .or_default()
                                .entry(semester)
                                .or_default()
                                .insert(SubjectId::from(subject_id), record);
                        }
                        Err(e) => warnings.push(format!(
                            "dropped grade {student_id}/{semester}/{subject_id}: {e}"
                        )),
                    }
                }
            }
        }

        Ok((book, warnings))
    }

    pub fn save(&self, store: &impl BlobStore) -> Result<(), GradeError> {
        store.set(STORAGE_KEY, &self.to_json()?)?;
        Ok(())
    }

    /// Reads the stored document; an empty slot yields a fresh gradebook.
    pub fn load(store: &impl BlobStore) -> Result<(Self, Vec<String>), GradeError> {
        match store.get(STORAGE_KEY)? {
            Some(text) => Self::from_json(&text),
            None => Ok((Self::new(), Vec::new())),
        }
    }
}
