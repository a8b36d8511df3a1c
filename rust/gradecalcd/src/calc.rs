use crate::band::round_off_2_decimal;
use crate::error::GradeError;
use crate::model::{GradeRecord, Semester, Student, StudentId, SubjectId, SubjectType};
use crate::store::{Gradebook, StudentFilter};
use serde::Serialize;

/// Credit-weighted mean of the determinate bands, rounded to 2 decimals.
///
/// Weights come from each record's `units` snapshot, so records whose subject has since been
/// deleted still count.
pub fn semester_grade<'a, I>(records: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a GradeRecord>,
{
    let mut weighted: f64 = 0.0;
    let mut units: f64 = 0.0;
    for r in records {
        let Some(grade) = r.grade else {
            continue;
        };
        weighted += grade as f64 * f64::from(r.units);
        units += f64::from(r.units);
    }
    if units > 0.0 {
        Some(round_off_2_decimal(weighted / units))
    } else {
        None
    }
}

/// Semester grades of one student in fixed semester order.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SemesterGrades([Option<f64>; 5]);

impl SemesterGrades {
    #[cfg(test)]
    pub fn new(grades: [Option<f64>; 5]) -> Self {
        Self(grades)
    }

    pub fn for_student(book: &Gradebook, student: &StudentId) -> Self {
        let mut out = [None; 5];
        for sem in Semester::ALL {
            out[sem.index()] = book
                .grades(student, sem)
                .and_then(|records| semester_grade(records.values()));
        }
        Self(out)
    }

    pub fn get(&self, semester: Semester) -> Option<f64> {
        self.0[semester.index()]
    }

    fn available(&self) -> impl Iterator<Item = f64> + '_ {
        self.0.iter().flatten().copied()
    }

    /// 20/30/50 weighting over the three school years when all five semesters are graded,
    /// otherwise the plain mean of whatever is available.
    pub fn university_a(&self) -> Option<f64> {
        if let [Some(s11), Some(s12), Some(s21), Some(s22), Some(s31)] = self.0 {
            let a = ((s11 + s12) / 2.0) * 0.2 + ((s21 + s22) / 2.0) * 0.3 + s31 * 0.5;
            return Some(round_off_2_decimal(a));
        }
        let available: Vec<f64> = self.available().collect();
        if available.is_empty() {
            return None;
        }
        if available.len() == 1 {
            if let Some(last) = self.get(Semester::Y3S1) {
                return Some(round_off_2_decimal(last));
            }
        }
        let mean = available.iter().sum::<f64>() / available.len() as f64;
        Some(round_off_2_decimal(mean))
    }

    /// Half best-earlier-semester, half 3-1; without 3-1 the best available semester alone.
    pub fn university_b(&self) -> Option<f64> {
        let best = |grades: &[Option<f64>]| {
            grades
                .iter()
                .flatten()
                .copied()
                .fold(None, |acc: Option<f64>, g| Some(acc.map_or(g, |a| a.min(g))))
        };
        let b = match self.get(Semester::Y3S1) {
            Some(last) => match best(&self.0[..4]) {
                Some(earlier) => earlier * 0.5 + last * 0.5,
                None => last,
            },
            None => best(&self.0[..])?,
        };
        Some(round_off_2_decimal(b))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectLine {
    pub subject_id: SubjectId,
    pub name: String,
    pub units: u32,
    #[serde(rename = "type")]
    pub kind: SubjectType,
    pub raw: Option<String>,
    pub grade: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterReport {
    pub semester: Semester,
    pub label: &'static str,
    pub semester_grade: Option<f64>,
    pub subjects: Vec<SubjectLine>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentReport {
    pub student: Student,
    pub semesters: Vec<SemesterReport>,
    pub university_a: Option<f64>,
    pub university_b: Option<f64>,
}

pub fn student_report(book: &Gradebook, id: &StudentId) -> Result<StudentReport, GradeError> {
    let Some(student) = book.student(id) else {
        return Err(GradeError::not_found("student", id.as_str()));
    };
    let grades = SemesterGrades::for_student(book, id);

    let semesters = Semester::ALL
        .iter()
        .map(|&sem| SemesterReport {
            semester: sem,
            label: sem.label(),
            semester_grade: grades.get(sem),
            subjects: book
                .subjects(sem)
                .iter()
                .map(|s| {
                    let record = book.grade_record(id, sem, &s.id);
                    SubjectLine {
                        subject_id: s.id.clone(),
                        name: s.name.clone(),
                        units: s.units,
                        kind: s.kind,
                        raw: record.map(|r| r.raw.clone()),
                        grade: record.and_then(|r| r.grade),
                    }
                })
                .collect(),
        })
        .collect();

    Ok(StudentReport {
        student: student.clone(),
        semesters,
        university_a: grades.university_a(),
        university_b: grades.university_b(),
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassColumn {
    pub subject_id: SubjectId,
    pub name: String,
    pub units: u32,
    #[serde(rename = "type")]
    pub kind: SubjectType,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRow {
    pub student_id: StudentId,
    pub name: String,
    pub grades: Vec<Option<i64>>,
    pub semester_grade: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassTable {
    #[serde(rename = "class")]
    pub class_name: String,
    pub semester: Semester,
    pub label: &'static str,
    pub columns: Vec<ClassColumn>,
    pub rows: Vec<ClassRow>,
}

pub fn class_table(
    book: &Gradebook,
    class_name: &str,
    semester: Semester,
    year: Option<&str>,
) -> ClassTable {
    let columns: Vec<ClassColumn> = book
        .subjects(semester)
        .iter()
        .map(|s| ClassColumn {
            subject_id: s.id.clone(),
            name: s.name.clone(),
            units: s.units,
            kind: s.kind,
        })
        .collect();

    let rows = book
        .students_matching(StudentFilter {
            year,
            class_name: Some(class_name),
            ..Default::default()
        })
        .into_iter()
        .map(|student| ClassRow {
            student_id: student.id.clone(),
            name: student.name.clone(),
            grades: columns
                .iter()
                .map(|c| {
                    book.grade_record(&student.id, semester, &c.subject_id)
                        .and_then(|r| r.grade)
                })
                .collect(),
            semester_grade: book
                .grades(&student.id, semester)
                .and_then(|records| semester_grade(records.values())),
        })
        .collect();

    ClassTable {
        class_name: class_name.trim().to_string(),
        semester,
        label: semester.label(),
        columns,
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ZScoreSetting;
    use crate::store::NewSubject;

    fn record(grade: Option<i64>, units: u32) -> GradeRecord {
        GradeRecord {
            raw: grade.map(|g| g.to_string()).unwrap_or_default(),
            grade,
            units,
        }
    }

    #[test]
    fn semester_grade_is_credit_weighted() {
        let records = [record(Some(2), 3), record(Some(4), 1)];
        assert_eq!(semester_grade(&records), Some(2.5));

        let with_null = [record(Some(2), 3), record(None, 5), record(Some(4), 1)];
        assert_eq!(semester_grade(&with_null), Some(2.5));

        assert_eq!(semester_grade(&[record(None, 4)]), None);
        assert_eq!(semester_grade(std::iter::empty::<&GradeRecord>()), None);

        let thirds = [record(Some(1), 1), record(Some(2), 1), record(Some(2), 1)];
        assert_eq!(semester_grade(&thirds), Some(1.67));
    }

    #[test]
    fn university_a_weights_all_five_semesters() {
        let g = SemesterGrades::new([Some(2.0), Some(2.0), Some(3.0), Some(3.0), Some(1.0)]);
        assert_eq!(g.university_a(), Some(1.8));
    }

    #[test]
    fn university_a_falls_back_to_mean_or_last_semester() {
        let only_last = SemesterGrades::new([None, None, None, None, Some(2.37)]);
        assert_eq!(only_last.university_a(), Some(2.37));

        let partial = SemesterGrades::new([Some(2.0), None, Some(4.0), None, Some(3.5)]);
        assert_eq!(partial.university_a(), Some(3.17));

        assert_eq!(SemesterGrades::default().university_a(), None);
    }

    #[test]
    fn university_b_takes_best_earlier_semester() {
        let g = SemesterGrades::new([Some(3.0), Some(2.0), None, Some(2.5), Some(1.0)]);
        assert_eq!(g.university_b(), Some(1.5));

        let only_last = SemesterGrades::new([None, None, None, None, Some(1.25)]);
        assert_eq!(only_last.university_b(), Some(1.25));

        let no_last = SemesterGrades::new([Some(2.0), Some(4.0), Some(3.0), None, None]);
        assert_eq!(no_last.university_b(), Some(2.0));
        // Same data, A averages instead.
        assert_eq!(no_last.university_a(), Some(3.0));

        assert_eq!(SemesterGrades::default().university_b(), None);
    }

    #[test]
    fn reports_follow_store_state() {
        let mut book = Gradebook::new();
        let sem = Semester::Y1S1;
        let korean = book
            .add_subject(
                sem,
                NewSubject {
                    name: "국어".to_string(),
                    units: 3,
                    kind: SubjectType::Direct,
                    z_score: None,
                },
            )
            .expect("korean");
        let math = book
            .add_subject(
                sem,
                NewSubject {
                    name: "수학".to_string(),
                    units: 1,
                    kind: SubjectType::ZScore,
                    z_score: Some(ZScoreSetting {
                        mean: 70.0,
                        std: 10.0,
                    }),
                },
            )
            .expect("math");
        let a = book.add_student(sem, "1", "가").expect("a");
        let b = book.add_student(sem, "1", "나").expect("b");
        book.add_student(sem, "2", "다").expect("c");
        book.save_grade(&a, sem, &korean, "2").expect("save");
        book.save_grade(&a, sem, &math, "72").expect("save");

        let report = student_report(&book, &a).expect("report");
        assert_eq!(report.semesters.len(), 5);
        assert_eq!(report.semesters[0].semester_grade, Some(2.5));
        assert_eq!(report.semesters[0].subjects[1].grade, Some(4));
        assert_eq!(report.semesters[0].subjects[1].raw.as_deref(), Some("72"));
        assert_eq!(report.semesters[1].semester_grade, None);
        assert_eq!(report.university_a, Some(2.5));
        assert_eq!(report.university_b, Some(2.5));

        let table = class_table(&book, "1", sem, None);
        assert_eq!(table.columns.len(), 2);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].grades, vec![Some(2), Some(4)]);
        assert_eq!(table.rows[1].student_id, b);
        assert_eq!(table.rows[1].grades, vec![None, None]);
        assert_eq!(table.rows[1].semester_grade, None);

        assert_eq!(
            student_report(&book, &StudentId::from("nope"))
                .expect_err("missing")
                .code(),
            "not_found"
        );
    }
}
