use crate::calc::{class_table, semester_grade, SemesterGrades};
use crate::error::GradeError;
use crate::model::{Semester, Student, SubjectType};
use crate::reconcile::expected_header;
use crate::sheet::{file_name, Cell, Sheet, Workbook};
use crate::store::{Gradebook, StudentFilter};

/// A workbook plus the file name it should be saved under.
#[derive(Debug, Clone)]
pub struct Export {
    pub file_name: String,
    pub workbook: Workbook,
}

const STUDENT_COLUMNS: [&str; 7] = ["반", "학생명", "학기", "과목명", "단위수", "원점수", "등급"];

fn fixed_2(v: f64) -> String {
    format!("{v:.2}")
}

fn fixed_2_or_dash(v: Option<f64>) -> Cell {
    Cell::text(v.map(fixed_2).unwrap_or_else(|| "-".to_string()))
}

/// Input template: header row plus one sample row, ready for `import.sheetPreview`.
pub fn template(book: &Gradebook, semester: Semester) -> Result<Export, GradeError> {
    let subjects = book.subjects(semester);
    if subjects.is_empty() {
        return Err(GradeError::NoSubjects(semester.label()));
    }
    let base = format!("{}_성적입력양식", semester.label());

    let mut header = vec![Cell::text("반"), Cell::text("학생명")];
    header.extend(subjects.iter().map(|s| Cell::text(expected_header(s))));
    let mut sample = vec![Cell::text("1"), Cell::text("홍길동")];
    sample.extend(subjects.iter().map(|s| match s.kind {
        SubjectType::Direct => Cell::text("3"),
        SubjectType::ZScore => Cell::text("85.5"),
    }));

    let mut sheet = Sheet::new(base.clone());
    sheet.push_row(header);
    sheet.push_row(sample);
    Ok(Export {
        file_name: file_name(&format!("{base}.xlsx")),
        workbook: Workbook::single(sheet),
    })
}

pub fn student(book: &Gradebook, student: &Student) -> Export {
    let blank = || vec![Cell::Empty; STUDENT_COLUMNS.len()];
    let mut sheet = Sheet::new("학생성적");
    sheet.push_row(STUDENT_COLUMNS.iter().map(|c| Cell::text(*c)).collect());
    sheet.push_row(vec![
        Cell::text(student.class_name.as_str()),
        Cell::text(student.name.as_str()),
        Cell::text("전체 학기"),
        Cell::text("학생 정보"),
        Cell::text("-"),
        Cell::text("-"),
        Cell::text("-"),
    ]);
    sheet.push_row(blank());

    for sem in Semester::ALL {
        let Some(records) = book.grades(&student.id, sem).filter(|r| !r.is_empty()) else {
            continue;
        };
        let mut marker = blank();
        marker[2] = Cell::text(sem.label());
        sheet.push_row(marker);

        // Stored order of records; orphaned records have no subject to name and are left out.
        for (subject_id, record) in records {
            let Some(subject) = book.subject(sem, subject_id) else {
                continue;
            };
            sheet.push_row(vec![
                Cell::Empty,
                Cell::Empty,
                Cell::Empty,
                Cell::text(subject.name.as_str()),
                Cell::Number(f64::from(subject.units)),
                Cell::text(record.raw.as_str()),
                Cell::opt_number(record.grade.map(|g| g as f64)),
            ]);
        }
        if let Some(total) = semester_grade(records.values()) {
            sheet.push_row(vec![
                Cell::Empty,
                Cell::Empty,
                Cell::Empty,
                Cell::text("총등급"),
                Cell::text("-"),
                Cell::text("-"),
                Cell::text(fixed_2(total)),
            ]);
        }
        sheet.push_row(blank());
    }

    Export {
        file_name: file_name(&format!("{}반_{}_성적.xlsx", student.class_name, student.name)),
        workbook: Workbook::single(sheet),
    }
}

/// Every configured semester as its own section, then both university composites.
pub fn class(book: &Gradebook, class_name: &str, year: Option<&str>) -> Result<Export, GradeError> {
    let class_name = class_name.trim();
    let members = book.students_matching(StudentFilter {
        year,
        class_name: Some(class_name),
        ..Default::default()
    });
    if class_name.is_empty() || members.is_empty() {
        return Err(GradeError::not_found("class", class_name));
    }

    let mut sheet = Sheet::new("전체성적");
    for sem in Semester::ALL {
        if book.subjects(sem).is_empty() {
            continue;
        }
        let table = class_table(book, class_name, sem, year);
        sheet.push_row(vec![Cell::text(format!("=== {} ===", sem.label()))]);

        let mut header = vec![Cell::text("학생명")];
        header.extend(
            table
                .columns
                .iter()
                .map(|c| Cell::text(format!("{} ({}단위)", c.name, c.units))),
        );
        header.push(Cell::text("총등급"));
        sheet.push_row(header);

        for row in &table.rows {
            let mut cells = vec![Cell::text(row.name.as_str())];
            cells.extend(row.grades.iter().map(|g| match g {
                Some(g) => Cell::Number(*g as f64),
                None => Cell::text("-"),
            }));
            cells.push(fixed_2_or_dash(row.semester_grade));
            sheet.push_row(cells);
        }
        sheet.push_blank();
    }

    sheet.push_row(vec![Cell::text("=== 대학별 등급 ===")]);
    sheet.push_row(vec![
        Cell::text("학생명"),
        Cell::text("A대학 등급"),
        Cell::text("B대학 등급"),
    ]);
    for member in &members {
        let grades = SemesterGrades::for_student(book, &member.id);
        sheet.push_row(vec![
            Cell::text(member.name.as_str()),
            fixed_2_or_dash(grades.university_a()),
            fixed_2_or_dash(grades.university_b()),
        ]);
    }

    Ok(Export {
        file_name: file_name(&format!("{class_name}반_성적.xlsx")),
        workbook: Workbook::single(sheet),
    })
}
