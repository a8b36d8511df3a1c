//! Bulk import: pasted text or spreadsheet rows become pending rows, which are previewed against
//! the gradebook and only written on an explicit commit.

use crate::band::parse_finite;
use crate::error::GradeError;
use crate::model::{Semester, StudentId, Subject, SubjectId};
use crate::store::{Gradebook, StudentFilter};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Substrings that only show up when someone copied console output or page markup instead of
/// spreadsheet cells.
pub const LOG_TEXT_MARKERS: &[&str] = &[
    "script.js:",
    "행 생성 완료:",
    "성공적으로 추가됨",
    "<tr class=",
    "<td",
    // Our own stderr lines: RFC 3339 timestamp then the padded level.
    "Z TRACE ",
    "Z DEBUG ",
    "Z  INFO ",
    "Z  WARN ",
    "Z ERROR ",
];

const MIN_ROWS: usize = 2;
const MIN_ROW_CELLS: usize = 2;
const MIN_HEADER_CELLS: usize = 3;

pub fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Non-blank clipboard rows after newline normalization.
pub fn split_clipboard_rows(text: &str) -> Vec<String> {
    normalize_newlines(text)
        .split('\n')
        .filter(|row| !row.trim().is_empty())
        .map(str::to_string)
        .collect()
}

pub fn sniff_log_text(text: &str) -> bool {
    if LOG_TEXT_MARKERS.iter().any(|m| text.contains(m)) {
        return true;
    }
    !split_clipboard_rows(text).iter().any(|row| row.contains('\t'))
}

/// Header label a spreadsheet column must carry to bind to `subject`.
pub fn expected_header(subject: &Subject) -> String {
    format!("{} ({})", subject.name, subject.kind.input_label())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingCell {
    pub subject_id: SubjectId,
    pub raw: String,
}

/// One staged student. `values` only holds cells that passed numeric acceptance.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRow {
    pub line: usize,
    #[serde(rename = "class")]
    pub class_name: String,
    pub name: String,
    pub values: Vec<PendingCell>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowWarning {
    pub line: usize,
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseOutcome {
    pub rows_total: usize,
    pub rows: Vec<PendingRow>,
    pub skipped_rows: usize,
    pub skipped_cells: usize,
    pub warnings: Vec<RowWarning>,
}

impl ParseOutcome {
    pub fn accepted(&self) -> usize {
        self.rows.len()
    }

    fn skip_row(&mut self, line: usize, code: &'static str, message: String) {
        tracing::debug!(line, code, "import row skipped");
        self.skipped_rows += 1;
        self.warnings.push(RowWarning {
            line,
            code,
            message,
        });
    }

    // `columns` binds a cell index to the subject it feeds.
    fn take_row(&mut self, line: usize, cells: &[&str], columns: &[(usize, &Subject)]) {
        if cells.len() < MIN_ROW_CELLS {
            self.skip_row(
                line,
                "short_row",
                format!("expected class and name, found {} cell(s)", cells.len()),
            );
            return;
        }
        let class_name = cells[0].trim();
        let name = cells[1].trim();
        if class_name.is_empty() || name.is_empty() {
            self.skip_row(line, "missing_identity", "class or name is empty".to_string());
            return;
        }

        let mut values = Vec::new();
        for (col, subject) in columns {
            let raw = cells.get(*col).map(|c| c.trim()).unwrap_or("");
            if raw.is_empty() {
                continue;
            }
            if parse_finite(raw).is_some() {
                values.push(PendingCell {
                    subject_id: subject.id.clone(),
                    raw: raw.to_string(),
                });
            } else {
                tracing::debug!(line, subject = %subject.id, "non-numeric cell left empty");
                self.skipped_cells += 1;
                self.warnings.push(RowWarning {
                    line,
                    code: "bad_cell",
                    message: format!("{}: '{}' is not a number", subject.name, raw),
                });
            }
        }

        self.rows.push(PendingRow {
            line,
            class_name: class_name.to_string(),
            name: name.to_string(),
            values,
        });
    }
}

/// Clipboard rows: class, name, then one cell per subject in the semester's current order.
pub fn parse_pasted_text(
    semester: Semester,
    text: &str,
    subjects: &[Subject],
) -> Result<ParseOutcome, GradeError> {
    if sniff_log_text(text) {
        return Err(GradeError::LooksLikeLog);
    }
    let rows = split_clipboard_rows(text);
    if rows.len() < MIN_ROWS {
        return Err(GradeError::TooFewRows(rows.len()));
    }
    if subjects.is_empty() {
        return Err(GradeError::NoSubjects(semester.label()));
    }

    let columns: Vec<(usize, &Subject)> = subjects
        .iter()
        .enumerate()
        .map(|(i, s)| (i + 2, s))
        .collect();
    let mut out = ParseOutcome {
        rows_total: rows.len(),
        ..Default::default()
    };
    for (i, row) in rows.iter().enumerate() {
        let cells: Vec<&str> = row.split('\t').collect();
        out.take_row(i + 1, &cells, &columns);
    }
    Ok(out)
}

/// Spreadsheet rows (header first). Subject columns are found by their header label; a subject
/// without a matching column is reported and left out.
pub fn parse_sheet_rows(
    semester: Semester,
    rows: &[Vec<String>],
    subjects: &[Subject],
) -> Result<ParseOutcome, GradeError> {
    if subjects.is_empty() {
        return Err(GradeError::NoSubjects(semester.label()));
    }
    let Some(header) = rows.first() else {
        return Err(GradeError::BadHeader);
    };
    if header.len() < MIN_HEADER_CELLS {
        return Err(GradeError::BadHeader);
    }
    let data: Vec<(usize, &Vec<String>)> = rows
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, r)| r.iter().any(|c| !c.trim().is_empty()))
        .collect();
    if data.is_empty() {
        return Err(GradeError::TooFewRows(1));
    }

    let mut out = ParseOutcome {
        rows_total: data.len(),
        ..Default::default()
    };
    let mut columns = Vec::new();
    for subject in subjects {
        let label = expected_header(subject);
        match header.iter().position(|h| h.trim() == label) {
            Some(col) => columns.push((col, subject)),
            None => out.warnings.push(RowWarning {
                line: 1,
                code: "missing_column",
                message: format!("no column headed '{label}'"),
            }),
        }
    }

    for (i, row) in data {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        out.take_row(i + 1, &cells, &columns);
    }
    Ok(out)
}

/// A row typed straight into the staging table; values are keyed by subject instead of column.
#[derive(Debug, Clone, Default)]
pub struct EnteredRow {
    pub class_name: String,
    pub name: String,
    pub values: Vec<(SubjectId, String)>,
}

pub fn parse_entered_rows(
    semester: Semester,
    first_line: usize,
    rows: &[EnteredRow],
    subjects: &[Subject],
) -> Result<ParseOutcome, GradeError> {
    if subjects.is_empty() {
        return Err(GradeError::NoSubjects(semester.label()));
    }
    let columns: Vec<(usize, &Subject)> = subjects
        .iter()
        .enumerate()
        .map(|(i, s)| (i + 2, s))
        .collect();
    let mut out = ParseOutcome {
        rows_total: rows.len(),
        ..Default::default()
    };

    for (i, row) in rows.iter().enumerate() {
        let line = first_line + i;
        for (subject_id, _) in &row.values {
            if !subjects.iter().any(|s| &s.id == subject_id) {
                out.skipped_cells += 1;
                out.warnings.push(RowWarning {
                    line,
                    code: "unknown_subject",
                    message: format!("subject {subject_id} is not part of {semester}"),
                });
            }
        }
        let mut cells = vec![row.class_name.as_str(), row.name.as_str()];
        cells.extend(subjects.iter().map(|s| {
            row.values
                .iter()
                .find(|(id, _)| id == &s.id)
                .map(|(_, raw)| raw.as_str())
                .unwrap_or("")
        }));
        out.take_row(line, &cells, &columns);
    }
    Ok(out)
}

/// Pending rows per semester, held in memory until committed or discarded.
#[derive(Debug, Default)]
pub struct Staging {
    pending: BTreeMap<Semester, Vec<PendingRow>>,
}

impl Staging {
    pub fn rows(&self, semester: Semester) -> &[PendingRow] {
        self.pending
            .get(&semester)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn replace(&mut self, semester: Semester, rows: Vec<PendingRow>) {
        self.pending.insert(semester, rows);
    }

    pub fn append(&mut self, semester: Semester, rows: Vec<PendingRow>) {
        self.pending.entry(semester).or_default().extend(rows);
    }

    pub fn remove(&mut self, semester: Semester, index: usize) -> Result<PendingRow, GradeError> {
        let rows = self.pending.entry(semester).or_default();
        if index >= rows.len() {
            return Err(GradeError::bad_params(format!(
                "no pending row at index {index} (have {})",
                rows.len()
            )));
        }
        Ok(rows.remove(index))
    }

    pub fn discard(&mut self, semester: Semester) -> usize {
        self.pending.remove(&semester).map(|r| r.len()).unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RowMatch {
    New,
    Matched {
        #[serde(rename = "studentId")]
        student_id: StudentId,
    },
    Duplicate {
        #[serde(rename = "firstLine")]
        first_line: usize,
    },
    Ambiguous {
        candidates: Vec<StudentId>,
    },
}

/// Match status of each pending row against the gradebook and the rows before it.
pub fn classify(book: &Gradebook, semester: Semester, rows: &[PendingRow]) -> Vec<RowMatch> {
    let existing = book.students_matching(StudentFilter {
        semester: Some(semester),
        ..Default::default()
    });
    let mut seen: HashMap<(&str, &str), usize> = HashMap::new();
    rows.iter()
        .map(|row| {
            let key = (row.class_name.as_str(), row.name.as_str());
            if let Some(first_line) = seen.get(&key) {
                return RowMatch::Duplicate {
                    first_line: *first_line,
                };
            }
            seen.insert(key, row.line);
            let mut candidates: Vec<StudentId> = existing
                .iter()
                .filter(|s| s.class_name == row.class_name && s.name == row.name)
                .map(|s| s.id.clone())
                .collect();
            match candidates.len() {
                0 => RowMatch::New,
                1 => RowMatch::Matched {
                    student_id: candidates.remove(0),
                },
                _ => RowMatch::Ambiguous { candidates },
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRow {
    pub index: usize,
    #[serde(flatten)]
    pub row: PendingRow,
    #[serde(rename = "match")]
    pub status: RowMatch,
}

pub fn preview(book: &Gradebook, semester: Semester, rows: &[PendingRow]) -> Vec<PreviewRow> {
    classify(book, semester, rows)
        .into_iter()
        .zip(rows)
        .enumerate()
        .map(|(index, (status, row))| PreviewRow {
            index,
            row: row.clone(),
            status,
        })
        .collect()
}

/// Edits to a student already in the gradebook. Blank cells leave stored grades alone.
#[derive(Debug, Clone)]
pub struct ExistingRowEdit {
    pub student_id: StudentId,
    pub class_name: String,
    pub name: String,
    pub values: Vec<PendingCell>,
}

/// Staging index -> student a pending row should merge into, chosen by the client.
pub type RowTargets = BTreeMap<usize, StudentId>;

/// An ambiguous row left out of a commit, with everything needed to resolve it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnresolvedRow {
    pub index: usize,
    #[serde(flatten)]
    pub row: PendingRow,
    pub candidates: Vec<StudentId>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitSummary {
    pub created: Vec<StudentId>,
    pub merged: usize,
    pub updated: usize,
    pub skipped_rows: usize,
    pub cells_written: usize,
    pub skipped_cells: usize,
    pub warnings: Vec<RowWarning>,
    pub unresolved: Vec<UnresolvedRow>,
}

impl CommitSummary {
    fn skip_row(&mut self, line: usize, code: &'static str, message: String) {
        self.skipped_rows += 1;
        self.warnings.push(RowWarning {
            line,
            code,
            message,
        });
    }

    fn write_cells(
        &mut self,
        book: &mut Gradebook,
        semester: Semester,
        line: usize,
        student: &StudentId,
        cells: &[PendingCell],
    ) -> Result<(), GradeError> {
        for cell in cells {
            if cell.raw.trim().is_empty() {
                continue;
            }
            if book.subject(semester, &cell.subject_id).is_none() {
                self.skipped_cells += 1;
                self.warnings.push(RowWarning {
                    line,
                    code: "subject_removed",
                    message: format!("subject {} no longer exists", cell.subject_id),
                });
                continue;
            }
            match book.save_grade(student, semester, &cell.subject_id, &cell.raw)? {
                Some(_) => self.cells_written += 1,
                None => {
                    self.skipped_cells += 1;
                    self.warnings.push(RowWarning {
                        line,
                        code: "bad_cell",
                        message: format!("'{}' is not a number", cell.raw.trim()),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Writes staged rows and existing-row edits into the gradebook.
///
/// New rows create students; rows matching exactly one student of the semester merge into it;
/// rows with an entry in `targets` merge into that student whatever their match. Duplicates
/// within the batch are skipped. Ambiguous rows without a target are skipped and returned in
/// `unresolved`. Nothing is written when the semester has no subjects.
pub fn commit(
    book: &mut Gradebook,
    semester: Semester,
    pending: &[PendingRow],
    targets: &RowTargets,
    existing: &[ExistingRowEdit],
) -> Result<CommitSummary, GradeError> {
    if book.subjects(semester).is_empty() {
        return Err(GradeError::NoSubjects(semester.label()));
    }
    if let Some(index) = targets.keys().find(|i| **i >= pending.len()) {
        return Err(GradeError::bad_params(format!(
            "no pending row at index {index} (have {})",
            pending.len()
        )));
    }

    let statuses = classify(book, semester, pending);
    let mut summary = CommitSummary::default();

    for (index, (row, status)) in pending.iter().zip(statuses).enumerate() {
        if let Some(target) = targets.get(&index) {
            if book.student(target).is_none() {
                let e = GradeError::not_found("student", target.as_str());
                summary.skip_row(row.line, e.code(), e.to_string());
                continue;
            }
            summary.write_cells(book, semester, row.line, target, &row.values)?;
            summary.merged += 1;
            continue;
        }
        match status {
            RowMatch::New => {
                let id = book.add_student(semester, &row.class_name, &row.name)?;
                summary.write_cells(book, semester, row.line, &id, &row.values)?;
                summary.created.push(id);
            }
            RowMatch::Matched { student_id } => {
                summary.write_cells(book, semester, row.line, &student_id, &row.values)?;
                summary.merged += 1;
            }
            RowMatch::Duplicate { first_line } => summary.skip_row(
                row.line,
                "duplicate",
                format!(
                    "{} {} already appears on line {}",
                    row.class_name, row.name, first_line
                ),
            ),
            RowMatch::Ambiguous { candidates } => {
                summary.skip_row(
                    row.line,
                    "ambiguous",
                    format!(
                        "{} {} matches {} existing students",
                        row.class_name,
                        row.name,
                        candidates.len()
                    ),
                );
                summary.unresolved.push(UnresolvedRow {
                    index,
                    row: row.clone(),
                    candidates,
                });
            }
        }
    }

    for (i, edit) in existing.iter().enumerate() {
        // Existing edits are numbered after the staged rows in warnings.
        let line = pending.len() + i + 1;
        match book.update_student(&edit.student_id, &edit.class_name, &edit.name) {
            Ok(()) => {}
            Err(e @ (GradeError::NotFound { .. } | GradeError::BadParams(_))) => {
                summary.skip_row(line, e.code(), e.to_string());
                continue;
            }
            Err(e) => return Err(e),
        }
        summary.write_cells(book, semester, line, &edit.student_id, &edit.values)?;
        summary.updated += 1;
    }

    tracing::info!(
        semester = %semester,
        created = summary.created.len(),
        merged = summary.merged,
        updated = summary.updated,
        skipped_rows = summary.skipped_rows,
        cells_written = summary.cells_written,
        unresolved = summary.unresolved.len(),
        "import committed"
    );
    Ok(summary)
}
