//! Minimal spreadsheet I/O: OOXML parts are emitted with quick-xml into a zip package, and uploaded
//! `.xlsx`/`.xls` files are read through calamine.

use anyhow::Context;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::{Cursor, Seek, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const MAX_SHEET_NAME_CHARS: usize = 31;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    Empty,
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn opt_number(v: Option<f64>) -> Self {
        v.map(Self::Number).unwrap_or(Self::Empty)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<Cell>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Cell>) {
        self.rows.push(row);
    }

    pub fn push_blank(&mut self) {
        self.rows.push(Vec::new());
    }
}

#[derive(Debug, Clone, Default)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn single(sheet: Sheet) -> Self {
        Self {
            sheets: vec![sheet],
        }
    }
}

/// Excel refuses sheet names with `[]:*?/\` or longer than 31 characters.
pub fn sheet_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            c => c,
        })
        .take(MAX_SHEET_NAME_CHARS)
        .collect();
    if cleaned.trim().is_empty() {
        "Sheet1".to_string()
    } else {
        cleaned
    }
}

/// Replaces characters that can't appear in a file name on common platforms.
pub fn file_name(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

fn column_ref(mut index: usize) -> String {
    let mut out = Vec::new();
    loop {
        out.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

const SPREADSHEET_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const PACKAGE_RELS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const DOC_RELS_NS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

const NO_ATTRS: [(&str, &str); 0] = [];

type XmlWriter = Writer<Vec<u8>>;

/// One package part: XML declaration, then whatever `body` writes.
fn xml_part(body: impl FnOnce(&mut XmlWriter) -> anyhow::Result<()>) -> anyhow::Result<Vec<u8>> {
    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
    body(&mut writer)?;
    Ok(writer.into_inner())
}

fn open<'a, I>(writer: &mut XmlWriter, name: &str, attrs: I) -> anyhow::Result<()>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    writer.write_event(Event::Start(BytesStart::new(name).with_attributes(attrs)))?;
    Ok(())
}

fn close(writer: &mut XmlWriter, name: &str) -> anyhow::Result<()> {
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn empty<'a, I>(writer: &mut XmlWriter, name: &str, attrs: I) -> anyhow::Result<()>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    writer.write_event(Event::Empty(BytesStart::new(name).with_attributes(attrs)))?;
    Ok(())
}

fn text_element<'a, I>(
    writer: &mut XmlWriter,
    name: &str,
    attrs: I,
    text: &str,
) -> anyhow::Result<()>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    open(writer, name, attrs)?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    close(writer, name)
}

fn worksheet_xml(sheet: &Sheet) -> anyhow::Result<Vec<u8>> {
    xml_part(|w| {
        open(w, "worksheet", [("xmlns", SPREADSHEET_NS)])?;
        open(w, "sheetData", NO_ATTRS)?;
        for (r, row) in sheet.rows.iter().enumerate() {
            let row_no = (r + 1).to_string();
            open(w, "row", [("r", row_no.as_str())])?;
            for (c, cell) in row.iter().enumerate() {
                let reference = format!("{}{}", column_ref(c), row_no);
                match cell {
                    Cell::Text(s) => {
                        open(w, "c", [("r", reference.as_str()), ("t", "inlineStr")])?;
                        open(w, "is", NO_ATTRS)?;
                        text_element(w, "t", [("xml:space", "preserve")], s)?;
                        close(w, "is")?;
                        close(w, "c")?;
                    }
                    Cell::Number(v) if v.is_finite() => {
                        open(w, "c", [("r", reference.as_str())])?;
                        text_element(w, "v", NO_ATTRS, &v.to_string())?;
                        close(w, "c")?;
                    }
                    Cell::Number(_) | Cell::Empty => {}
                }
            }
            close(w, "row")?;
        }
        close(w, "sheetData")?;
        close(w, "worksheet")
    })
}

fn content_types_xml(sheet_count: usize) -> anyhow::Result<Vec<u8>> {
    xml_part(|w| {
        open(
            w,
            "Types",
            [("xmlns", "http://schemas.openxmlformats.org/package/2006/content-types")],
        )?;
        empty(
            w,
            "Default",
            [
                ("Extension", "rels"),
                ("ContentType", "application/vnd.openxmlformats-package.relationships+xml"),
            ],
        )?;
        empty(w, "Default", [("Extension", "xml"), ("ContentType", "application/xml")])?;
        empty(
            w,
            "Override",
            [
                ("PartName", "/xl/workbook.xml"),
                (
                    "ContentType",
                    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml",
                ),
            ],
        )?;
        empty(
            w,
            "Override",
            [
                ("PartName", "/docProps/core.xml"),
                ("ContentType", "application/vnd.openxmlformats-package.core-properties+xml"),
            ],
        )?;
        for n in 1..=sheet_count {
            let part = format!("/xl/worksheets/sheet{n}.xml");
            empty(
                w,
                "Override",
                [
                    ("PartName", part.as_str()),
                    (
                        "ContentType",
                        "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml",
                    ),
                ],
            )?;
        }
        close(w, "Types")
    })
}

fn root_rels_xml() -> anyhow::Result<Vec<u8>> {
    xml_part(|w| {
        open(w, "Relationships", [("xmlns", PACKAGE_RELS_NS)])?;
        empty(
            w,
            "Relationship",
            [
                ("Id", "rId1"),
                ("Type", "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument"),
                ("Target", "xl/workbook.xml"),
            ],
        )?;
        empty(
            w,
            "Relationship",
            [
                ("Id", "rId2"),
                ("Type", "http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties"),
                ("Target", "docProps/core.xml"),
            ],
        )?;
        close(w, "Relationships")
    })
}

fn workbook_xml(sheets: &[Sheet]) -> anyhow::Result<Vec<u8>> {
    xml_part(|w| {
        open(w, "workbook", [("xmlns", SPREADSHEET_NS), ("xmlns:r", DOC_RELS_NS)])?;
        open(w, "sheets", NO_ATTRS)?;
        for (i, sheet) in sheets.iter().enumerate() {
            let n = (i + 1).to_string();
            let rel = format!("rId{n}");
            let name = sheet_name(&sheet.name);
            empty(
                w,
                "sheet",
                [("name", name.as_str()), ("sheetId", n.as_str()), ("r:id", rel.as_str())],
            )?;
        }
        close(w, "sheets")?;
        close(w, "workbook")
    })
}

fn workbook_rels_xml(sheet_count: usize) -> anyhow::Result<Vec<u8>> {
    xml_part(|w| {
        open(w, "Relationships", [("xmlns", PACKAGE_RELS_NS)])?;
        for n in 1..=sheet_count {
            let id = format!("rId{n}");
            let target = format!("worksheets/sheet{n}.xml");
            empty(
                w,
                "Relationship",
                [
                    ("Id", id.as_str()),
                    ("Type", "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet"),
                    ("Target", target.as_str()),
                ],
            )?;
        }
        close(w, "Relationships")
    })
}

fn core_props_xml() -> anyhow::Result<Vec<u8>> {
    let created = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    xml_part(|w| {
        open(
            w,
            "cp:coreProperties",
            [
                ("xmlns:cp", "http://schemas.openxmlformats.org/package/2006/metadata/core-properties"),
                ("xmlns:dc", "http://purl.org/dc/elements/1.1/"),
                ("xmlns:dcterms", "http://purl.org/dc/terms/"),
                ("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"),
            ],
        )?;
        text_element(w, "dc:creator", NO_ATTRS, "gradecalcd")?;
        text_element(w, "dcterms:created", [("xsi:type", "dcterms:W3CDTF")], &created)?;
        close(w, "cp:coreProperties")
    })
}

fn write_package<W: Write + Seek>(out: W, workbook: &Workbook) -> anyhow::Result<W> {
    let mut zip = ZipWriter::new(out);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let count = workbook.sheets.len();

    let mut entries: Vec<(String, Vec<u8>)> = vec![
        ("[Content_Types].xml".to_string(), content_types_xml(count)?),
        ("_rels/.rels".to_string(), root_rels_xml()?),
        ("docProps/core.xml".to_string(), core_props_xml()?),
        ("xl/workbook.xml".to_string(), workbook_xml(&workbook.sheets)?),
        ("xl/_rels/workbook.xml.rels".to_string(), workbook_rels_xml(count)?),
    ];
    for (i, sheet) in workbook.sheets.iter().enumerate() {
        let part = format!("xl/worksheets/sheet{}.xml", i + 1);
        let body = worksheet_xml(sheet).with_context(|| format!("failed to build {part}"))?;
        entries.push((part, body));
    }

    for (name, body) in entries {
        zip.start_file(name.as_str(), opts)
            .with_context(|| format!("failed to start {name}"))?;
        zip.write_all(&body)
            .with_context(|| format!("failed to write {name}"))?;
    }
    zip.finish().context("failed to finalize workbook")
}

pub fn xlsx_bytes(workbook: &Workbook) -> anyhow::Result<Vec<u8>> {
    anyhow::ensure!(!workbook.sheets.is_empty(), "workbook has no sheets");
    Ok(write_package(Cursor::new(Vec::new()), workbook)?.into_inner())
}

pub fn write_xlsx(path: &Path, workbook: &Workbook) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let bytes = xlsx_bytes(workbook)?;
    std::fs::write(path, bytes)
        .with_context(|| format!("failed to create output file {}", path.to_string_lossy()))
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        // f64 Display already drops a trailing ".0".
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Rows of the first worksheet as untrimmed strings, header row included.
pub fn read_first_sheet_rows(bytes: Vec<u8>) -> anyhow::Result<Vec<Vec<String>>> {
    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(bytes)).context("failed to open spreadsheet")?;
    let range = workbook
        .worksheet_range_at(0)
        .context("spreadsheet has no worksheets")?
        .context("failed to read first worksheet")?;
    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

pub fn read_first_sheet_file(path: &Path) -> anyhow::Result<Vec<Vec<String>>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
    read_first_sheet_rows(bytes)
}
