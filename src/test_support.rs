//! Fixture helpers shared by unit tests: minimal `.xlsx` workbooks that
//! calamine can read, written with inline-string cells.

use std::io::Write;
use std::path::Path;

use zip::write::SimpleFileOptions;

use crate::types::{Column, Record};

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets></workbook>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

fn column_letter(index: usize) -> String {
    let letters = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    if index < 26 {
        (letters[index] as char).to_string()
    } else {
        format!(
            "{}{}",
            letters[index / 26 - 1] as char,
            letters[index % 26] as char
        )
    }
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn sheet_xml(rows: &[Vec<String>]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (r, row) in rows.iter().enumerate() {
        xml.push_str(&format!("<row r=\"{}\">", r + 1));
        for (c, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            xml.push_str(&format!(
                "<c r=\"{}{}\" t=\"inlineStr\"><is><t xml:space=\"preserve\">{}</t></is></c>",
                column_letter(c),
                r + 1,
                escape(value)
            ));
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

/// Write a single-sheet workbook; `rows[0]` lands on sheet row 1.
pub fn write_xlsx(path: &Path, rows: &[Vec<String>]) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    let parts = [
        ("[Content_Types].xml", CONTENT_TYPES.to_string()),
        ("_rels/.rels", ROOT_RELS.to_string()),
        ("xl/workbook.xml", WORKBOOK.to_string()),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS.to_string()),
        ("xl/worksheets/sheet1.xml", sheet_xml(rows)),
    ];
    for (name, body) in parts {
        zip.start_file(name, options).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

/// Header labels in canonical order.
pub fn header_row() -> Vec<String> {
    Column::ALL.iter().map(|c| c.name().to_string()).collect()
}

/// Write a schedule export: two title rows, the header on row 3, then data.
pub fn write_schedule(path: &Path, data: &[Vec<&str>]) {
    let mut rows = vec![
        vec!["手術予定表".to_string()],
        vec!["出力日時 2024/06/15 07:00".to_string()],
        header_row(),
    ];
    rows.extend(
        data.iter()
            .map(|row| row.iter().map(|v| v.to_string()).collect::<Vec<_>>()),
    );
    write_xlsx(path, &rows);
}

/// A data row in canonical column order with the given date/time/name.
pub fn schedule_row<'a>(date: &'a str, start: &'a str, end: &'a str, name: &'a str) -> Vec<&'a str> {
    let mut row = vec![""; Column::ALL.len()];
    row[Column::SurgeryDate.index()] = date;
    row[Column::StartTime.index()] = start;
    row[Column::EndTime.index()] = end;
    row[Column::PatientName.index()] = name;
    row
}

/// The canonical record `schedule_row` is expected to produce.
pub fn expected_record(date: &str, start: &str, end: &str, name: &str) -> Record {
    Record::default()
        .with(Column::SurgeryDate, date)
        .with(Column::StartTime, start)
        .with(Column::EndTime, end)
        .with(Column::PatientName, name)
}
