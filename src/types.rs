//! Core schedule types: the fixed column schema, `Record`, and `RecordSet`.
//!
//! The schema is fixed at 16 columns. Canonical names are the header labels
//! used in the source spreadsheets and double as the JSON keys returned to
//! the API layer.

use serde::ser::{Serialize, SerializeMap, Serializer};

/// Number of columns in the fixed schema.
pub const COLUMN_COUNT: usize = 16;

/// How a column's raw cell text is normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Date,
    Time,
    Text,
}

/// One of the 16 schedule columns, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    SurgeryDate,
    StartTime,
    EndTime,
    Ward,
    OrderType,
    PatientName,
    PatientSex,
    PatientAge,
    Diagnosis,
    Procedure,
    Anesthesiologist,
    AttendingPhysician,
    Surgeon,
    Assistant,
    ScrubNurse,
    CirculatingNurse,
}

impl Column {
    pub const ALL: [Column; COLUMN_COUNT] = [
        Column::SurgeryDate,
        Column::StartTime,
        Column::EndTime,
        Column::Ward,
        Column::OrderType,
        Column::PatientName,
        Column::PatientSex,
        Column::PatientAge,
        Column::Diagnosis,
        Column::Procedure,
        Column::Anesthesiologist,
        Column::AttendingPhysician,
        Column::Surgeon,
        Column::Assistant,
        Column::ScrubNurse,
        Column::CirculatingNurse,
    ];

    /// Position in the canonical order.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Header label as it appears in the spreadsheets (and in API output).
    pub fn name(self) -> &'static str {
        match self {
            Column::SurgeryDate => "手術日",
            Column::StartTime => "手術開始",
            Column::EndTime => "手術終了",
            Column::Ward => "病棟",
            Column::OrderType => "オーダ区分",
            Column::PatientName => "患者氏名",
            Column::PatientSex => "患者性別",
            Column::PatientAge => "患者年齢",
            Column::Diagnosis => "疾患名",
            Column::Procedure => "術式",
            Column::Anesthesiologist => "麻酔医",
            Column::AttendingPhysician => "主治医",
            Column::Surgeon => "執刀医",
            Column::Assistant => "助手",
            Column::ScrubNurse => "器械出し",
            Column::CirculatingNurse => "外回り",
        }
    }

    /// SQLite column name in the `records` table.
    pub fn sql_name(self) -> &'static str {
        match self {
            Column::SurgeryDate => "surgery_date",
            Column::StartTime => "start_time",
            Column::EndTime => "end_time",
            Column::Ward => "ward",
            Column::OrderType => "order_type",
            Column::PatientName => "patient_name",
            Column::PatientSex => "patient_sex",
            Column::PatientAge => "patient_age",
            Column::Diagnosis => "diagnosis",
            Column::Procedure => "procedure_name",
            Column::Anesthesiologist => "anesthesiologist",
            Column::AttendingPhysician => "attending_physician",
            Column::Surgeon => "surgeon",
            Column::Assistant => "assistant",
            Column::ScrubNurse => "scrub_nurse",
            Column::CirculatingNurse => "circulating_nurse",
        }
    }

    pub fn kind(self) -> ColumnKind {
        match self {
            Column::SurgeryDate => ColumnKind::Date,
            Column::StartTime | Column::EndTime => ColumnKind::Time,
            _ => ColumnKind::Text,
        }
    }

    /// Look up a column by its header label.
    pub fn from_name(name: &str) -> Option<Column> {
        Column::ALL.into_iter().find(|c| c.name() == name)
    }
}

/// One normalized surgical-schedule row.
///
/// Always holds exactly [`COLUMN_COUNT`] fields in canonical order. Absent
/// values are empty strings. Two records are the same record when every
/// field matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Record {
    fields: [String; COLUMN_COUNT],
}

impl Record {
    pub fn new(fields: [String; COLUMN_COUNT]) -> Self {
        Self { fields }
    }

    pub fn get(&self, column: Column) -> &str {
        &self.fields[column.index()]
    }

    pub fn set(&mut self, column: Column, value: impl Into<String>) {
        self.fields[column.index()] = value.into();
    }

    /// Builder-style setter, mostly for fixtures.
    pub fn with(mut self, column: Column, value: impl Into<String>) -> Self {
        self.set(column, value);
        self
    }

    pub fn fields(&self) -> &[String; COLUMN_COUNT] {
        &self.fields
    }

    /// True when every field is empty.
    pub fn is_blank(&self) -> bool {
        self.fields.iter().all(|f| f.is_empty())
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(COLUMN_COUNT))?;
        for column in Column::ALL {
            map.serialize_entry(column.name(), self.get(column))?;
        }
        map.end()
    }
}

/// The full persisted collection, in stored order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSet {
    records: Vec<Record>,
}

impl RecordSet {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
