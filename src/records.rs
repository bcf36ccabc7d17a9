use std::fs::File;
use std::path::{Path, PathBuf};
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::error::Result;
use crate::extractor::ExtractionResult;

/// Output columns, in file order.
pub const COLUMNS: [&str; 7] = ["name", "location", "description", "size", "contacts", "social_media", "link"];

const LIST_SEPARATOR: &str = ", ";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganizationRecord {
    pub name: String,
    pub location: String,
    pub description: String,
    pub size: String,
    pub contacts: String,
    pub social_media: String,
    pub link: String,
}

impl OrganizationRecord {
    /// Shapes one extraction into a row. `social_media` falls back to the `linkedin` field.
    pub fn from_extraction(info: &ExtractionResult) -> Self {
        // `type` is asked for in the prompt but has no output column; it is dropped here.
        let social = info
            .get("social_media")
            .filter(|v| !is_blank(v))
            .or_else(|| info.get("linkedin"));

        OrganizationRecord {
            name: render_field(info.get("name")),
            location: render_field(info.get("location")),
            description: render_field(info.get("description")),
            size: render_field(info.get("size")),
            contacts: flatten_contacts(info.get("contacts")),
            social_media: render_field(social),
            link: render_field(info.get("link")),
        }
    }

    fn as_row(&self) -> [&str; 7] {
        [
            &self.name,
            &self.location,
            &self.description,
            &self.size,
            &self.contacts,
            &self.social_media,
            &self.link,
        ]
    }
}

/// Contacts as one cell: list items (or `key: value` pairs) joined with `", "`, no brackets.
pub fn flatten_contacts(contacts: Option<&Value>) -> String {
    match contacts {
        Some(Value::Array(items)) => items.iter().map(scalar_text).collect::<Vec<_>>().join(LIST_SEPARATOR),
        Some(Value::Object(fields)) => fields
            .iter()
            .map(|(k, v)| format!("{}: {}", k, render_field(Some(v))))
            .collect::<Vec<_>>()
            .join(LIST_SEPARATOR),
        other => render_field(other),
    }
}

fn render_field(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Array(items)) => items.iter().map(scalar_text).collect::<Vec<_>>().join(LIST_SEPARATOR),
        Some(other) => other.to_string(),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// `associations_YYMMDD-HHMM.csv`
pub fn output_file_name(at: NaiveDateTime) -> String {
    format!("associations_{}.csv", at.format("%y%m%d-%H%M"))
}

/// Ordered rows, one per organization that produced data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrganizationTable {
    records: Vec<OrganizationRecord>,
}

impl OrganizationTable {
    pub fn assemble(infos: &IndexMap<String, ExtractionResult>) -> Self {
        let records = infos.values().map(OrganizationRecord::from_extraction).collect();
        OrganizationTable { records }
    }

    pub fn push(&mut self, record: OrganizationRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[OrganizationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Writes the header even when there are no rows.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        let mut csv_writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        csv_writer.write_record(COLUMNS)?;
        for record in &self.records {
            csv_writer.write_record(record.as_row())?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut rdr = csv::Reader::from_path(path.as_ref())?;
        let mut table = OrganizationTable::default();
        for result in rdr.deserialize() {
            table.push(result?);
        }
        Ok(table)
    }

    /// Saves under `dir` with a timestamped name and returns the full path.
    pub fn save<P: AsRef<Path>>(&self, dir: P, at: NaiveDateTime) -> Result<PathBuf> {
        let path = dir.as_ref().join(output_file_name(at));
        self.write_csv(&path)?;
        info!("Database saved to {:?} ({} rows)", path, self.len());
        Ok(path)
    }
}
