//! Column layout of the CSV report.
//!
//! Reader and writer share [`COLUMNS`]; rows are positional in every schema
//! version, only the header names differ.

use crate::model::{Measured, ModelFacts, Outcome, ResultRecord};

pub const COLUMN_COUNT: usize = 22;

/// Cell separator for data rows.
pub const DELIMITER: char = ',';

/// Header cells are joined with a trailing space for readability.
pub const HEADER_SEPARATOR: &str = ", ";

/// Literal written for an empty or absent free-text value.
///
/// The format cannot tell this apart from a value that really is `Null`;
/// such a name, description or application reads back as absent.
pub const NULL_TEXT: &str = "Null";

/// Current column names, in row order.
pub const COLUMNS: [&str; COLUMN_COUNT] = [
    "Test",
    "LastTest",
    "FileName",
    "Errors",
    "Warnings",
    "ParseDurationMs",
    "GeometryDurationMs",
    "SceneDurationMs",
    "TotalDurationMs",
    "IfcSize",
    "XbimSize",
    "SceneSize",
    "Entities",
    "GeometryNodes",
    "Schema",
    "Name",
    "Description",
    "Products",
    "SolidModels",
    "Maps",
    "Booleans",
    "Application",
];

/// Header written by the original XbimRegression tool.
pub const LEGACY_COLUMNS: [&str; COLUMN_COUNT] = [
    "Test",
    "Last Test",
    "IFC File",
    "Errors",
    "Warnings",
    "Parse Duration (ms)",
    "Geometry Conversion (ms)",
    "Scene Generation (ms)",
    "Total Duration (ms)",
    "IFC Size",
    "Xbim Size",
    "Scene Size",
    "IFC Entities",
    "Geometry Nodes",
    "FILE_SCHEMA",
    "FILE_NAME",
    "FILE_DESCRIPTION",
    "Products",
    "Solid Models",
    "Maps",
    "Booleans",
    "Application",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    V1Legacy,
    V2,
}

/// Why a header line was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderMismatch {
    ColumnCount(usize),
    UnknownColumns,
}

pub fn header_line() -> String {
    COLUMNS.join(HEADER_SEPARATOR)
}

pub fn detect_schema(header: &str) -> Result<SchemaVersion, HeaderMismatch> {
    let cells: Vec<&str> = header.split(DELIMITER).map(str::trim).collect();
    if cells.len() != COLUMN_COUNT {
        return Err(HeaderMismatch::ColumnCount(cells.len()));
    }
    let matches = |names: &[&str]| {
        cells
            .iter()
            .zip(names)
            .all(|(cell, name)| cell.eq_ignore_ascii_case(name))
    };
    if matches(&COLUMNS) {
        Ok(SchemaVersion::V2)
    } else if matches(&LEGACY_COLUMNS) {
        Ok(SchemaVersion::V1Legacy)
    } else {
        Err(HeaderMismatch::UnknownColumns)
    }
}

/// Make a free-text value safe for the comma-delimited format.
///
/// Commas become hyphens, double quotes become single quotes, carriage
/// returns are dropped and newlines become spaces. Empty or absent values
/// become [`NULL_TEXT`].
pub fn sanitize_field(value: Option<&str>) -> String {
    match value {
        Some(s) if !s.is_empty() => s
            .replace(',', "-")
            .replace('"', "'")
            .replace('\r', "")
            .replace('\n', " "),
        _ => NULL_TEXT.to_string(),
    }
}

/// Key a file name is matched on between runs: the name as a report stores
/// it, so a name changed by sanitizing still finds its baseline row.
pub fn file_key(file_name: &str) -> String {
    sanitize_field(Some(file_name))
}

fn text_cell(cell: &str) -> Option<String> {
    if cell.is_empty() || cell == NULL_TEXT {
        None
    } else {
        Some(cell.to_string())
    }
}

/// Non-numeric cells read as zero.
fn number_cell(cell: &str) -> u64 {
    cell.trim().parse().unwrap_or(0)
}

fn errors_cell(cell: &str) -> Measured {
    match cell.trim().parse::<i64>() {
        Ok(n) if n < 0 => Measured::NotMeasured,
        Ok(n) => Measured::Measured(u32::try_from(n).unwrap_or(u32::MAX)),
        Err(_) => Measured::Measured(0),
    }
}

pub fn encode_row(r: &ResultRecord) -> String {
    let errors = match r.errors {
        Measured::NotMeasured => "-1".to_string(),
        Measured::Measured(n) => n.to_string(),
    };
    let f = &r.facts;
    let cells: [String; COLUMN_COUNT] = [
        r.outcome().as_str().to_string(),
        r.last_run.as_str().to_string(),
        sanitize_field(Some(&r.file_name)),
        errors,
        r.warnings.to_string(),
        r.parse_ms.to_string(),
        r.geometry_ms.to_string(),
        r.scene_ms.to_string(),
        r.total_ms().to_string(),
        r.source_bytes.to_string(),
        r.converted_bytes.to_string(),
        r.scene_bytes.to_string(),
        f.entity_count.to_string(),
        f.geometry_node_count.to_string(),
        sanitize_field(f.schema.as_deref()),
        sanitize_field(f.name.as_deref()),
        sanitize_field(f.description.as_deref()),
        f.product_count.to_string(),
        f.solid_count.to_string(),
        f.mapped_count.to_string(),
        f.boolean_count.to_string(),
        sanitize_field(f.application.as_deref()),
    ];
    cells.join(",")
}

/// Decode one data row. Returns the cell count on a layout mismatch.
///
/// `TotalDurationMs` (cell 8) is ignored; the total is always recomputed.
pub fn decode_row(line: &str) -> Result<ResultRecord, usize> {
    let cells: Vec<&str> = line.split(DELIMITER).collect();
    if cells.len() != COLUMN_COUNT {
        return Err(cells.len());
    }

    let failed = Outcome::parse(cells[0]) == Outcome::Failed;
    Ok(ResultRecord {
        failed,
        last_run: Outcome::parse(cells[1]),
        file_name: cells[2].to_string(),
        errors: errors_cell(cells[3]),
        warnings: u32::try_from(number_cell(cells[4])).unwrap_or(u32::MAX),
        parse_ms: number_cell(cells[5]),
        geometry_ms: number_cell(cells[6]),
        scene_ms: number_cell(cells[7]),
        source_bytes: number_cell(cells[9]),
        converted_bytes: number_cell(cells[10]),
        scene_bytes: number_cell(cells[11]),
        facts: ModelFacts {
            entity_count: number_cell(cells[12]),
            geometry_node_count: number_cell(cells[13]),
            schema: text_cell(cells[14]),
            name: text_cell(cells[15]),
            description: text_cell(cells[16]),
            product_count: number_cell(cells[17]),
            solid_count: number_cell(cells[18]),
            mapped_count: number_cell(cells[19]),
            boolean_count: number_cell(cells[20]),
            application: text_cell(cells[21]),
        },
    })
}
