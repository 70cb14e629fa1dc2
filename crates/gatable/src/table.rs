//! Result Table
//!
//! Row-major table of typed cells built from a [`RawReport`]. Column types
//! come from the vendor `dataType` tag; a cell that does not parse as its
//! column type keeps its original string.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::fmt;

use crate::analytics::response::{ColumnHeader, RawReport};
use crate::error::{Error, Result};

/// Prefix the vendor puts on every column name
const VENDOR_PREFIX: &str = "ga:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    String,
    Integer,
    Float,
}

impl ColumnKind {
    /// Map a vendor `dataType` tag onto a column kind.
    pub fn from_data_type(data_type: &str) -> Self {
        match data_type.to_ascii_uppercase().as_str() {
            "INTEGER" => Self::Integer,
            "FLOAT" | "CURRENCY" | "PERCENT" | "TIME" => Self::Float,
            _ => Self::String,
        }
    }

    /// Coerce a raw cell, falling back to the string on failure.
    pub fn coerce(&self, raw: &str) -> Cell {
        match self {
            Self::String => Cell::Str(raw.to_string()),
            Self::Integer => raw
                .trim()
                .parse::<i64>()
                .map(Cell::Int)
                .unwrap_or_else(|_| Cell::Str(raw.to_string())),
            Self::Float => raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Cell::Float)
                .unwrap_or_else(|| Cell::Str(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Str(String),
    Int(i64),
    Float(f64),
    /// No value, e.g. an unmatched left join
    Null,
}

impl Cell {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Null => Ok(()),
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Str(s) => serializer.serialize_str(s),
            Self::Int(v) => serializer.serialize_i64(*v),
            Self::Float(v) => serializer.serialize_f64(*v),
            Self::Null => serializer.serialize_none(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    fn from_header(header: &ColumnHeader) -> Self {
        let name = header
            .name
            .strip_prefix(VENDOR_PREFIX)
            .unwrap_or(&header.name);
        Self::new(name, ColumnKind::from_data_type(&header.data_type))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    columns: Vec<Column>,
    rows: Vec<Vec<Cell>>,
}

impl ResultTable {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Reshape a merged report into typed rows.
    ///
    /// Short rows are padded with `Null`; cells beyond the header are dropped.
    pub fn from_report(report: &RawReport) -> Self {
        let columns: Vec<Column> = report.column_headers.iter().map(Column::from_header).collect();

        let rows = report
            .rows
            .iter()
            .map(|raw| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(i, column)| match raw.get(i) {
                        Some(value) => column.kind.coerce(value),
                        None => Cell::Null,
                    })
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| Error::query(format!("Result has no column '{}'", name)))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::query(format!(
                "Row has {} cells, table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn row(&self, index: usize) -> Option<Row<'_>> {
        self.rows.get(index).map(|cells| Row {
            columns: &self.columns,
            cells,
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(move |cells| Row {
            columns: &self.columns,
            cells,
        })
    }

    /// All values of one column, in row order.
    pub fn column(&self, name: &str) -> Option<Vec<&Cell>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }

    /// Rename columns by `(from, to)` pairs. Unknown names are ignored.
    pub fn rename_columns(&mut self, renames: &[(&str, &str)]) {
        for column in &mut self.columns {
            if let Some((_, to)) = renames.iter().find(|(from, _)| *from == column.name) {
                column.name = to.to_string();
            }
        }
    }

    pub fn drop_column(&mut self, name: &str) -> Result<()> {
        let idx = self.require_column(name)?;
        self.columns.remove(idx);
        for row in &mut self.rows {
            row.remove(idx);
        }
        Ok(())
    }

    /// Keep only the named columns, in the given order.
    pub fn select(&self, names: &[&str]) -> Result<Self> {
        let indexes = names
            .iter()
            .map(|name| self.require_column(name))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            columns: indexes.iter().map(|&i| self.columns[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| indexes.iter().map(|&i| row[i].clone()).collect())
                .collect(),
        })
    }

    /// Replace every value in a column and set its kind.
    pub fn map_column<F>(&mut self, name: &str, kind: ColumnKind, mut f: F) -> Result<()>
    where
        F: FnMut(&Cell) -> Cell,
    {
        let idx = self.require_column(name)?;
        self.columns[idx].kind = kind;
        for row in &mut self.rows {
            row[idx] = f(&row[idx]);
        }
        Ok(())
    }

    /// Append a column computed from each row.
    pub fn add_column<F>(&mut self, name: &str, kind: ColumnKind, mut f: F)
    where
        F: FnMut(&Row<'_>) -> Cell,
    {
        let values: Vec<Cell> = self.rows().map(|row| f(&row)).collect();
        self.columns.push(Column::new(name, kind));
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
    }

    /// Left join on a shared key column. Every row of `self` is kept in order;
    /// the first matching row of `other` supplies the remaining columns, or
    /// `Null`s when nothing matches. Columns of `other` whose names already
    /// exist here are skipped.
    pub fn left_join(&self, other: &ResultTable, on: &str) -> Result<Self> {
        let left_key = self.require_column(on)?;
        let right_key = other.require_column(on)?;

        let carried: Vec<usize> = other
            .columns
            .iter()
            .enumerate()
            .filter(|(i, c)| *i != right_key && self.column_index(&c.name).is_none())
            .map(|(i, _)| i)
            .collect();

        let mut columns = self.columns.clone();
        columns.extend(carried.iter().map(|&i| other.columns[i].clone()));

        let rows = self
            .rows
            .iter()
            .map(|row| {
                let matched = other.rows.iter().find(|r| r[right_key] == row[left_key]);
                let mut joined = row.clone();
                joined.extend(carried.iter().map(|&i| match matched {
                    Some(r) => r[i].clone(),
                    None => Cell::Null,
                }));
                joined
            })
            .collect();

        Ok(Self { columns, rows })
    }

    /// Render as an aligned plain-text table.
    pub fn to_text(&self) -> String {
        let rendered: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect();

        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                rendered
                    .iter()
                    .map(|r| r[i].chars().count())
                    .chain(std::iter::once(c.name.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let mut out = String::new();
        let header: Vec<&str> = self.column_names();
        push_line(&mut out, header.iter().copied(), &widths);
        push_line(
            &mut out,
            widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().iter().map(String::as_str),
            &widths,
        );
        for row in &rendered {
            push_line(&mut out, row.iter().map(String::as_str), &widths);
        }
        out
    }
}

fn push_line<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>, widths: &[usize]) {
    let line: Vec<String> = cells
        .zip(widths)
        .map(|(cell, width)| {
            let pad = width.saturating_sub(cell.chars().count());
            format!("{}{}", cell, " ".repeat(pad))
        })
        .collect();
    out.push_str(line.join("  ").trim_end());
    out.push('\n');
}

/// A row addressed by column name.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    columns: &'a [Column],
    cells: &'a [Cell],
}

impl<'a> Row<'a> {
    pub fn get(&self, name: &str) -> Option<&'a Cell> {
        let idx = self.columns.iter().position(|c| c.name == name)?;
        self.cells.get(idx)
    }

    pub fn cells(&self) -> &'a [Cell] {
        self.cells
    }

    /// `(column name, cell)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a Cell)> + 'a {
        self.columns
            .iter()
            .map(|c| c.name.as_str())
            .zip(self.cells.iter())
    }
}

impl Serialize for Row<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (name, cell) in self.iter() {
            map.serialize_entry(name, cell)?;
        }
        map.end()
    }
}

/// Serializes as an array of objects keyed by column name, in column order.
impl Serialize for ResultTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for row in self.rows() {
            seq.serialize_element(&row)?;
        }
        seq.end()
    }
}
