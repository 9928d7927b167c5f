//! Tabular rendering of table slices

use std::fmt;

use tabled::builder::Builder;
use tabled::settings::object::{Columns, Rows};
use tabled::settings::{Alignment, Modify, Style, width::Width};

use crate::convert::{Value, format_timestamp};
use crate::schema::{ColumnType, ScalarType};

use super::Table;

/// Maximum width of one rendered cell
const MAX_CELL_WIDTH: usize = 48;

fn format_cell(value: &Value, ty: &ColumnType) -> String {
    match (value, ty) {
        (Value::Timestamp(raw), ColumnType::Scalar(ScalarType::Timestamp(unit))) => {
            format_timestamp(*raw, *unit)
        }
        (Value::Utf8(s), _) => s.clone(),
        _ => value.to_string(),
    }
}

impl Table {
    /// Render rows `offset..offset + len` as a text table.
    pub fn render(&self, offset: usize, len: usize) -> String {
        let slice = self.slice(offset, len);
        let columns = self.schema.columns();

        let mut builder = Builder::default();
        builder.push_record(columns.iter().map(|c| c.name.clone()));
        for row in slice.rows() {
            builder.push_record(
                row.iter()
                    .zip(columns)
                    .map(|(value, column)| format_cell(value, &column.ty)),
            );
        }

        let mut table = builder.build();
        table.with(Style::rounded());
        table.with(
            Modify::new(Columns::new(0..columns.len()))
                .with(Width::truncate(MAX_CELL_WIDTH).suffix("...")),
        );
        table.with(Modify::new(Rows::first()).with(Alignment::center()));

        format!(
            "{}\n({} of {} rows, offset {})",
            table,
            slice.num_rows(),
            self.num_rows(),
            offset.min(self.num_rows())
        )
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(0, self.num_rows()))
    }
}
