use urverk_core::time::Time;
use urverk_core::value::{Map, Matrix, Value};

use crate::plugin::OutputPlugin;

/// Accumulates observations into a time × observable grid and returns it as
/// a [`Matrix`] from `finish`. Column 0 holds the time stamps; one column
/// per observed `(model, port)` pair, in declaration order.
#[derive(Default)]
pub struct StorageOutput {
    columns: Vec<String>,
    rows: Vec<(Time, Vec<Option<Value>>)>,
}

impl StorageOutput {
    pub fn new() -> Self {
        Self::default()
    }

    fn column_key(model: &str, port: &str) -> String {
        format!("{model}:{port}")
    }

    fn column_index(&mut self, model: &str, port: &str) -> usize {
        let key = Self::column_key(model, port);
        match self.columns.iter().position(|c| *c == key) {
            Some(i) => i,
            None => {
                self.columns.push(key);
                for (_, cells) in &mut self.rows {
                    cells.push(None);
                }
                self.columns.len() - 1
            }
        }
    }

    /// Declared column names, `model:port`.
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

impl OutputPlugin for StorageOutput {
    fn on_parameter(&mut self, _view: &str, _config: &Map) {}

    fn on_new_observable(&mut self, model: &str, port: &str) {
        self.column_index(model, port);
    }

    fn on_value(&mut self, model: &str, port: &str, t: Time, value: &Value) {
        let col = self.column_index(model, port);
        let needs_row = self.rows.last().map(|(rt, _)| *rt != t).unwrap_or(true);
        if needs_row {
            self.rows.push((t, vec![None; self.columns.len()]));
        }
        let (_, cells) = self.rows.last_mut().expect("row just ensured");
        cells[col] = Some(value.clone());
    }

    fn on_delete_observable(&mut self, _model: &str, _port: &str) {
        // the column stays so earlier rows keep their shape
    }

    fn finish(&mut self, _t_end: Time) -> Option<Matrix> {
        let mut matrix = Matrix::new(self.columns.len() + 1, self.rows.len());
        for (row, (t, cells)) in self.rows.iter().enumerate() {
            matrix
                .set(0, row, Value::Double(t.as_f64()))
                .expect("matrix sized from rows");
            for (col, cell) in cells.iter().enumerate() {
                if let Some(value) = cell {
                    matrix
                        .set(col + 1, row, value.clone())
                        .expect("matrix sized from columns");
                }
            }
        }
        Some(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_values_by_time_row() {
        let mut out = StorageOutput::new();
        out.on_new_observable("top/a", "out");
        out.on_new_observable("top/b", "out");

        out.on_value("top/a", "out", Time::new(1.0), &Value::Integer(1));
        out.on_value("top/b", "out", Time::new(1.0), &Value::Integer(2));
        out.on_value("top/a", "out", Time::new(2.0), &Value::Integer(3));

        let matrix = out.finish(Time::new(2.0)).unwrap();
        assert_eq!(matrix.columns(), 3);
        assert_eq!(matrix.rows(), 2);
        assert_eq!(matrix.get(0, 0).unwrap(), &Value::Double(1.0));
        assert_eq!(matrix.get(1, 0).unwrap(), &Value::Integer(1));
        assert_eq!(matrix.get(2, 0).unwrap(), &Value::Integer(2));
        assert_eq!(matrix.get(1, 1).unwrap(), &Value::Integer(3));
        assert_eq!(matrix.get(2, 1).unwrap(), &Value::Null);
    }

    #[test]
    fn late_column_backfills_existing_rows() {
        let mut out = StorageOutput::new();
        out.on_value("m1", "p", Time::new(1.0), &Value::Integer(1));
        out.on_value("m2", "p", Time::new(2.0), &Value::Integer(2));
        assert_eq!(out.column_names(), &["m1:p".to_string(), "m2:p".to_string()]);
        let matrix = out.finish(Time::new(2.0)).unwrap();
        assert_eq!(matrix.get(2, 0).unwrap(), &Value::Null);
        assert_eq!(matrix.get(2, 1).unwrap(), &Value::Integer(2));
    }
}
