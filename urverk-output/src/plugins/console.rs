use urverk_core::time::Time;
use urverk_core::value::{Map, Matrix, Value};

use crate::plugin::OutputPlugin;

/// Writes tab-separated rows to stdout, one row per simulated instant:
/// values arriving at one time fill a buffered row of `model:port` columns
/// that is emitted when the clock moves on (or at each bag close with the
/// `flush-by-bag` config). The header line lists the columns and is printed
/// at `finish`, after the data, unless `header: false`.
pub struct ConsoleOutput {
    flush_by_bag: bool,
    header: bool,
    columns: Vec<String>,
    row: Vec<Option<Value>>,
    row_time: Option<Time>,
    values: u64,
}

impl Default for ConsoleOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleOutput {
    pub fn new() -> Self {
        Self {
            flush_by_bag: false,
            header: true,
            columns: Vec::new(),
            row: Vec::new(),
            row_time: None,
            values: 0,
        }
    }

    /// Values received since the view was attached.
    pub fn values(&self) -> u64 {
        self.values
    }

    fn column_index(&mut self, model: &str, port: &str) -> usize {
        let key = format!("{model}:{port}");
        match self.columns.iter().position(|c| *c == key) {
            Some(i) => i,
            None => {
                self.columns.push(key);
                self.row.push(None);
                self.columns.len() - 1
            }
        }
    }

    /// The pending row as a printable line, if any cell is filled.
    fn render_row(&self) -> Option<String> {
        let t = self.row_time?;
        if self.row.iter().all(|cell| cell.is_none()) {
            return None;
        }
        let cells: Vec<String> = self
            .row
            .iter()
            .map(|cell| cell.as_ref().map(|v| v.to_string()).unwrap_or_default())
            .collect();
        Some(format!("{t}\t{}", cells.join("\t")))
    }

    fn render_header(&self) -> String {
        let mut line = String::from("time");
        for column in &self.columns {
            line.push('\t');
            line.push_str(column);
        }
        line
    }

    fn flush_row(&mut self) {
        if let Some(line) = self.render_row() {
            println!("{line}");
        }
        self.row_time = None;
        for cell in &mut self.row {
            *cell = None;
        }
    }
}

impl OutputPlugin for ConsoleOutput {
    fn on_parameter(&mut self, _view: &str, config: &Map) {
        if let Some(Value::Boolean(by_bag)) = config.get("flush-by-bag") {
            self.flush_by_bag = *by_bag;
        }
        if let Some(Value::Boolean(header)) = config.get("header") {
            self.header = *header;
        }
    }

    fn on_new_observable(&mut self, model: &str, port: &str) {
        self.column_index(model, port);
    }

    fn on_value(&mut self, model: &str, port: &str, t: Time, value: &Value) {
        if self.row_time.is_some() && self.row_time != Some(t) {
            self.flush_row();
        }
        let col = self.column_index(model, port);
        self.row_time = Some(t);
        self.row[col] = Some(value.clone());
        self.values += 1;
    }

    fn on_delete_observable(&mut self, _model: &str, _port: &str) {
        // the column stays so earlier rows keep their shape
    }

    fn finish(&mut self, _t_end: Time) -> Option<Matrix> {
        self.flush_row();
        if self.header {
            println!("{}", self.render_header());
        }
        None
    }

    fn flush_by_bag(&self) -> bool {
        self.flush_by_bag
    }

    fn flush(&mut self) {
        self.flush_row();
    }
}
