use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::error;

use urverk_core::time::Time;
use urverk_core::value::{Map, Matrix, Value};

use crate::plugin::OutputPlugin;

/// CSV back-end. Rows are buffered in memory and written at `finish`, so
/// observables declared mid-run (executive-created models) still land in the
/// header.
pub struct FileOutput {
    path: PathBuf,
    columns: Vec<String>,
    rows: Vec<(Time, Vec<Option<Value>>)>,
}

impl FileOutput {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn column_index(&mut self, model: &str, port: &str) -> usize {
        let key = format!("{model}:{port}");
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

    fn write_csv(&self, sink: &mut impl Write) -> std::io::Result<()> {
        write!(sink, "time")?;
        for column in &self.columns {
            write!(sink, ",{column}")?;
        }
        writeln!(sink)?;
        for (t, cells) in &self.rows {
            write!(sink, "{t}")?;
            for cell in cells {
                match cell {
                    Some(value) => write!(sink, ",{value}")?,
                    None => write!(sink, ",")?,
                }
            }
            writeln!(sink)?;
        }
        Ok(())
    }
}

impl OutputPlugin for FileOutput {
    fn on_parameter(&mut self, _view: &str, config: &Map) {
        if let Some(Value::String(path)) = config.get("path") {
            self.path = PathBuf::from(path);
        }
    }

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

    fn on_delete_observable(&mut self, _model: &str, _port: &str) {}

    fn finish(&mut self, _t_end: Time) -> Option<Matrix> {
        let result = File::create(&self.path).and_then(|file| {
            let mut writer = BufWriter::new(file);
            self.write_csv(&mut writer)?;
            writer.flush()
        });
        if let Err(err) = result {
            error!(path = %self.path.display(), %err, "failed to write output file");
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.csv");
        let mut out = FileOutput::new(&path);
        out.on_new_observable("top/a", "out");
        out.on_value("top/a", "out", Time::new(1.0), &Value::Integer(5));
        out.on_value("top/a", "out", Time::new(2.0), &Value::Integer(6));
        out.finish(Time::new(2.0));

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "time,top/a:out\n1,5\n2,6\n");
    }

    #[test]
    fn config_path_overrides_constructor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("override.csv");
        let mut config = Map::new();
        config.insert(
            "path",
            Value::String(path.to_string_lossy().into_owned()),
        );
        let mut out = FileOutput::new(dir.path().join("ignored.csv"));
        out.on_parameter("v", &config);
        out.finish(Time::ZERO);
        assert!(path.exists());
    }

    #[test]
    fn missing_cells_stay_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gaps.csv");
        let mut out = FileOutput::new(&path);
        out.on_value("a", "p", Time::new(1.0), &Value::Integer(1));
        out.on_value("b", "p", Time::new(2.0), &Value::Integer(2));
        out.finish(Time::new(2.0));

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "time,a:p,b:p\n1,1,\n2,,2\n");
    }
}
