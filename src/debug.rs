use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// JSON-lines trace of layout decisions. One object per line, counters summarised
/// at the end of a run.
#[derive(Clone)]
pub(crate) struct DebugLogger {
    inner: Arc<Mutex<DebugState>>,
}

struct DebugState {
    writer: BufWriter<File>,
    counters: HashMap<String, u64>,
}

impl DebugLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(DebugState {
                writer: BufWriter::new(file),
                counters: HashMap::new(),
            })),
        })
    }

    pub fn log_json(&self, json: &str) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = writeln!(state.writer, "{json}");
        }
    }

    pub fn increment(&self, key: &str, amount: u64) {
        if let Ok(mut state) = self.inner.lock() {
            let entry = state.counters.entry(key.to_string()).or_insert(0);
            *entry = entry.saturating_add(amount);
        }
    }

    pub fn page_break(&self, from_page: usize, to_page: usize, reason: &str) {
        self.log_json(&format!(
            "{{\"type\":\"report.page_break\",\"reason\":\"{}\",\"from_page\":{},\"to_page\":{}}}",
            json_escape(reason),
            from_page,
            to_page
        ));
        self.increment("report.page_break", 1);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn image_plan(
        &self,
        record_index: usize,
        natural_px: (u32, u32),
        target_mm: (f32, f32),
        decision: &str,
        chunks: usize,
        dpi: f32,
    ) {
        self.log_json(&format!(
            "{{\"type\":\"report.image_plan\",\"record\":{},\"natural_px\":[{},{}],\"target_mm\":[{:.2},{:.2}],\"decision\":\"{}\",\"chunks\":{},\"dpi\":{:.1}}}",
            record_index,
            natural_px.0,
            natural_px.1,
            target_mm.0,
            target_mm.1,
            json_escape(decision),
            chunks,
            dpi
        ));
        self.increment(&format!("report.image_plan.{decision}"), 1);
    }

    pub fn image_encoded(&self, format: &str, width: u32, height: u32, bytes: usize) {
        self.log_json(&format!(
            "{{\"type\":\"report.image_encoded\",\"format\":\"{}\",\"px\":[{},{}],\"bytes\":{}}}",
            json_escape(format),
            width,
            height,
            bytes
        ));
        self.increment(&format!("report.image_encoded.{format}"), 1);
    }

    pub fn record_skipped(&self, record_index: usize, reason: &str) {
        self.log_json(&format!(
            "{{\"type\":\"report.record_skipped\",\"record\":{},\"reason\":\"{}\"}}",
            record_index,
            json_escape(reason)
        ));
        self.increment("report.record_skipped", 1);
    }

    pub fn emit_summary(&self, context: &str) {
        if let Ok(mut state) = self.inner.lock() {
            let mut counters: Vec<(String, u64)> = state.counters.drain().collect();
            counters.sort_by(|a, b| a.0.cmp(&b.0));
            let mut counts_json = String::from("{");
            for (idx, (key, value)) in counters.iter().enumerate() {
                if idx > 0 {
                    counts_json.push(',');
                }
                counts_json.push_str(&format!("\"{}\":{}", json_escape(key), value));
            }
            counts_json.push('}');
            let json = format!(
                "{{\"type\":\"debug.summary\",\"context\":\"{}\",\"counts\":{}}}",
                json_escape(context),
                counts_json
            );
            let _ = writeln!(state.writer, "{json}");
        }
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = state.writer.flush();
        }
    }
}

pub(crate) fn json_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 8);
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            _ => out.push(ch),
        }
    }
    out
}
