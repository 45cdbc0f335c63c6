//! Output formatting: human summary, JSON, YAML.
//!
//! Renders data in the format selected by `--output`. Tables use `tabled`,
//! structured formats use serde.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use serde_json::Value;
use tabled::{Table, Tabled, settings::Style};

use marketfeed_core::{SectionKind, SectionLayout, Snapshot, Status};

use crate::cli::{ColorMode, OutputFormat};

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Status word, colored when enabled.
pub fn paint_status(status: Status, color: bool) -> String {
    let word = status.to_string();
    if !color {
        return word;
    }
    match status {
        Status::Ready => word.green().bold().to_string(),
        Status::Loading => word.yellow().to_string(),
        Status::Error => word.red().bold().to_string(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a single serde-serializable item in the chosen format.
///
/// The table format uses `detail_fn`, which returns a pre-formatted string.
pub fn render_single<T>(format: OutputFormat, data: &T, detail_fn: impl Fn(&T) -> String) -> String
where
    T: serde::Serialize + ?Sized,
{
    match format {
        OutputFormat::Table => detail_fn(data),
        OutputFormat::Json => render_json_pretty(data),
        OutputFormat::JsonCompact => render_json_compact(data),
        OutputFormat::Yaml => render_yaml(data),
    }
}

/// Render one item of a stream: JSON formats emit one line per item,
/// YAML emits one document per item.
pub fn render_stream_item<T>(
    format: OutputFormat,
    data: &T,
    summary_fn: impl Fn(&T) -> String,
) -> String
where
    T: serde::Serialize + ?Sized,
{
    match format {
        OutputFormat::Table => summary_fn(data),
        OutputFormat::Json | OutputFormat::JsonCompact => render_json_compact(data),
        OutputFormat::Yaml => format!("---\n{}", render_yaml(data).trim_end()),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
    let _ = stdout.flush();
}

// ── Snapshot views ───────────────────────────────────────────────────

#[derive(Tabled)]
struct SectionRow {
    #[tabled(rename = "Section")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: &'static str,
    #[tabled(rename = "Contents")]
    contents: String,
}

/// Table of the snapshot's sections with a one-line summary of each.
pub fn snapshot_table(snapshot: &Snapshot, layout: &SectionLayout) -> String {
    let rows: Vec<SectionRow> = snapshot
        .sections
        .iter()
        .map(|(name, value)| SectionRow {
            name: name.clone(),
            kind: match layout.kind_of(name) {
                SectionKind::Fast => "fast",
                SectionKind::Slow => "slow",
            },
            contents: summarize_value(value),
        })
        .collect();

    let header = format!(
        "snapshot #{} ({}) updated {}",
        snapshot.sequence,
        snapshot.kind,
        snapshot.updated_at.format("%Y-%m-%d %H:%M:%S%.3f UTC")
    );
    if rows.is_empty() {
        return format!("{header}\n(no sections)");
    }
    format!("{header}\n{}", render_table(&rows))
}

/// Short description of a JSON value's shape.
pub fn summarize_value(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Array(items) => format!("[{} items]", items.len()),
        Value::Object(map) => {
            let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
            if keys.len() > 4 {
                let more = keys.len() - 4;
                keys.truncate(4);
                format!("{{{}, +{more}}}", keys.join(", "))
            } else {
                format!("{{{}}}", keys.join(", "))
            }
        }
        scalar => scalar.to_string(),
    }
}

// ── Format-specific renderers ────────────────────────────────────────

pub(crate) fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Pretty-printed JSON.
pub(crate) fn render_json_pretty<T: serde::Serialize + ?Sized>(data: &T) -> String {
    serde_json::to_string_pretty(data).expect("serialization should not fail")
}

/// Compact single-line JSON.
pub(crate) fn render_json_compact<T: serde::Serialize + ?Sized>(data: &T) -> String {
    serde_json::to_string(data).expect("serialization should not fail")
}

/// YAML output.
pub(crate) fn render_yaml<T: serde::Serialize + ?Sized>(data: &T) -> String {
    serde_yaml::to_string(data).expect("serialization should not fail")
}
