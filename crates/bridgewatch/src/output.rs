//! Output formatting: table, JSON, YAML, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits one identifier per line.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use bridgewatch_core::ConnectivityState;

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: &ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Connectivity state label, colored by health.
pub fn state_label(state: &ConnectivityState, color: bool) -> String {
    let label = state.as_str();
    if !color {
        return label.to_owned();
    }
    match state {
        ConnectivityState::Connected => label.green().to_string(),
        ConnectivityState::Disconnected => label.dimmed().to_string(),
        ConnectivityState::Offline | ConnectivityState::Unauthorized => label.yellow().to_string(),
        ConnectivityState::Other(_) => label.cyan().to_string(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
pub fn render_list<T, R>(
    format: &OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            Ok(render_table(&rows))
        }
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => Ok(data.iter().map(&id_fn).collect::<Vec<_>>().join("\n")),
    }
}

/// Render a single serde-serializable item in the chosen format.
///
/// Table rendering uses `detail_fn`, since single-item views are
/// key/value listings rather than tables.
pub fn render_single<T>(
    format: &OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
{
    match format {
        OutputFormat::Table => Ok(detail_fn(data)),
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => Ok(id_fn(data)),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Format-specific renderers ────────────────────────────────────────

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

pub(crate) fn render_json<T: serde::Serialize + ?Sized>(
    data: &T,
    compact: bool,
) -> Result<String, CliError> {
    let out = if compact {
        serde_json::to_string(data)?
    } else {
        serde_json::to_string_pretty(data)?
    };
    Ok(out)
}

fn render_yaml<T: serde::Serialize + ?Sized>(data: &T) -> Result<String, CliError> {
    Ok(serde_yaml::to_string(data)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(serde::Serialize, Tabled)]
    struct Row {
        udid: String,
        state: String,
    }

    fn rows() -> Vec<Row> {
        vec![
            Row {
                udid: "emulator-5554".into(),
                state: "device".into(),
            },
            Row {
                udid: "10.0.0.5".into(),
                state: "disconnected".into(),
            },
        ]
    }

    fn render(format: &OutputFormat) -> String {
        render_list(
            format,
            &rows(),
            |r| Row {
                udid: r.udid.clone(),
                state: r.state.clone(),
            },
            |r| r.udid.clone(),
        )
        .unwrap()
    }

    #[test]
    fn plain_prints_one_id_per_line() {
        assert_eq!(render(&OutputFormat::Plain), "emulator-5554\n10.0.0.5");
    }

    #[test]
    fn compact_json_is_single_line() {
        let out = render(&OutputFormat::JsonCompact);
        assert!(!out.contains('\n'));
        assert!(out.starts_with(r#"[{"udid":"emulator-5554""#));
    }

    #[test]
    fn table_has_headers() {
        let out = render(&OutputFormat::Table);
        assert!(out.contains("udid"));
        assert!(out.contains("10.0.0.5"));
    }

    #[test]
    fn uncolored_state_is_the_wire_name() {
        assert_eq!(state_label(&ConnectivityState::Connected, false), "device");
    }
}
