use std::time::Duration;

use serde::Deserialize;

/// How the synchronous runner hands the script body to the interpreter.
///
/// - `Stdin`: the body is written to the child's standard input and the
///   interpreter is told to read its program from there (default).
/// - `TempFile`: the body is written to a private temporary file whose path
///   is passed on the command line; stdin is left closed. Needed for
///   interpreters that cannot read a program from stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptDelivery {
    Stdin,
    #[serde(alias = "temp_file")]
    TempFile,
}

impl Default for ScriptDelivery {
    fn default() -> Self {
        ScriptDelivery::Stdin
    }
}

/// How the local launcher runs batch commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchMode {
    /// `run` spawns the command in the background and returns an unfinished
    /// handle; completion is observed through `poll`, possibly by another
    /// process.
    Detached,
    /// `run` waits for the command and always returns a finished handle.
    Blocking,
}

impl Default for LaunchMode {
    fn default() -> Self {
        LaunchMode::Detached
    }
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };
    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{}' is too large", s))
}
