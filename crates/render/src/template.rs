//! Named-placeholder substitution for pass argument templates.
//!
//! A template token may reference `{prev}`, `{next}`, `{dir}`, `{out}`,
//! `{duration}`, `{duration_s}`, `{pre}`, `{trimmed}` or any
//! segment-specific variable. The duration placeholders accept an
//! inline offset in seconds, e.g. `{duration+1.5}` or `{duration_s-0.04}`.

use std::collections::HashMap;
use std::path::Path;

use crate::RenderError;
use crate::progress::format_timestamp;

/// Values available to one pass of one output's pipeline.
pub struct StageContext<'a> {
    /// Output of the previous pass (input for this one).
    pub prev: &'a Path,
    /// Path this pass writes.
    pub next: &'a Path,
    /// Shared staging directory.
    pub dir: &'a Path,
    /// Final artifact path for this output.
    pub out: &'a Path,
    /// Clip duration in seconds.
    pub duration_secs: f64,
    /// Pre-roll duration in seconds.
    pub pre_secs: f64,
    /// Clip duration with post-padding trimmed, in seconds.
    pub trimmed_secs: f64,
    /// Segment-specific named substitutions.
    pub vars: &'a HashMap<String, String>,
}

/// Substitutes every placeholder in every template token.
pub fn substitute_args(
    templates: &[String],
    ctx: &StageContext<'_>,
) -> Result<Vec<String>, RenderError> {
    templates.iter().map(|t| substitute(t, ctx)).collect()
}

fn substitute(template: &str, ctx: &StageContext<'_>) -> Result<String, RenderError> {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        result.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            // Unbalanced brace, keep the remainder literal.
            result.push_str(&rest[open..]);
            return Ok(result);
        };
        result.push_str(&resolve(&after[..close], ctx)?);
        rest = &after[close + 1..];
    }
    result.push_str(rest);
    Ok(result)
}

fn resolve(name: &str, ctx: &StageContext<'_>) -> Result<String, RenderError> {
    let (base, offset) = split_offset(name);
    match base {
        "prev" => Ok(ctx.prev.display().to_string()),
        "next" => Ok(ctx.next.display().to_string()),
        "dir" => Ok(ctx.dir.display().to_string()),
        "out" => Ok(ctx.out.display().to_string()),
        "duration" => Ok(format_timestamp(ctx.duration_secs + offset)),
        "duration_s" => Ok(format_seconds(ctx.duration_secs + offset)),
        "pre" => Ok(format_seconds(ctx.pre_secs + offset)),
        "trimmed" => Ok(format_timestamp(ctx.trimmed_secs + offset)),
        _ => match ctx.vars.get(name) {
            Some(value) => Ok(value.clone()),
            None => Err(RenderError::UnknownPlaceholder {
                name: name.to_owned(),
            }),
        },
    }
}

/// Splits an optional trailing `+N`/`-N` offset off a placeholder name.
fn split_offset(name: &str) -> (&str, f64) {
    if let Some(pos) = name.find(['+', '-']) {
        let (base, raw) = name.split_at(pos);
        if let Ok(offset) = raw.parse::<f64>() {
            return (base, offset);
        }
    }
    (name, 0.0)
}

fn format_seconds(secs: f64) -> String {
    format!("{secs:.3}")
}
