//! # vdm
//!
//! Synthesis of Source engine demo action scripts (`.vdm`).
//!
//! A script is an ordered list of [`TimedAction`]s; the engine executes
//! them in insertion order as demo playback reaches each start tick.
//! Actions are either placed at one absolute tick ([`Script::add_action`])
//! or distributed across a tick range in 100 percentage steps
//! ([`Script::add_range`]).

use std::path::{Path, PathBuf};

/// Percentage steps a range command is distributed over.
const RANGE_STEPS: u64 = 100;

/// One `PlayCommands` block: executes `commands` when playback reaches
/// `tick`. Insertion order defines execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedAction {
    pub index: u32,
    pub tick: u32,
    pub commands: String,
}

/// Builder for a demo action script.
#[derive(Debug, Clone, Default)]
pub struct Script {
    actions: Vec<TimedAction>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one action at an absolute tick.
    ///
    /// Empty command fragments are dropped before joining with `"; "`.
    /// An action with no surviving fragments is not emitted.
    pub fn add_action<I, S>(&mut self, tick: u32, fragments: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let commands = join_fragments(fragments);
        if commands.is_empty() {
            return;
        }
        self.push(tick, commands);
    }

    /// Distributes a templated command across [`RANGE_STEPS`] equal
    /// percentage steps over `[start, end)`.
    ///
    /// For step `i` the target frame is `floor(i * (end - start) / 100) - 1`;
    /// an action is emitted only when the frame is positive and differs
    /// from the last emitted frame (first occurrence wins), substituting
    /// `placeholder` with `i`. This yields at most 100 actions, and
    /// exactly `min(100, len - 1)` for ranges shorter than 100 ticks,
    /// with strictly increasing ticks.
    pub fn add_range(&mut self, start: u32, end: u32, template: &str, placeholder: &str) {
        let len = u64::from(end.saturating_sub(start));
        let mut last_frame = None;
        for step in 1..=RANGE_STEPS {
            let frame = (step * len / RANGE_STEPS) as i64 - 1;
            if frame > 0 && last_frame != Some(frame) {
                last_frame = Some(frame);
                let commands = template.replace(placeholder, &step.to_string());
                self.push(start + frame as u32, commands);
            }
        }
    }

    pub fn actions(&self) -> &[TimedAction] {
        &self.actions
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Renders the `demoactions` container the engine consumes.
    pub fn render(&self) -> String {
        let blocks: Vec<String> = self.actions.iter().map(render_block).collect();
        format!("demoactions {{\n  {}\n}}", blocks.join("\n  "))
    }

    fn push(&mut self, tick: u32, commands: String) {
        let index = self.actions.len() as u32 + 1;
        self.actions.push(TimedAction {
            index,
            tick,
            commands,
        });
    }
}

fn render_block(action: &TimedAction) -> String {
    format!(
        "\"{idx}\" {{ name \"{idx}\" factory \"PlayCommands\" starttick \"{tick}\" commands \"{cmd}\" }}",
        idx = action.index,
        tick = action.tick,
        cmd = action.commands,
    )
}

fn join_fragments<I, S>(fragments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let parts: Vec<String> = fragments
        .into_iter()
        .map(|f| f.as_ref().trim().to_owned())
        .filter(|f| !f.is_empty())
        .collect();
    parts.join("; ")
}

/// The script path the engine looks for: the demo path with a `.vdm`
/// extension.
pub fn script_path_for(demo: &Path) -> PathBuf {
    demo.with_extension("vdm")
}
