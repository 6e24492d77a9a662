//! User controls as text commands.
//!
//! ```text
//! toggle | start | pause        detect / pause
//! threshold <0.1..0.9 | 10%..90%>
//! + | -                         nudge threshold by 5%
//! class <label>                 toggle one class
//! category <name>               toggle a category
//! all | clear                   select all / clear all
//! quit
//! ```

use std::str::FromStr;

use anyhow::{anyhow, Result};

use crate::detect::vocabulary;

#[derive(Clone, Debug, PartialEq)]
pub enum Control {
    Toggle,
    SetDetecting(bool),
    SetThreshold(f32),
    ThresholdUp,
    ThresholdDown,
    ToggleClass(String),
    ToggleCategory(&'static str),
    SelectAll,
    ClearAll,
    Quit,
}

impl FromStr for Control {
    type Err = anyhow::Error;

    fn from_str(input: &str) -> Result<Self> {
        let input = input.trim();
        let (command, arg) = match input.split_once(char::is_whitespace) {
            Some((command, arg)) => (command, arg.trim()),
            None => (input, ""),
        };
        let control = match command.to_lowercase().as_str() {
            "toggle" | "t" => Control::Toggle,
            "start" | "detect" => Control::SetDetecting(true),
            "pause" | "stop" => Control::SetDetecting(false),
            "+" | "up" => Control::ThresholdUp,
            "-" | "down" => Control::ThresholdDown,
            "threshold" => Control::SetThreshold(parse_threshold(arg)?),
            "class" => {
                let label = arg.to_lowercase();
                if !vocabulary::is_known(&label) {
                    return Err(anyhow!("unknown class '{}'", arg));
                }
                Control::ToggleClass(label)
            }
            "category" => {
                let name = vocabulary::categories()
                    .find(|name| name.eq_ignore_ascii_case(arg))
                    .ok_or_else(|| {
                        anyhow!(
                            "unknown category '{}' (one of: {})",
                            arg,
                            vocabulary::categories().collect::<Vec<_>>().join(", ")
                        )
                    })?;
                Control::ToggleCategory(name)
            }
            "all" => Control::SelectAll,
            "clear" => Control::ClearAll,
            "quit" | "q" | "exit" => Control::Quit,
            "" => return Err(anyhow!("empty command")),
            other => return Err(anyhow!("unknown command '{}'", other)),
        };
        Ok(control)
    }
}

fn parse_threshold(arg: &str) -> Result<f32> {
    let (number, percent) = match arg.strip_suffix('%') {
        Some(number) => (number.trim(), true),
        None => (arg, false),
    };
    let value: f32 = number
        .parse()
        .map_err(|_| anyhow!("threshold needs a number, got '{}'", arg))?;
    Ok(if percent { value / 100.0 } else { value })
}
