//! Operator prompts on the terminal
//!
//! Prompts are written to stderr so stdout only carries results. Lists
//! go through `dialoguer`; the yes/no prompt is read line-wise because only
//! an exact `yes` confirms.

use dialoguer::{theme::ColorfulTheme, MultiSelect};
use ec2kit_core::{Ec2KitError, Picker, Result};
use std::io::{self, BufRead, Write};

/// Ask a yes/no question on stdin/stderr
pub fn confirm(message: &str, default: bool) -> Result<bool> {
    let stdin = io::stdin();
    confirm_with(&mut stdin.lock(), &mut io::stderr(), message, default)
}

/// Ask a yes/no question
///
/// Empty input (or end of input) takes `default`. Only `yes` or `no`
/// (any case) is an answer; anything else counts as not confirmed.
pub fn confirm_with<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    message: &str,
    default: bool,
) -> Result<bool> {
    let choices = if default { "YES/no" } else { "yes/NO" };
    write!(output, "❓ {message} [{choices}]: ")?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    let answer = line.trim().to_lowercase();

    Ok(match answer.as_str() {
        "" => default,
        "yes" => true,
        _ => false,
    })
}

/// [`Picker`] on the terminal: multi-select list and yes/no prompt
#[derive(Debug, Default)]
pub struct StdinPicker;

impl Picker for StdinPicker {
    fn pick(&self, label: &str, prompt: &str, items: &[String]) -> Result<Vec<usize>> {
        let picked = MultiSelect::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("{label}: {prompt} (space to mark, enter to accept)"))
            .items(items)
            .interact_opt()
            .map_err(|e| Ec2KitError::Io(io::Error::other(e)))?;

        // Esc / q cancels
        Ok(picked.unwrap_or_default())
    }

    fn confirm(&self, message: &str, default: bool) -> Result<bool> {
        confirm(message, default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ask(input: &str, default: bool) -> (bool, String) {
        let mut out = Vec::new();
        let answer = confirm_with(&mut input.as_bytes(), &mut out, "Stop i-1?", default).unwrap();
        (answer, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_confirm_default_on_empty_input() {
        assert!(ask("\n", true).0);
        assert!(!ask("\n", false).0);
        assert!(ask("", true).0);
    }

    #[test]
    fn test_confirm_explicit_answers() {
        assert!(ask("yes\n", false).0);
        assert!(ask("YES\n", false).0);
        assert!(!ask("no\n", true).0);
        assert!(!ask("No\n", true).0);
    }

    #[test]
    fn test_confirm_other_input_is_not_confirmed() {
        assert!(!ask("y\n", true).0);
        assert!(!ask("sure\n", false).0);
    }

    #[test]
    fn test_confirm_prompt_shows_default() {
        assert!(ask("\n", true).1.contains("[YES/no]"));
        assert!(ask("\n", false).1.contains("[yes/NO]"));
    }
}
