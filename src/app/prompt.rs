//! Interactive questions asked on the terminal.

use crate::utils::error::{CapatrossError, Result};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use std::io::{BufRead, IsTerminal, Write};

/// Asks `question` until the answer is one of `choices`.
pub fn ask_choice<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
    choices: &[String],
) -> Result<String> {
    loop {
        write!(output, "{}  ", question)?;
        output.flush()?;

        let mut answer = String::new();
        if input.read_line(&mut answer)? == 0 {
            return Err(CapatrossError::ValidationError {
                message: format!("No answer given to \"{}\"", question),
            });
        }

        let answer = answer.trim().to_lowercase();
        if choices.iter().any(|choice| *choice == answer) {
            return Ok(answer);
        }
        writeln!(output, "You must choose one of [{}].", choices.join(", "))?;
    }
}

/// [`ask_choice`] on stdin/stdout.
pub fn ask_application(choices: &[String]) -> Result<String> {
    let stdin = std::io::stdin();
    ask_choice(&mut stdin.lock(), &mut std::io::stdout(), "What application?", choices)
}

/// Reads a secret, echoing `*` for each character typed.
pub fn ask_password(message: &str) -> Result<String> {
    let mut stdout = std::io::stdout();
    write!(stdout, "{}", message)?;
    stdout.flush()?;

    if !std::io::stdin().is_terminal() {
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        return Ok(line.trim_end_matches(['\r', '\n']).to_string());
    }

    terminal::enable_raw_mode()?;
    let secret = read_masked(&mut stdout);
    terminal::disable_raw_mode()?;
    writeln!(stdout)?;
    secret
}

fn read_masked<W: Write>(output: &mut W) -> Result<String> {
    let mut secret = String::new();
    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match key.code {
            KeyCode::Enter => return Ok(secret),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Err(CapatrossError::ValidationError {
                    message: "Interrupted".to_string(),
                });
            }
            KeyCode::Backspace => {
                if secret.pop().is_some() {
                    write!(output, "\u{8} \u{8}")?;
                }
            }
            KeyCode::Char(c) => {
                secret.push(c);
                write!(output, "*")?;
            }
            _ => {}
        }
        output.flush()?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn apps() -> Vec<String> {
        vec!["aae".to_string(), "darmok".to_string()]
    }

    #[test]
    fn test_ask_choice_repeats_until_valid() {
        let mut input = Cursor::new("people\nDarmok\n");
        let mut output = Vec::new();

        let answer = ask_choice(&mut input, &mut output, "What application?", &apps()).unwrap();

        assert_eq!(answer, "darmok");
        let printed = String::from_utf8(output).unwrap();
        assert!(printed.contains("You must choose one of [aae, darmok]."));
        assert_eq!(printed.matches("What application?").count(), 2);
    }

    #[test]
    fn test_ask_choice_end_of_input() {
        let mut input = Cursor::new("");
        let mut output = Vec::new();
        assert!(ask_choice(&mut input, &mut output, "What application?", &apps()).is_err());
    }
}
