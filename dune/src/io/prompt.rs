//! Line-oriented operator interaction.
//!
//! [`Prompter`] is the seam between the pipeline and a human: the console
//! implementation reads from any `BufRead`, tests script the answers.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};

/// Ask questions and show messages.
pub trait Prompter {
    /// Show `question` and read one answer line (without the line ending).
    ///
    /// Returns `None` at end of input.
    fn ask(&mut self, question: &str) -> Result<Option<String>>;

    /// Show a message line.
    fn say(&mut self, message: &str) -> Result<()>;
}

/// Prompter over a reader/writer pair.
pub struct Console<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    #[cfg(test)]
    pub fn into_parts(self) -> (R, W) {
        (self.input, self.output)
    }
}

impl Console<io::StdinLock<'static>, io::Stdout> {
    /// Console over the process stdin/stdout.
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Prompter for Console<R, W> {
    fn ask(&mut self, question: &str) -> Result<Option<String>> {
        write!(self.output, "{question}").context("write prompt")?;
        self.output.flush().context("flush prompt")?;
        let mut line = String::new();
        let read = self.input.read_line(&mut line).context("read answer")?;
        if read == 0 {
            writeln!(self.output).context("write prompt")?;
            return Ok(None);
        }
        let answer = line.trim_end_matches(['\n', '\r']);
        Ok(Some(answer.to_string()))
    }

    fn say(&mut self, message: &str) -> Result<()> {
        writeln!(self.output, "{message}").context("write message")
    }
}

/// Ask a yes/no question until a recognizable answer arrives.
///
/// An empty answer takes `default` when one is given. End of input is "no".
pub fn ask_yes_no(
    prompter: &mut dyn Prompter,
    question: &str,
    default: Option<bool>,
) -> Result<bool> {
    let hint = match default {
        Some(true) => "[T/n]",
        Some(false) => "[t/N]",
        None => "[t/n]",
    };
    loop {
        let Some(answer) = prompter.ask(&format!("{question} {hint}: "))? else {
            return Ok(false);
        };
        let answer = answer.trim().to_lowercase();
        if answer.is_empty()
            && let Some(default) = default
        {
            return Ok(default);
        }
        match answer.as_str() {
            "t" | "tak" | "y" | "yes" | "1" | "true" => return Ok(true),
            "n" | "nie" | "no" | "0" | "false" => return Ok(false),
            _ => prompter.say("Answer t/tak/y/yes or n/nie/no.")?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedPrompter;

    #[test]
    fn console_reads_lines_and_reports_end_of_input() {
        let mut console = Console::new("INBOX\r\n".as_bytes(), Vec::new());
        assert_eq!(
            console.ask("Mailbox: ").expect("ask"),
            Some("INBOX".to_string())
        );
        assert_eq!(console.ask("Password: ").expect("ask"), None);
        console.say("done").expect("say");

        let (_, output) = console.into_parts();
        assert_eq!(
            String::from_utf8(output).expect("utf8"),
            "Mailbox: Password: \ndone\n"
        );
    }

    #[test]
    fn yes_no_accepts_polish_and_english() {
        let mut prompter = ScriptedPrompter::new(["tak", "no", "maybe", "Y"]);
        assert!(ask_yes_no(&mut prompter, "Repair?", None).expect("ask"));
        assert!(!ask_yes_no(&mut prompter, "Repair?", None).expect("ask"));
        assert!(ask_yes_no(&mut prompter, "Repair?", None).expect("ask"));
        assert_eq!(prompter.said().len(), 1);
    }

    #[test]
    fn yes_no_uses_default_and_treats_end_of_input_as_no() {
        let mut prompter = ScriptedPrompter::new([""]);
        assert!(ask_yes_no(&mut prompter, "Save?", Some(true)).expect("ask"));
        assert!(!ask_yes_no(&mut prompter, "Save?", Some(true)).expect("ask"));
    }
}
