//! Asking the operator for variable values.

use dialoguer::Input;
use regex::Regex;
use std::io::{BufRead, IsTerminal, Write};
use tracing::warn;

use crate::schema::VariableDefinition;
use crate::{ConfigError, ConfigResult};

/// Question used when a variable has no definition.
pub const DEFAULT_QUESTION: &str = "Please enter a value";

/// A single question for the operator.
#[derive(Debug, Clone)]
pub struct PromptRequest {
    /// Variable the answer is for.
    pub name: String,
    pub question: String,
    pub default: Option<String>,
    /// Answers must match this pattern (unanchored).
    pub validation: Option<Regex>,
}

impl PromptRequest {
    /// Build the question for a variable from its optional definition.
    pub fn for_variable(name: &str, definition: Option<&VariableDefinition>) -> ConfigResult<Self> {
        let question = definition
            .and_then(|d| d.question.clone())
            .unwrap_or_else(|| format!("{DEFAULT_QUESTION} for {name}"));

        let validation = definition
            .and_then(|d| d.regex_pattern.as_deref())
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidValue {
                    field: format!("vars.{name}.regexPattern"),
                    message: e.to_string(),
                })
            })
            .transpose()?;

        Ok(Self {
            name: name.to_string(),
            question,
            default: definition.and_then(|d| d.default.clone()),
            validation,
        })
    }

    /// Apply the default to an empty answer.
    pub fn with_default(&self, answer: String) -> String {
        match (&self.default, answer.is_empty()) {
            (Some(default), true) => default.clone(),
            _ => answer,
        }
    }

    pub fn is_valid(&self, answer: &str) -> bool {
        self.validation.as_ref().is_none_or(|re| re.is_match(answer))
    }

    fn validation_message(&self) -> String {
        match &self.validation {
            Some(re) => format!("Answer must match {}", re.as_str()),
            None => String::new(),
        }
    }
}

/// Source of answers for variables without a value.
pub trait Prompt {
    /// Ask the question and return the raw answer.
    fn ask(&mut self, request: &PromptRequest) -> ConfigResult<String>;
}

/// Interactive prompt on the controlling terminal.
///
/// Invalid answers are rejected and the question is asked again. Without a
/// TTY, answers are read line by line from stdin until one is valid.
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl TerminalPrompt {
    pub fn new() -> Self {
        Self
    }

    fn ask_tty(&self, request: &PromptRequest) -> ConfigResult<String> {
        let mut input = Input::<String>::new()
            .with_prompt(&request.question)
            .allow_empty(true);

        if let Some(default) = &request.default {
            input = input.default(default.clone()).show_default(true);
        }

        if request.validation.is_some() {
            let message = request.validation_message();
            input = input.validate_with(move |answer: &String| -> Result<(), String> {
                if request.is_valid(answer) {
                    Ok(())
                } else {
                    Err(message.clone())
                }
            });
        }

        input
            .interact_text()
            .map(|answer| request.with_default(answer))
            .map_err(|e| ConfigError::Prompt(format!("{}: {}", request.name, e)))
    }

    fn ask_stdin(&self, request: &PromptRequest) -> ConfigResult<String> {
        ask_lines(request, std::io::stdin().lock(), std::io::stderr())
    }
}

/// Ask on `output` and read answers from `input` until one is valid.
///
/// Empty lines take the default. Running out of input is an error.
fn ask_lines(
    request: &PromptRequest,
    input: impl BufRead,
    mut output: impl Write,
) -> ConfigResult<String> {
    let mut lines = input.lines();

    loop {
        writeln!(output, "{}", request.question)?;
        let line = match lines.next() {
            Some(line) => line?,
            None => {
                return Err(ConfigError::Prompt(format!(
                    "{}: input closed before a valid answer was given",
                    request.name
                )));
            }
        };

        let answer = request.with_default(line.trim().to_string());
        if request.is_valid(&answer) {
            return Ok(answer);
        }
        warn!(variable = %request.name, "{}", request.validation_message());
    }
}

impl Prompt for TerminalPrompt {
    fn ask(&mut self, request: &PromptRequest) -> ConfigResult<String> {
        if std::io::stdin().is_terminal() {
            self.ask_tty(request)
        } else {
            self.ask_stdin(request)
        }
    }
}

/// Prompt for unattended runs: answers with the default or fails.
#[derive(Debug, Default)]
pub struct NonInteractive;

impl Prompt for NonInteractive {
    fn ask(&mut self, request: &PromptRequest) -> ConfigResult<String> {
        match &request.default {
            Some(default) if request.is_valid(default) => Ok(default.clone()),
            _ => Err(ConfigError::MissingVariable(request.name.clone())),
        }
    }
}
