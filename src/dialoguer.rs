use std::fmt;

use colored::Colorize;
use dialoguer::{console::Term, theme::ColorfulTheme, Confirm, Input, MultiSelect, Password};
use error_stack::{IntoReport, Result, ResultExt};

#[derive(Debug)]
pub struct DialoguerError;

impl fmt::Display for DialoguerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Dialoguer error")
    }
}

impl std::error::Error for DialoguerError {}

pub type DialoguerResult<T> = error_stack::Result<T, DialoguerError>;

#[derive(Debug, Clone)]
pub struct Dialoguer;

impl Dialoguer {
    pub fn multiselect<T>(
        prompt_text: String,
        items: Vec<T>,
        force_select: bool,
    ) -> DialoguerResult<Vec<usize>>
    where
        T: ToString + Clone,
    {
        loop {
            let colorful_theme = &ColorfulTheme::default();
            let mut multi_select = MultiSelect::with_theme(colorful_theme);
            let dialog = multi_select.with_prompt(&prompt_text).items(&items);
            let result = dialog
                .interact_on_opt(&Term::stderr())
                .into_report()
                .change_context(DialoguerError)?
                .ok_or(DialoguerError)
                .into_report()?;
            if force_select && result.is_empty() {
                println!(
                    "{}",
                    "No option selected, you should pick at least 1 by hitting space bar".red()
                );
            } else {
                return Ok(result);
            }
        }
    }

    /// Yes/no question. Escape or `q` answers `default`.
    pub fn confirm(prompt_text: String, default: bool) -> Result<bool, DialoguerError> {
        let colorful_theme = &ColorfulTheme::default();
        let answer = Confirm::with_theme(colorful_theme)
            .with_prompt(&prompt_text)
            .default(default)
            .interact_on_opt(&Term::stderr())
            .into_report()
            .change_context(DialoguerError)?;
        Ok(answer.unwrap_or(default))
    }

    pub fn input(prompt_text: String, default: Option<String>) -> Result<String, DialoguerError> {
        let colorful_theme = &ColorfulTheme::default();
        let mut input = Input::with_theme(colorful_theme);
        input.with_prompt(&prompt_text);
        if let Some(default) = default {
            input.default(default);
        }
        let dialog: String = input
            .interact_text()
            .into_report()
            .change_context(DialoguerError)?;

        Ok(dialog)
    }

    /// Hidden input. An empty answer keeps the current value when `allow_empty` is set.
    pub fn password(prompt_text: String, allow_empty: bool) -> Result<String, DialoguerError> {
        let colorful_theme = &ColorfulTheme::default();
        let mut input = Password::with_theme(colorful_theme);
        let dialog: String = input
            .with_prompt(&prompt_text)
            .allow_empty_password(allow_empty)
            .interact()
            .into_report()
            .change_context(DialoguerError)?;

        Ok(dialog)
    }
}
