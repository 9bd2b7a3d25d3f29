use crossterm::style::{Color, Stylize};
use std::env;
use std::io::IsTerminal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeToken {
    Prompt,
    AssistantText,
    ToolNotice,
    Error,
    Info,
}

/// Terminal colors; a disabled theme renders text unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    enabled: bool,
}

impl Theme {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Colors are on when stdout is a terminal and `NO_COLOR` is unset.
    pub fn detect() -> Self {
        let no_color = env::var_os("NO_COLOR").is_some_and(|value| !value.is_empty());
        Self::new(!no_color && std::io::stdout().is_terminal())
    }

    pub fn paint(&self, token: ThemeToken, text: &str) -> String {
        if !self.enabled {
            return text.to_string();
        }

        let color = match token {
            ThemeToken::Prompt => Color::Green,
            ThemeToken::AssistantText | ThemeToken::ToolNotice => Color::Blue,
            ThemeToken::Error => Color::Magenta,
            ThemeToken::Info => Color::DarkGrey,
        };
        text.with(color).to_string()
    }
}
