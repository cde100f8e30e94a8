use std::path::Path;

use crate::core::error::{InstallerError, InstallerResult};
use crate::core::install::{Install, InstallChoice};
use crate::core::patch::Consent;

/// Tab completion for the custom location input.
///
/// Candidates are the entries of the directory being typed into, filtered by
/// the partial file name. Repeated completions cycle through them.
#[derive(Debug, Default, Clone)]
pub struct PathAutocomplete {
    dir: String,
    file: String,
    candidates: Vec<String>,
    index: usize,
    last: String,
    did_complete: bool,
}

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// Directory part and last component, like `path.Dir`/`path.Base`.
fn split_input(input: &str) -> (String, String) {
    match input.rfind(is_separator) {
        Some(0) => ("/".to_string(), input[1..].to_string()),
        Some(i) => (input[..i].to_string(), input[i + 1..].to_string()),
        None => (".".to_string(), input.to_string()),
    }
}

impl PathAutocomplete {
    /// Feed the new input text after every edit.
    pub fn on_input_changed(&mut self, input: &str) {
        let (dir, base) = split_input(input);
        let is_new_dir = input.ends_with(is_separator);
        let went_up = !is_new_dir && dir != self.dir;

        if is_new_dir || went_up {
            self.dir = dir;
            self.index = 0;
            self.last.clear();
            self.file.clear();
            self.candidates = list_dir(Path::new(&self.dir));
        } else if !self.did_complete {
            self.file = base.clone();
            self.last.clear();
        }

        if went_up {
            self.file = base;
        }
        self.did_complete = false;
    }

    /// Entries matching the partial name, case-insensitively.
    pub fn candidates(&self) -> Vec<&str> {
        let partial = self.file.to_lowercase();
        self.candidates
            .iter()
            .filter(|c| partial.is_empty() || c.to_lowercase().starts_with(&partial))
            .map(String::as_str)
            .collect()
    }

    /// Replace the partial (or previous completion) at the end of `input`
    /// with the next candidate. Returns the new input text.
    pub fn complete(&mut self, input: &str) -> Option<String> {
        let candidates: Vec<String> = self.candidates().into_iter().map(str::to_string).collect();
        if candidates.is_empty() {
            return None;
        }
        if self.index >= candidates.len() {
            self.index = 0;
        }
        let candidate = candidates[self.index].clone();

        let mut text = input.to_string();
        let strip = if !self.last.is_empty() {
            self.last.len()
        } else {
            self.file.len()
        };
        let keep = text.len().saturating_sub(strip);
        if !text.is_char_boundary(keep) {
            return None;
        }
        text.truncate(keep);
        text.push_str(&candidate);

        self.did_complete = true;
        self.last = candidate;
        self.index += 1;
        self.on_input_changed(&text);
        Some(text)
    }
}

fn list_dir(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

/// Per-process UI state shared between the front end and the engine.
///
/// Never persisted; a new run starts with a fresh session.
#[derive(Debug, Default)]
pub struct SessionState {
    install_count: usize,
    selected: usize,
    custom_path: String,
    autocomplete: PathAutocomplete,
    accepted_open_asar: bool,
    showed_update_prompt: bool,
}

impl SessionState {
    pub fn new(install_count: usize) -> Self {
        Self {
            install_count,
            ..Self::default()
        }
    }

    /// After a rescan; keeps consent and prompt flags.
    pub fn set_install_count(&mut self, install_count: usize) {
        self.install_count = install_count;
        self.selected = self.selected.min(install_count);
    }

    /// Index of the "custom location" entry, right after the found installs.
    pub fn custom_index(&self) -> usize {
        self.install_count
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn select(&mut self, index: usize) {
        self.selected = index.min(self.custom_index());
    }

    pub fn select_previous(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn select_next(&mut self) {
        if self.selected < self.custom_index() {
            self.selected += 1;
        }
    }

    pub fn custom_path(&self) -> &str {
        &self.custom_path
    }

    /// Typing a custom path selects the custom entry.
    pub fn set_custom_path(&mut self, input: &str) {
        self.custom_path = input.to_string();
        if !input.is_empty() {
            self.selected = self.custom_index();
        }
        self.autocomplete.on_input_changed(input);
    }

    pub fn autocomplete_candidates(&self) -> Vec<&str> {
        self.autocomplete.candidates()
    }

    pub fn complete_custom_path(&mut self) -> Option<&str> {
        let text = self.autocomplete.complete(&self.custom_path)?;
        self.custom_path = text;
        Some(&self.custom_path)
    }

    /// The current selection as a choice the locator can resolve.
    pub fn choice(&self, installs: &[Install]) -> InstallChoice {
        match installs.get(self.selected) {
            Some(install) if self.selected != self.custom_index() => {
                InstallChoice::Known(install.clone())
            }
            _ => InstallChoice::PendingCustomPath(self.custom_path.clone()),
        }
    }

    pub fn accept_open_asar(&mut self) {
        self.accepted_open_asar = true;
    }

    pub fn has_accepted_open_asar(&self) -> bool {
        self.accepted_open_asar
    }

    /// Consent for installing OpenAsar, once the notice was accepted this run.
    pub fn open_asar_consent(&self) -> InstallerResult<Consent> {
        if self.accepted_open_asar {
            Ok(Consent::granted())
        } else {
            Err(InstallerError::ConsentRequired)
        }
    }

    /// True exactly once per run, and only when an update exists.
    pub fn take_update_prompt(&mut self, is_outdated: bool) -> bool {
        if is_outdated && !self.showed_update_prompt {
            self.showed_update_prompt = true;
            return true;
        }
        false
    }
}
