//! Terminal output.
//!
//! Lines printed while a progress bar is active have to go through the bar,
//! otherwise they get overdrawn. [`Console`] hides that detail; with no bar it
//! prints straight to stdout.

use indicatif::{ProgressBar, ProgressStyle};

#[derive(Clone)]
pub struct Console {
    bar: Option<ProgressBar>,
    verbose: bool,
}

impl Console {
    pub fn new(verbose: bool) -> Self {
        Self { bar: None, verbose }
    }

    /// A copy of this console that routes output through a fresh progress bar
    /// of `len` steps.
    pub fn with_progress(&self, len: usize, message: &str) -> Self {
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        let bar = ProgressBar::new(len as u64);
        bar.set_style(style);
        bar.set_message(message.to_string());

        Self {
            bar: Some(bar),
            verbose: self.verbose,
        }
    }

    pub fn line(&self, msg: impl AsRef<str>) {
        match &self.bar {
            Some(bar) => bar.suspend(|| println!("{}", msg.as_ref())),
            None => println!("{}", msg.as_ref()),
        }
    }

    /// Prints only in verbose mode.
    pub fn detail(&self, msg: impl AsRef<str>) {
        if self.verbose {
            self.line(msg);
        }
    }

    pub fn advance(&self) {
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
    }

    pub fn finish(&self, message: &str) {
        if let Some(bar) = &self.bar {
            bar.finish_with_message(message.to_string());
        }
    }
}
