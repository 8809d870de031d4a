use colored::{Color, Colorize};
use std::io::{self, Stdout, Write};
use tandem_types::Dependency;

pub struct Logger<W: Write = Stdout> {
    output: W,
}

impl<W: Write> Logger<W> {
    pub fn new(output: W) -> Self {
        Self { output }
    }

    fn color(dependency: Dependency) -> Color {
        match dependency {
            Dependency::Database => Color::Cyan,
            Dependency::Application => Color::Magenta,
        }
    }

    fn write(&mut self, prefix: &str, message: &str) {
        for line in message.lines() {
            let _ = writeln!(self.output, "{prefix} {line}");
        }
    }

    /// Output of a supervised dependency.
    pub fn log(&mut self, dependency: Dependency, message: &str) {
        let prefix = format!("[{dependency}]")
            .color(Self::color(dependency))
            .to_string();
        self.write(&prefix, message);
    }

    pub fn progress(&mut self, dependency: Dependency, text: &str, wait: bool) {
        let prefix = format!("[{dependency}]")
            .color(Self::color(dependency))
            .bold()
            .to_string();
        if wait {
            self.write(&prefix, &format!("{text} (this may take several minutes)"));
        } else {
            self.write(&prefix, text);
        }
    }

    pub fn system(&mut self, message: &str) {
        let prefix = "[system]".color(Color::Green).to_string();
        self.write(&prefix, message);
    }

    pub fn error(&mut self, message: &str) {
        let prefix = "[error]".color(Color::Red).to_string();
        self.write(&prefix, message);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(io::stdout())
    }
}
