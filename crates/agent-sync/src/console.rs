//! Progress lines printed while a command runs.

const WIDTH: usize = 76;

/// Writes phase banners and their outcome to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct Console {
    quiet: bool,
}

impl Console {
    /// Console printing to stdout.
    pub fn new() -> Self {
        Self { quiet: false }
    }

    /// Console printing nothing.
    pub fn quiet() -> Self {
        Self { quiet: true }
    }

    /// Announce a phase.
    pub fn banner(&self, message: &str) {
        if !self.quiet {
            println!();
            println!("{}", banner_line(message));
        }
    }

    /// The current phase succeeded.
    pub fn ok(&self) {
        self.ok_with("");
    }

    pub fn ok_with(&self, info: &str) {
        if !self.quiet {
            println!("{}", status_line("Ok", info));
        }
    }

    /// The current phase (or one item of it) failed.
    pub fn failed(&self, info: &str) {
        if !self.quiet {
            println!("{}", status_line("Failed", info));
        }
    }

    /// Free text.
    pub fn line(&self, text: &str) {
        if !self.quiet {
            println!("{text}");
        }
    }
}

fn banner_line(message: &str) -> String {
    format!("{:*^WIDTH$}", format!(" {message} "))
}

fn status_line(status: &str, info: &str) -> String {
    if info.is_empty() {
        format!("** {status}")
    } else {
        format!("** {status}: {info}")
    }
}
