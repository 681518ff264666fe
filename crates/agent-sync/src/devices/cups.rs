use super::{LogicalPrinter, PhysicalPrinter, PrinterError, PrinterSystem};
use agent_runtime::{CommandOutput, CommandRunner};

/// CUPS through its command line clients (`lpstat`, `lpadmin`).
#[derive(Debug, Clone)]
pub struct Cups {
    runner: CommandRunner,
}

impl Cups {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }

    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, PrinterError> {
        let output = self.runner.run(program, args)?;
        if output.success() {
            Ok(output)
        } else {
            Err(PrinterError::Failed {
                command: format!("{program} {}", args.join(" ")),
                stderr: output.stderr.trim().to_string(),
            })
        }
    }
}

impl PrinterSystem for Cups {
    fn printers(&self) -> Result<Vec<PhysicalPrinter>, PrinterError> {
        let output = self.runner.run("lpstat", &["-v"])?;
        if !output.success() {
            if output.stderr.contains("No destinations") {
                return Ok(Vec::new());
            }
            return Err(PrinterError::Failed {
                command: "lpstat -v".to_string(),
                stderr: output.stderr.trim().to_string(),
            });
        }

        let mut printers = Vec::new();
        for (name, uri) in parse_device_uris(&output.stdout) {
            let details = self.run("lpstat", &["-l", "-p", name.as_str()])?;
            let (info, location) = parse_details(&details.stdout);
            printers.push(PhysicalPrinter {
                name,
                info,
                location,
                uri,
            });
        }
        Ok(printers)
    }

    fn install(&self, printer: &LogicalPrinter) -> Result<(), PrinterError> {
        let mut args = vec!["-p", printer.name.as_str()];
        if let Some(driver) = &printer.driver {
            args.extend(["-P", driver.as_str()]);
        }
        args.extend(["-D", printer.info.as_str(), "-v", printer.uri.as_str()]);
        if !printer.location.is_empty() {
            args.extend(["-L", printer.location.as_str()]);
        }
        args.push("-E");
        self.run("lpadmin", &args).map(drop)
    }

    fn remove(&self, name: &str) -> Result<(), PrinterError> {
        self.run("lpadmin", &["-x", name]).map(drop)
    }

    fn default_printer(&self) -> Result<Option<String>, PrinterError> {
        let output = self.runner.run("lpstat", &["-d"])?;
        Ok(parse_default(&output.stdout))
    }

    fn set_default(&self, name: &str) -> Result<(), PrinterError> {
        self.run("lpadmin", &["-d", name]).map(drop)
    }
}

/// `(name, uri)` pairs of `lpstat -v` lines (`device for NAME: URI`).
fn parse_device_uris(output: &str) -> Vec<(String, String)> {
    output
        .lines()
        .filter_map(|line| {
            let rest = line.trim().strip_prefix("device for ")?;
            let (name, uri) = rest.split_once(':')?;
            Some((name.trim().to_string(), uri.trim().to_string()))
        })
        .collect()
}

/// Description and location of `lpstat -l -p NAME`.
fn parse_details(output: &str) -> (String, String) {
    let mut info = String::new();
    let mut location = String::new();
    for line in output.lines() {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("Description:") {
            info = value.trim().to_string();
        } else if let Some(value) = line.strip_prefix("Location:") {
            location = value.trim().to_string();
        }
    }
    (info, location)
}

fn parse_default(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.trim().strip_prefix("system default destination:"))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}
