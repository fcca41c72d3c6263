use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use flatfs::io::BlockStorage;
use flatfs::{FlatFs, ROOT_SLOT};
use log::warn;

const FORMAT_PROMPT: &str =
    "Are you sure you want to format the virtual disk? This will erase all data. (Y/N): ";

/// Whether the loop keeps reading commands.
#[derive(Debug, PartialEq)]
pub enum Flow {
    Continue,
    Exit,
}

/// A line split the way the command loop reads it: the command word, the
/// first argument, and everything after that with one leading space removed.
#[derive(Debug, PartialEq)]
struct Line<'a> {
    cmd: &'a str,
    arg: Option<&'a str>,
    rest: &'a str,
}

fn next_word(s: &str) -> (Option<&str>, &str) {
    let s = s.trim_start();
    if s.is_empty() {
        return (None, s);
    }
    let end = s.find(char::is_whitespace).unwrap_or_else(|| s.len());
    (Some(&s[..end]), &s[end..])
}

fn split_line(line: &str) -> Line<'_> {
    let (cmd, rest) = next_word(line);
    let (arg, rest) = next_word(rest);
    let rest = rest.strip_prefix(' ').unwrap_or(rest);
    Line {
        cmd: cmd.unwrap_or(""),
        arg,
        rest,
    }
}

/// Interactive front end over a [`FlatFs`]. Commands come from `input`, all
/// messages go to `output`, entered lines are appended to the history file.
pub struct Shell<T: BlockStorage, R: BufRead, W: Write> {
    fs: FlatFs<T>,
    input: R,
    output: W,
    history: Option<PathBuf>,
}

impl<T: BlockStorage, R: BufRead, W: Write> Shell<T, R, W> {
    pub fn new(fs: FlatFs<T>, input: R, output: W, history: Option<PathBuf>) -> Self {
        Self {
            fs,
            input,
            output,
            history,
        }
    }

    #[cfg(test)]
    pub fn into_parts(self) -> (FlatFs<T>, W) {
        (self.fs, self.output)
    }

    /// Reads and executes commands until `exit` or end of input.
    pub fn run(&mut self) -> io::Result<()> {
        loop {
            write!(self.output, "> ")?;
            self.output.flush()?;
            let line = match self.read_line()? {
                Some(line) => line,
                None => return Ok(()),
            };
            self.record(&line)?;
            if self.execute(&line, false)? == Flow::Exit {
                return Ok(());
            }
        }
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(|c: char| c == '\n' || c == '\r').len();
        line.truncate(trimmed);
        Ok(Some(line))
    }

    fn record(&mut self, line: &str) -> io::Result<()> {
        if let Some(path) = &self.history {
            let mut hist = OpenOptions::new().create(true).append(true).open(path)?;
            writeln!(hist, "{}", line)?;
        }
        Ok(())
    }

    /// Runs one command line. Lines coming from a script may not format the
    /// disk, start another script or leave the shell.
    pub fn execute(&mut self, line: &str, in_script: bool) -> io::Result<Flow> {
        let Line { cmd, arg, rest } = split_line(line);
        if in_script && matches!(cmd, "run" | "format" | "exit") {
            writeln!(self.output, "Invalid command in script: {}", cmd)?;
            return Ok(Flow::Continue);
        }

        match (cmd, arg) {
            ("", _) => (),
            ("mkdir", Some(name)) => {
                let res = self.fs.make_directory(name).map(|_| "Directory created");
                self.report(res)?;
            }
            ("touch", Some(name)) => {
                let res = self.fs.make_file(name).map(|_| "File created");
                self.report(res)?;
            }
            ("ls", _) => {
                for entry in self.fs.list() {
                    writeln!(self.output, "{}", entry)?;
                }
            }
            ("cd", Some(name)) => {
                let res = self.fs.change_directory(name).map(|_| "");
                self.report(res)?;
            }
            ("cat", Some(name)) => {
                let res = self.fs.read_file(name);
                self.report(res)?;
            }
            ("write", Some(name)) => {
                let res = self.fs.write_file(name, rest).map(|_| "Written to file");
                self.report(res)?;
            }
            ("rm", Some(name)) => {
                let res = self.fs.remove(name).map(|_| "Deleted successfully");
                self.report(res)?;
            }
            ("pwd", _) => {
                let res = self.fs.print_working_path();
                self.report(res)?;
            }
            ("tree", _) => {
                for line in self.fs.tree(ROOT_SLOT, 0) {
                    writeln!(self.output, "{}", line)?;
                }
            }
            ("login", Some(username)) => {
                let res = self
                    .fs
                    .login(username)
                    .map(|uid| format!("Logged in as {} (UID {})", username, uid));
                self.report(res)?;
            }
            ("logout", _) => {
                self.fs.logout();
                writeln!(self.output, "Logged out. Defaulting to root")?;
            }
            ("format", _) => self.format()?,
            ("search", Some(name)) => {
                let found = self.fs.search(name);
                if found.is_empty() {
                    writeln!(self.output, "No matches found")?;
                }
                for path in found {
                    writeln!(self.output, "Found at: {}", path)?;
                }
            }
            ("history", _) => self.print_history()?,
            ("run", Some(path)) => self.run_script(path)?,
            ("exit", _) => return Ok(Flow::Exit),
            ("mkdir", None) | ("touch", None) | ("cd", None) | ("cat", None) | ("rm", None)
            | ("search", None) => writeln!(self.output, "Usage: {} <name>", cmd)?,
            ("write", None) => writeln!(self.output, "Usage: write <name> <content>")?,
            ("login", None) => writeln!(self.output, "Usage: login <username>")?,
            ("run", None) => writeln!(self.output, "Usage: run <script>")?,
            (_, _) if in_script => writeln!(self.output, "Invalid command in script: {}", cmd)?,
            (_, _) => writeln!(self.output, "Invalid command")?,
        }
        Ok(Flow::Continue)
    }

    /// Prints the success message or the error. Empty messages print nothing.
    fn report<M: AsRef<str>>(&mut self, res: flatfs::Result<M>) -> io::Result<()> {
        match res {
            Ok(msg) if msg.as_ref().is_empty() => Ok(()),
            Ok(msg) => writeln!(self.output, "{}", msg.as_ref()),
            Err(e) => writeln!(self.output, "{}", e),
        }
    }

    fn format(&mut self) -> io::Result<()> {
        write!(self.output, "{}", FORMAT_PROMPT)?;
        self.output.flush()?;
        let answer = self.read_line()?.unwrap_or_default();
        if answer.trim() != "Y" && answer.trim() != "y" {
            return writeln!(self.output, "Format canceled.");
        }
        let res = self.fs.format().map(|_| "Disk formatted successfully.");
        self.report(res)
    }

    fn print_history(&mut self) -> io::Result<()> {
        let path = match &self.history {
            Some(path) => path,
            None => return Ok(()),
        };
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        for (i, line) in BufReader::new(file).lines().enumerate() {
            writeln!(self.output, "{}: {}", i + 1, line?)?;
        }
        Ok(())
    }

    /// Executes every line of a script file, echoing each line first.
    pub fn run_script<P: AsRef<Path>>(&mut self, path: P) -> io::Result<()> {
        let script = match File::open(path.as_ref()) {
            Ok(file) => file,
            Err(e) => {
                warn!("could not open script {}: {}", path.as_ref().display(), e);
                return writeln!(self.output, "Failed to open script file");
            }
        };
        for line in BufReader::new(script).lines() {
            let line = line?;
            writeln!(self.output, "> {}", line)?;
            self.execute(&line, true)?;
        }
        Ok(())
    }
}
