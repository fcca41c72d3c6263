mod shell;

use std::io;
use std::path::{Path, PathBuf};
use std::process;

use clap::{App, Arg};
use flatfs::{DiskGeometry, FlatFs};
use log::error;

use crate::shell::Shell;

pub fn main() {
    env_logger::init();

    let matches = App::new("flatfs")
        .about("Single user file system inside one virtual disk file")
        .arg(
            Arg::with_name("disk")
                .long("disk")
                .takes_value(true)
                .default_value("virtual_disk.bin")
                .help("Virtual disk file, created if missing"),
        )
        .arg(
            Arg::with_name("history")
                .long("history")
                .takes_value(true)
                .default_value("history.txt")
                .help("File every entered command is appended to"),
        )
        .arg(
            Arg::with_name("script")
                .long("script")
                .takes_value(true)
                .help("Run the commands in this file and exit"),
        )
        .get_matches();

    let disk = Path::new(matches.value_of("disk").unwrap_or("virtual_disk.bin"));
    let history = matches.value_of("history").map(PathBuf::from);

    if !disk.exists() {
        println!("Creating virtual disk...");
    }
    let fs = match FlatFs::open_or_create(disk, DiskGeometry::default()) {
        Ok(fs) => fs,
        Err(e) => {
            error!("could not open {}: {:?}", disk.display(), e);
            eprintln!("Failed to open virtual disk {}: {}", disk.display(), e);
            process::exit(1);
        }
    };

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut shell = Shell::new(fs, stdin.lock(), stdout.lock(), history);
    let res = match matches.value_of("script") {
        Some(script) => shell.run_script(script),
        None => shell.run(),
    };
    if let Err(e) = res {
        eprintln!("{}", e);
        process::exit(1);
    }
}
