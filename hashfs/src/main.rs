//TODO: update clap to remove the need for this
#![allow(dangerous_implicit_autorefs)]

use std::io;
use std::path::Path;

use clap::{
    crate_authors, crate_description, crate_name, crate_version, App, AppSettings, Arg, SubCommand,
};
use hashfs::{extract, extract_all, info, list, ListKinds};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("HASHFS_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let arg_archive = Arg::with_name("archive")
        .help("Archive file")
        .short("a")
        .long("archive")
        .required(true)
        .takes_value(true)
        .value_name("FILE");

    let matches = App::new(crate_name!())
        .author(crate_authors!(", "))
        .about(crate_description!())
        .version(crate_version!())
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("info")
                .about("Show archive header")
                .arg(&arg_archive),
        )
        .subcommand(
            SubCommand::with_name("list")
                .about("List a directory")
                .arg(&arg_archive)
                .arg(
                    Arg::with_name("path")
                        .help("Directory to list (defaults to '/')")
                        .value_name("PATH")
                        .default_value("/"),
                )
                .arg(
                    Arg::with_name("files")
                        .help("Only list files")
                        .long("files")
                        .conflicts_with("dirs"),
                )
                .arg(
                    Arg::with_name("dirs")
                        .help("Only list directories")
                        .long("dirs"),
                )
                .arg(
                    Arg::with_name("recursive")
                        .help("Descend into subdirectories")
                        .short("r")
                        .long("recursive"),
                ),
        )
        .subcommand(
            SubCommand::with_name("extract")
                .about("Extract one file")
                .arg(&arg_archive)
                .arg(
                    Arg::with_name("path")
                        .help("Path of the file in the archive")
                        .required(true)
                        .value_name("PATH"),
                )
                .arg(
                    Arg::with_name("output")
                        .help("File to write to (defaults to stdout)")
                        .short("o")
                        .long("output")
                        .takes_value(true)
                        .value_name("FILE"),
                ),
        )
        .subcommand(
            SubCommand::with_name("extract-all")
                .about("Extract every file reachable from the root directory")
                .arg(&arg_archive)
                .arg(
                    Arg::with_name("basedir")
                        .help("Directory to unpack to (defaults to '.')")
                        .required(true)
                        .value_name("DIR")
                        .default_value("."),
                ),
        )
        .get_matches();

    let stdout = io::stdout();
    let mut out = stdout.lock();

    if let Some(matches) = matches.subcommand_matches("info") {
        info(matches.value_of("archive").unwrap(), &mut out)?;
    } else if let Some(matches) = matches.subcommand_matches("list") {
        let kinds = if matches.is_present("files") {
            ListKinds::FILES
        } else if matches.is_present("dirs") {
            ListKinds::DIRECTORIES
        } else {
            ListKinds::all()
        };
        list(
            matches.value_of("archive").unwrap(),
            matches.value_of("path").unwrap(),
            kinds,
            matches.is_present("recursive"),
            &mut out,
        )?;
    } else if let Some(matches) = matches.subcommand_matches("extract") {
        extract(
            matches.value_of("archive").unwrap(),
            matches.value_of("path").unwrap(),
            matches.value_of("output").map(Path::new),
            &mut out,
        )?;
    } else if let Some(matches) = matches.subcommand_matches("extract-all") {
        let count = extract_all(
            matches.value_of("archive").unwrap(),
            matches.value_of("basedir").unwrap(),
        )?;
        eprintln!("Extracted {} files", count);
    }

    Ok(())
}
