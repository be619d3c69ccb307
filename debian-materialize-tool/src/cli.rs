// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    anyhow::{anyhow, Context, Result},
    clap::{Arg, ArgAction, ArgMatches, Command},
    debian_materialize::{
        destination::{DestinationSpec, PathMapping},
        installer::{Installer, DEFAULT_ARCHITECTURE},
    },
    std::path::PathBuf,
};

const SOURCES_ABOUT: &str = "\
Repository sources

Repositories are declared with APT-style source lines:

    deb <base-url> <distribution> <component>...

e.g. `deb http://archive.ubuntu.com/ubuntu jammy main universe`. Pass each
line with --source, or point --sources-file at a file holding one line per
row (a sources.list works; lines not starting with `deb` are ignored).

No Release/InRelease signature verification is performed. Only use
repositories you trust.
";

const INSTALL_ABOUT: &str = "\
Materialize packages into a directory tree.

Each named package is resolved against the configured repositories,
downloaded, and its payload unpacked under the destination. Unless
--no-recursive is given, runtime dependencies are materialized too.

The destination is either a single directory (--dest) or a set of prefix
mappings (--map PREFIX=DIR, repeatable). With mappings, each archive entry
is placed under the directory of the first matching prefix and entries
matching no prefix are skipped, e.g.:

    debmat install --source '...' \\
        --map ./usr/lib/x86_64-linux-gnu=./sysroot/lib \\
        --map ./usr/include=./sysroot/include \\
        libboost-all-dev

Downloaded .deb files are kept in the temp directory (default ./tmp) and
are not cleaned up.
";

fn cli() -> Command {
    Command::new("debmat")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Materialize Debian packages from APT repositories")
        .after_long_help(SOURCES_ABOUT)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("install")
                .about("Materialize packages into a directory tree")
                .long_about(INSTALL_ABOUT)
                .arg(
                    Arg::new("source")
                        .long("source")
                        .short('s')
                        .action(ArgAction::Append)
                        .value_name("LINE")
                        .help("APT-style source line (repeatable)"),
                )
                .arg(
                    Arg::new("sources_file")
                        .long("sources-file")
                        .value_name("PATH")
                        .help("File of source lines, one per row"),
                )
                .arg(
                    Arg::new("dest")
                        .long("dest")
                        .value_name("DIR")
                        .help("Directory receiving every extracted file"),
                )
                .arg(
                    Arg::new("map")
                        .long("map")
                        .action(ArgAction::Append)
                        .value_name("PREFIX=DIR")
                        .help("Route archive paths under PREFIX into DIR (repeatable)"),
                )
                .arg(
                    Arg::new("architecture")
                        .long("architecture")
                        .value_name("ARCH")
                        .default_value(DEFAULT_ARCHITECTURE)
                        .help("Architecture path component of Packages indices"),
                )
                .arg(
                    Arg::new("no_recursive")
                        .long("no-recursive")
                        .action(ArgAction::SetTrue)
                        .help("Do not materialize dependencies"),
                )
                .arg(
                    Arg::new("strict")
                        .long("strict")
                        .action(ArgAction::SetTrue)
                        .help("Abort the run on the first failed dependency"),
                )
                .arg(
                    Arg::new("recursion_limit")
                        .long("recursion-limit")
                        .value_name("DEPTH")
                        .value_parser(clap::value_parser!(usize))
                        .help("Cut dependency chains deeper than DEPTH"),
                )
                .arg(
                    Arg::new("workers")
                        .long("workers")
                        .value_name("COUNT")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("16")
                        .help("Concurrent download/extract workers"),
                )
                .arg(
                    Arg::new("temp_dir")
                        .long("temp-dir")
                        .value_name("DIR")
                        .default_value("./tmp")
                        .help("Directory receiving downloaded .deb files"),
                )
                .arg(
                    Arg::new("packages")
                        .required(true)
                        .num_args(1..)
                        .value_name("PACKAGE")
                        .help("Packages to materialize"),
                ),
        )
}

pub async fn run_cli() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = cli().get_matches();

    match matches.subcommand() {
        Some(("install", args)) => command_install(args).await,
        _ => Err(anyhow!("invalid subcommand")),
    }
}

async fn command_install(args: &ArgMatches) -> Result<()> {
    let mut sources: Vec<String> = args
        .get_many::<String>("source")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    if let Some(path) = args.get_one::<String>("sources_file") {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading sources file {}", path))?;
        sources.extend(text.lines().map(String::from));
    }

    if sources.is_empty() {
        return Err(anyhow!("no sources given; use --source or --sources-file"));
    }

    let destination = resolve_destination(args)?;

    let installer = Installer::new(sources)?
        .set_architecture(args.get_one::<String>("architecture").expect("has default"))
        .set_recursive(!args.get_flag("no_recursive"))
        .set_throw_on_failed_dependency(args.get_flag("strict"))
        .set_recursion_limit(args.get_one::<usize>("recursion_limit").copied())
        .set_worker_count(*args.get_one::<usize>("workers").expect("has default"))
        .set_temp_dir(args.get_one::<String>("temp_dir").expect("has default"));

    let packages = args
        .get_many::<String>("packages")
        .expect("packages is required")
        .cloned()
        .collect::<Vec<_>>()
        .join(" ");

    installer.install(&packages, destination).await?;

    Ok(())
}

fn resolve_destination(args: &ArgMatches) -> Result<DestinationSpec> {
    let mappings: Vec<&String> = args
        .get_many::<String>("map")
        .map(|values| values.collect())
        .unwrap_or_default();

    if !mappings.is_empty() {
        let mut list = Vec::new();

        for value in mappings {
            let (prefix, directory) = value
                .split_once('=')
                .ok_or_else(|| anyhow!("--map takes PREFIX=DIR, got {}", value))?;
            list.push(PathMapping::new(prefix, PathBuf::from(directory)));
        }

        return Ok(DestinationSpec::Mapped(list));
    }

    let dest = args
        .get_one::<String>("dest")
        .ok_or_else(|| anyhow!("either --dest or --map is required"))?;

    Ok(DestinationSpec::Directory(PathBuf::from(dest)))
}
