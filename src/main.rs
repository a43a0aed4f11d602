#[macro_use]
extern crate error_chain;
extern crate clap;
extern crate seccomp_run;
extern crate stderrlog;

use std::path::PathBuf;
use std::str::FromStr;

use error_chain::ChainedError;

use seccomp_run::config::{Action, Configuration, Mode, Target, Verbosity};
use seccomp_run::launcher;

error_chain! {
    types {
        Error, ErrorKind, ResultExt, Result;
    }

    links {
        SeccompRun(seccomp_run::Error, seccomp_run::ErrorKind);
    }

    foreign_links {
        Clap(::clap::Error);
    }
}

fn build_arg_parser<'a, 'b>() -> clap::App<'a, 'b> {
    clap::App::new("seccomp-run")
        .version("0.1")
        .about(
            "Run a program under a seccomp classifier, optionally mediated by a ptrace \
             tracer that can stub out or kill on matching syscalls.",
        )
        .arg(
            clap::Arg::with_name("action")
                .short("e")
                .takes_value(true)
                .value_name("ERRNO|crash")
                .required(true)
                .help("'crash' kills the process; a non-negative integer stubs the errno"),
        )
        .arg(
            clap::Arg::with_name("count")
                .short("n")
                .takes_value(true)
                .value_name("COUNT")
                .required(true)
                .help("number of syscall numbers found at the front of the trailing arguments"),
        )
        .arg(
            clap::Arg::with_name("scalar_arg")
                .short("p")
                .takes_value(true)
                .number_of_values(2)
                .value_names(&["POSITION", "VALUE"])
                .conflicts_with_all(&["path_arg", "same_path", "same_infer"])
                .help("intercept only when argument POSITION equals VALUE (forces ptrace mode)"),
        )
        .arg(
            clap::Arg::with_name("path_arg")
                .short("t")
                .takes_value(true)
                .number_of_values(2)
                .value_names(&["POSITION", "PATH"])
                .conflicts_with_all(&["scalar_arg", "same_path", "same_infer"])
                .help(
                    "intercept only when argument POSITION dereferences to PATH \
                     (forces ptrace mode)",
                ),
        )
        .arg(
            clap::Arg::with_name("same_path")
                .short("y")
                .takes_value(true)
                .value_name("PATH")
                .conflicts_with_all(&["scalar_arg", "path_arg", "same_infer"])
                .help("intercept only tasks currently running PATH (forces ptrace mode)"),
        )
        .arg(
            clap::Arg::with_name("same_infer")
                .short("z")
                .conflicts_with_all(&["scalar_arg", "path_arg", "same_path"])
                .help(
                    "intercept only tasks currently running the target program itself \
                     (forces ptrace mode)",
                ),
        )
        .arg(
            clap::Arg::with_name("debug")
                .short("d")
                .help("raise diagnostic verbosity"),
        )
        .arg(
            clap::Arg::with_name("quiet")
                .short("q")
                .help("lower diagnostic verbosity (ignored together with -d)"),
        )
        .arg(
            clap::Arg::with_name("rest")
                .value_name("SYSCALL... PROGRAM [ARGS...]")
                .multiple(true)
                .required(true)
                .help(
                    "COUNT syscall numbers (see -n), followed by the program to run and its \
                     own arguments",
                ),
        )
}

fn parse_action(matches: &clap::ArgMatches<'_>) -> Result<Action> {
    let raw = matches.value_of("action").unwrap();
    if raw == "crash" {
        return Ok(Action::KillProcess);
    }
    let errno = u16::from_str(raw).map_err(|_| Error::from(format!("invalid value for -e: '{}'", raw)))?;
    Ok(Action::ReturnErrno(errno))
}

/// `-n` gives only the count; the syscall numbers themselves are the first
/// `count` entries of the trailing `rest` argument list, with the target
/// program and its own arguments following immediately after.
fn syscall_count(matches: &clap::ArgMatches<'_>) -> Result<usize> {
    let raw = matches.value_of("count").unwrap();
    let count = usize::from_str(raw).map_err(|_| Error::from(format!("invalid value for -n: '{}'", raw)))?;
    if count == 0 {
        return Err(Error::from("-n requires at least one syscall"));
    }
    Ok(count)
}

fn parse_syscalls(rest: &[&str], count: usize) -> Result<Vec<i64>> {
    if rest.len() <= count {
        return Err(Error::from(format!(
            "-n declared {} syscalls but only {} trailing arguments were given",
            count,
            rest.len()
        )));
    }

    rest[..count]
        .iter()
        .map(|v| i64::from_str(v).map_err(|_| Error::from(format!("invalid syscall number: '{}'", v))))
        .collect()
}

fn parse_position(raw: &str) -> Result<u8> {
    u8::from_str(raw).map_err(|_| Error::from(format!("invalid argument position: '{}'", raw)))
}

fn parse_mode(matches: &clap::ArgMatches<'_>) -> Result<Mode> {
    if let Some(mut values) = matches.values_of("scalar_arg") {
        let pos = parse_position(values.next().unwrap())?;
        let raw_value = values.next().unwrap();
        let value = u64::from_str(raw_value).map_err(|_| Error::from(format!("invalid value for -p: '{}'", raw_value)))?;
        return Ok(Mode::ScalarArg { pos, value });
    }

    if let Some(mut values) = matches.values_of("path_arg") {
        let pos = parse_position(values.next().unwrap())?;
        let path = values.next().unwrap().as_bytes().to_vec();
        return Ok(Mode::PathArg { pos, path });
    }

    if let Some(path) = matches.value_of("same_path") {
        return Ok(Mode::SameExecutable {
            path: PathBuf::from(path),
        });
    }

    if matches.is_present("same_infer") {
        // Left empty; Configuration::infer_same_executable_path fills this
        // in from the target program once the target is known.
        return Ok(Mode::SameExecutable {
            path: PathBuf::new(),
        });
    }

    Ok(Mode::Unconditional)
}

fn parse_target(argv: &[&str]) -> Result<Target> {
    if argv.is_empty() {
        return Err(Error::from("missing target program"));
    }
    let program = PathBuf::from(argv[0]);
    let args = argv.iter().map(|s| (*s).to_owned()).collect();
    Ok(Target::new(program, args))
}

fn build_configuration(matches: &clap::ArgMatches<'_>) -> Result<Configuration> {
    let action = parse_action(matches)?;
    let count = syscall_count(matches)?;
    let rest: Vec<&str> = matches.values_of("rest").unwrap().collect();
    let dispositions = parse_syscalls(&rest, count)?;
    let mode = parse_mode(matches)?;
    let target = parse_target(&rest[count..])?;
    let verbosity = Verbosity::resolve(matches.is_present("quiet"), matches.is_present("debug"));

    let mut config = Configuration::new(dispositions, action, mode, target, verbosity)?;
    config.infer_same_executable_path()?;
    Ok(config)
}

fn init_diagnostics(verbosity: Verbosity) {
    let level = match verbosity {
        Verbosity::Quiet => 0,
        Verbosity::Normal => 2,
        Verbosity::Debug => 5,
    };
    stderrlog::new()
        .quiet(verbosity == Verbosity::Quiet)
        .verbosity(level)
        .init()
        .unwrap();
}

fn do_main() -> Result<()> {
    let matches = build_arg_parser().get_matches();
    let config = build_configuration(&matches)?;

    init_diagnostics(config.verbosity());
    log::debug!("configuration: {:?}", config);

    launcher::run(&config)?;
    Ok(())
}

fn main() {
    if let Err(e) = do_main() {
        eprintln!("{}", e.display_chain());
        std::process::exit(1);
    }
}
