//-
// Copyright (c) 2024, Jason Lingle
//
// This file is part of Mailpat.
//
// Mailpat is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Mailpat is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Mailpat. If not, see <http://www.gnu.org/licenses/>.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use log::{debug, LevelFilter};
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use structopt::StructOpt;

use mailpat::pattern::compile::{compile, CompileContext};
use mailpat::pattern::func::{limit_current_thread, pattern_func, BulkOp};
use mailpat::pattern::search::{SearchOp, SearchSession};
use mailpat::pattern::simple::expand_simple;
use mailpat::pattern::view::MessageView;
use mailpat::store::Mailbox;
use mailpat::support::config::PatternConfig;
use mailpat::support::error::{Error, ErrorClass, MESSAGE_BUFFER_LEN};
use mailpat::support::sysexits::*;

#[derive(StructOpt)]
#[structopt(max_term_width = 80)]
struct Options {
    /// Read pattern options from this TOML file.
    ///
    /// If a file named `logging.toml` exists in the same directory, it is
    /// used to configure logging.
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Log what is being compiled and searched to standard error.
    #[structopt(short, long)]
    verbose: bool,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt)]
enum Command {
    Check(CheckSubcommand),
    Search(SearchSubcommand),
    Find(FindSubcommand),
    Thread(ThreadSubcommand),
}

/// Compile a pattern and print the resulting tree.
///
/// Simple searches are expanded first, so this also shows what a plain
/// word will search for.
#[derive(StructOpt)]
struct CheckSubcommand {
    /// The number of the current message, for relative message ranges such
    /// as `~m -2,2`.
    #[structopt(long)]
    current: Option<i64>,

    pattern: String,
}

/// Print the numbers of all messages in a mailbox which match a pattern.
///
/// The mailbox is a TOML file containing `[[message]]` tables. Exits with
/// status 1 if nothing matched.
#[derive(StructOpt)]
struct SearchSubcommand {
    #[structopt(parse(from_os_str))]
    mailbox: PathBuf,

    pattern: String,
}

/// Search for the next matching message, as an interactive search does.
///
/// The search starts after the `--from` message and wraps around the ends
/// of the mailbox unless `wrap_search` is disabled.
#[derive(StructOpt)]
struct FindSubcommand {
    /// The number of the message to start from.
    #[structopt(long, default_value = "1")]
    from: usize,

    /// Search towards the start of the mailbox.
    #[structopt(short, long)]
    reverse: bool,

    /// Keep searching from each match this many times in total.
    #[structopt(long, default_value = "1")]
    count: usize,

    #[structopt(parse(from_os_str))]
    mailbox: PathBuf,

    pattern: String,
}

/// Print the numbers of the messages in the same thread as a message.
#[derive(StructOpt)]
struct ThreadSubcommand {
    #[structopt(parse(from_os_str))]
    mailbox: PathBuf,

    message: usize,
}

pub fn main() {
    // Clap exits with status 1 instead of EX_USAGE if we use the more concise
    // API
    let options =
        Options::from_clap(&match Options::clap().get_matches_safe() {
            Ok(matches) => matches,
            Err(
                e @ clap::Error {
                    kind: clap::ErrorKind::HelpDisplayed,
                    ..
                },
            )
            | Err(
                e @ clap::Error {
                    kind: clap::ErrorKind::VersionDisplayed,
                    ..
                },
            ) => {
                println!("{}", e.message);
                return;
            }
            Err(e) => {
                eprintln!("{}", e.message);
                EX_USAGE.exit()
            }
        });

    init_log(options.verbose, options.config.as_deref());

    let config = match options.config {
        None => PatternConfig::default(),
        Some(ref path) => match PatternConfig::load(path) {
            Ok(config) => config,
            Err(Error::Io(e)) => {
                die!(EX_CONFIG, "Error reading '{}': {}", path.display(), e)
            }
            Err(e) => die!(EX_CONFIG, "{}", e),
        },
    };

    let result = match options.command {
        Command::Check(cmd) => check(&config, cmd),
        Command::Search(cmd) => search(&config, cmd),
        Command::Find(cmd) => find(&config, cmd),
        Command::Thread(cmd) => thread(cmd),
    };

    if let Err(exit) = result {
        exit.exit();
    }
}

fn init_log(verbose: bool, config: Option<&Path>) {
    let log_config_file = config
        .and_then(Path::parent)
        .map(|dir| dir.join("logging.toml"))
        .filter(|file| file.is_file());

    if let Some(log_config_file) = log_config_file {
        if let Err(e) = log4rs::init_file(
            &log_config_file,
            log4rs::file::Deserializers::new(),
        ) {
            die!(
                EX_CONFIG,
                "Error in logging config at '{}': {}",
                log_config_file.display(),
                e
            );
        }
        return;
    }

    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("{l} [{t}] {m}{n}")))
        .build();
    let log_config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level));

    match log_config {
        Ok(log_config) => {
            // Only fails if a logger is already installed
            let _ = log4rs::init_config(log_config);
        }
        Err(e) => die!(EX_SOFTWARE, "Failed to initialise logging: {}", e),
    }
}

/// Report `e` and pick the exit status for it.
fn fail(e: Error) -> Sysexit {
    eprintln!("{}", e.to_bounded_string(MESSAGE_BUFFER_LEN));
    match e.class() {
        ErrorClass::Syntax
        | ErrorClass::Capability
        | ErrorClass::Context
        | ErrorClass::Library
        | ErrorClass::Config => EX_DATAERR,
        ErrorClass::NotFound => EX_NOTFOUND,
        ErrorClass::Interrupted => EX_SOFTWARE,
        ErrorClass::Io => EX_IOERR,
    }
}

fn load_mailbox(path: &Path) -> Result<Mailbox, Sysexit> {
    debug!("Loading mailbox from '{}'", path.display());
    Mailbox::load(path).map_err(|e| match e {
        Error::Io(e) => {
            eprintln!("Error reading '{}': {}", path.display(), e);
            if io::ErrorKind::NotFound == e.kind() {
                EX_NOINPUT
            } else {
                EX_IOERR
            }
        }
        e => fail(e),
    })
}

fn print_visible(mbox: &Mailbox) {
    for vix in 0..mbox.visible_count() {
        println!("{}", mbox.visible_message(vix) + 1);
    }
}

fn check(config: &PatternConfig, cmd: CheckSubcommand) -> Result<(), Sysexit> {
    let expanded = expand_simple(&cmd.pattern, &config.simple_search);
    let ctx = CompileContext::new(config.capabilities())
        .with_current_message(cmd.current);
    let pattern = compile(&expanded, &ctx).map_err(fail)?;
    println!("{}", pattern);
    Ok(())
}

fn search(
    config: &PatternConfig,
    cmd: SearchSubcommand,
) -> Result<(), Sysexit> {
    let mut mbox = load_mailbox(&cmd.mailbox)?;
    let ctx = CompileContext::new(config.capabilities());
    let outcome =
        pattern_func(&mut mbox, BulkOp::Limit, &cmd.pattern, config, &ctx)
            .map_err(fail)?;

    if let Some(notice) = outcome.notice {
        eprintln!("{}", notice);
    }
    print_visible(&mbox);

    if 0 == outcome.matched {
        Err(EX_NOTFOUND)
    } else {
        Ok(())
    }
}

fn find(config: &PatternConfig, cmd: FindSubcommand) -> Result<(), Sysexit> {
    let mbox = load_mailbox(&cmd.mailbox)?;
    if 0 == cmd.from || cmd.from > mbox.visible_count() {
        die!(EX_USAGE, "There is no message {}", cmd.from);
    }

    let ctx = CompileContext::new(config.capabilities())
        .with_current_message(Some(cmd.from as i64));
    let mut session = SearchSession::new(config.clone());
    let interrupt = AtomicBool::new(false);
    let mut op = if cmd.reverse {
        SearchOp::ReverseSearch
    } else {
        SearchOp::Search
    };
    let mut current = cmd.from - 1;

    for _ in 0..cmd.count {
        let hit = session
            .search(&mbox, current, op, Some(&cmd.pattern), &ctx, &interrupt)
            .map_err(fail)?;
        if let Some(wrapped) = hit.wrapped {
            eprintln!("{}", wrapped);
        }
        println!("{}", mbox.visible_message(hit.position) + 1);

        current = hit.position;
        op = SearchOp::Next;
    }

    Ok(())
}

fn thread(cmd: ThreadSubcommand) -> Result<(), Sysexit> {
    let mut mbox = load_mailbox(&cmd.mailbox)?;
    if 0 == cmd.message || cmd.message > mbox.message_count() {
        die!(EX_USAGE, "There is no message {}", cmd.message);
    }

    limit_current_thread(&mut mbox, cmd.message - 1);
    print_visible(&mbox);
    Ok(())
}
