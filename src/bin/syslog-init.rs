//! syslog-init - Minimal init for containers
//!
//! Usage: syslog-init [OPTIONS] COMMAND [ARGS...]
//!
//! Environment:
//! - SYSLOG_SOCKET: bind a syslog socket here and relay it to stdout
//! - SYSLOG_DEBUG: verbose logging of reaping and decoding
//! - INIT_SUBREAPER: become child subreaper when not PID 1

use std::ffi::OsString;
use std::path::PathBuf;

use clap::builder::FalseyValueParser;
use clap::{ArgAction, Parser};

use syslog_init::pid1::{self, Supervisor};
use syslog_init::{BindFailure, ChildCommand, Config, ForwardTarget};

#[derive(Parser)]
#[command(name = "syslog-init")]
#[command(about = "Minimal init for containers: reaps zombies, forwards signals, relays syslog")]
struct Args {
    /// Bind a syslog datagram socket at PATH and relay messages to stdout
    #[arg(long, env = "SYSLOG_SOCKET", value_name = "PATH")]
    syslog_socket: Option<PathBuf>,

    /// Log reaping and syslog decoding activity
    #[arg(long, env = "SYSLOG_DEBUG", action = ArgAction::SetTrue, value_parser = FalseyValueParser::new())]
    debug: bool,

    /// What to do when the syslog socket cannot be bound [default: fail with --debug, degrade otherwise]
    #[arg(long, value_enum)]
    syslog_bind_failure: Option<BindFailure>,

    /// Register as child subreaper when not running as PID 1
    #[arg(long, env = "INIT_SUBREAPER", action = ArgAction::SetTrue, value_parser = FalseyValueParser::new())]
    subreaper: bool,

    /// Deliver forwarded signals to the child process or its whole process group
    #[arg(long = "forward-to", value_enum, default_value_t = ForwardTarget::Process)]
    forward_to: ForwardTarget,

    /// Command to run, followed by its arguments
    #[arg(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "COMMAND"
    )]
    command: Vec<OsString>,
}

impl Args {
    fn config(&self) -> Config {
        Config {
            // SYSLOG_SOCKET= disables the relay
            syslog_socket: self
                .syslog_socket
                .clone()
                .filter(|p| !p.as_os_str().is_empty()),
            debug: self.debug,
            bind_failure: Config::bind_failure_for(self.syslog_bind_failure, self.debug),
            subreaper: self.subreaper,
            forward_target: self.forward_to,
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let config = args.config();

    // clap guarantees at least one element
    let name = &args.command[0];
    let program = match pid1::resolve_executable(name, std::env::var_os("PATH").as_deref()) {
        Ok(path) => path,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };
    let command = ChildCommand::new(program, args.command.clone());

    let supervisor = Supervisor::new(config);
    match supervisor.run(&command).await {
        Ok(status) => std::process::exit(status.exit_code()),
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    }
}
